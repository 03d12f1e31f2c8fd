//! # Gatehouse Server
//!
//! HTTP/1.1 server for Gatehouse applications:
//!
//! - [`App`] - exact-path routing, CORS and HSTS, and dispatch through the
//!   interceptor chain
//! - [`respond()`] - writes a [`Reply`](gatehouse_core::Reply) to the transport
//! - [`Server`] - hyper accept loop with timeouts and graceful shutdown
//! - [`HttpClient`] - outbound JSON client

#![doc(html_root_url = "https://docs.rs/gatehouse-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod client;
mod config;
pub mod respond;
mod server;
pub mod shutdown;

pub use app::{App, HttpResponse, RouteAdder, HSTS};
pub use client::{ClientError, ClientResponse, HttpClient};
pub use config::{ServerConfig, ServerConfigBuilder};
pub use respond::{respond, RespondError};
pub use server::{Server, ServerBuilder, ServerError};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
