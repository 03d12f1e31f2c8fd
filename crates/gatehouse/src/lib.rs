//! # Gatehouse
//!
//! An HTTP service toolkit built around one idea: every handler and every
//! interceptor returns a [`Reply`](gatehouse_core::Reply), and interceptors
//! compose into a chain around the handler.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gatehouse::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = GatehouseConfig::development();
//!     let mut app = App::with_default_stack(Arc::new(MemoryTokenStore::new()));
//!     app.handle(
//!         Method::GET,
//!         "/api",
//!         "/hello",
//!         handler_fn(|_ctx, _req| async {
//!             Reply::json(StatusCode::OK, serde_json::json!({"hello": "world"}))
//!         }),
//!         Vec::new(),
//!     );
//!
//!     Server::builder()
//!         .config(ServerConfig::from(&cfg))
//!         .app(app)
//!         .build()
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → Panics → Errors → Logger → Csrf → [route interceptors] → Handler
//!                                                                      ↓
//! Response ← respond ← Reply ←─────────────────────────────────────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/gatehouse/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use gatehouse_config as config;
pub use gatehouse_core as core;
pub use gatehouse_middleware as middleware;
pub use gatehouse_server as server;
pub use gatehouse_telemetry as telemetry;

pub mod routes;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use gatehouse_config::{BuildMode, ConfigLoader, GatehouseConfig};
    pub use gatehouse_core::{AppError, ErrorKind, FieldErrors, Reply, RequestContext, RequestId, ResponseWriter};
    pub use gatehouse_middleware::stages::{
        AuthClient, AuthenticateMiddleware, CsrfTokenStore, KeyExtractor, KeyedLimiter, Limiter,
        MemoryTokenStore,
    };
    pub use gatehouse_middleware::{compose, handler_fn, BoxedMiddleware, Handler, Middleware, Next, Request};
    pub use gatehouse_server::{App, HttpClient, RouteAdder, Server, ServerConfig, ShutdownSignal};
    pub use http::{Method, StatusCode};
}
