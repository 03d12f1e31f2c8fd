//! # Gatehouse Middleware
//!
//! The interceptor chain that wraps every Gatehouse endpoint.
//!
//! An interceptor receives the request context, the request, and a [`Next`]
//! that runs the rest of the chain. [`compose`] turns an ordered list of
//! interceptors and a terminal [`Handler`] into a single handler, with the
//! first interceptor outermost.
//!
//! ```text
//! Request → Panics → Errors → Logger → Csrf → [route interceptors] → Handler
//!                                                                      ↓
//! Reply   ← Panics ← Errors ← Logger ← Csrf ← [route interceptors] ←───┘
//! ```
//!
//! ## Stages
//!
//! | Stage        | Interceptor              | Purpose                                    |
//! |--------------|--------------------------|--------------------------------------------|
//! | Panics       | [`PanicsMiddleware`]     | Turn panics into internal-only errors      |
//! | Errors       | [`ErrorsMiddleware`]     | Log errors once, hide internal details     |
//! | Logger       | [`LoggerMiddleware`]     | Request start/completion logs and metrics  |
//! | Csrf         | [`CsrfMiddleware`]       | Token check for unsafe methods             |
//! | Authenticate | [`AuthenticateMiddleware`] | Resolve the caller through an auth service |
//! | Limiter      | [`Limiter`]              | Token-bucket rate limiting                 |
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use gatehouse_core::Reply;
//! use gatehouse_middleware::{compose, handler_fn, stages::LoggerMiddleware};
//! use http::StatusCode;
//!
//! let handler = compose(
//!     vec![Arc::new(LoggerMiddleware::new())],
//!     handler_fn(|_ctx, _req| async { Reply::json_status(StatusCode::OK) }),
//! );
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod middleware;
pub mod stages;
pub mod types;

pub use chain::{compose, BoxedMiddleware, Chain};
pub use middleware::{handler_fn, BoxFuture, FnHandler, FnMiddleware, Handler, Middleware, Next};
pub use stages::{
    AuthenticateMiddleware, CsrfMiddleware, ErrorsMiddleware, Limiter, LoggerMiddleware,
    PanicsMiddleware,
};
pub use types::{Request, RequestExt};
