//! Core middleware and handler traits.
//!
//! This module defines the [`Middleware`] trait that every interceptor
//! implements and the [`Handler`] trait for the endpoint at the end of a chain.
//! Interceptors receive the request context, the request, and a [`Next`]
//! callback that runs the rest of the chain.
//!
//! # Example
//!
//! ```
//! use gatehouse_core::{Reply, RequestContext};
//! use gatehouse_middleware::{BoxFuture, Middleware, Next, Request};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: RequestContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Reply> {
//!         Box::pin(async move {
//!             let started = std::time::Instant::now();
//!             let reply = next.run(ctx, request).await;
//!             tracing::debug!(elapsed = ?started.elapsed(), "chain finished");
//!             reply
//!         })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use gatehouse_core::{Reply, RequestContext};

use crate::types::Request;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The endpoint at the end of an interceptor chain.
///
/// A composed chain is itself a `Handler`, so chains nest.
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    fn call<'a>(&'a self, ctx: RequestContext, request: Request) -> BoxFuture<'a, Reply>;
}

/// A request interceptor.
///
/// # Invariants
///
/// - `next.run()` is called at most once; not calling it short-circuits the
///   chain with this interceptor's own reply
/// - Interceptors add to the context, never remove from it
/// - Error replies from downstream are returned, not discarded
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this interceptor, used for logging.
    fn name(&self) -> &'static str;

    /// Processes the request, usually by running `next` around some logic.
    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Reply>;
}

/// The rest of the chain, as seen by one interceptor.
///
/// Consumed by [`Next::run`], so downstream runs at most once.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Creates a `Next` that runs `remaining` in order, then `terminal`.
    pub fn new(remaining: &'a [Arc<dyn Middleware>], terminal: &'a dyn Handler) -> Self {
        Self {
            remaining,
            terminal,
        }
    }

    /// Invokes the next interceptor, or the terminal handler if none is left.
    pub fn run(self, ctx: RequestContext, request: Request) -> BoxFuture<'a, Reply> {
        match self.remaining.split_first() {
            Some((first, rest)) => first.process(ctx, request, Next::new(rest, self.terminal)),
            None => self.terminal.call(ctx, request),
        }
    }
}

/// A handler created from an async function.
///
/// # Example
///
/// ```
/// use gatehouse_core::Reply;
/// use gatehouse_middleware::handler_fn;
/// use http::StatusCode;
///
/// let handler = handler_fn(|_ctx, _req| async {
///     Reply::json(StatusCode::OK, serde_json::json!({"status": "ok"}))
/// });
/// ```
pub struct FnHandler<F> {
    func: F,
}

/// Wraps an async function as a [`Handler`].
pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn Handler>
where
    F: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    Arc::new(FnHandler { func })
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    fn call<'a>(&'a self, ctx: RequestContext, request: Request) -> BoxFuture<'a, Reply> {
        Box::pin((self.func)(ctx, request))
    }
}

/// A middleware created from a function that receives `Next`.
///
/// # Example
///
/// ```
/// use gatehouse_middleware::{FnMiddleware, Middleware};
///
/// let mw = FnMiddleware::new("passthrough", |ctx, req, next| next.run(ctx, req));
/// assert_eq!(mw.name(), "passthrough");
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(RequestContext, Request, Next<'a>) -> BoxFuture<'a, Reply>
        + Send
        + Sync
        + 'static,
{
    /// Creates a new function-based middleware.
    pub fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(RequestContext, Request, Next<'a>) -> BoxFuture<'a, Reply>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Reply> {
        (self.func)(ctx, request, next)
    }
}
