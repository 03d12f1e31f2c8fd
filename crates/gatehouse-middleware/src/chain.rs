//! Interceptor chain composition.
//!
//! [`compose`] wraps a terminal [`Handler`] in an ordered list of
//! interceptors. The first interceptor in the list is outermost: it sees the
//! request first and the reply last.
//!
//! ```text
//! compose([a, b, c], h)  ==  a(b(c(h)))
//! ```
//!
//! The result is itself a `Handler`, so chains nest. Composition is
//! associative: `compose(a ++ b, h)` behaves like `compose(a, compose(b, h))`.

use std::sync::Arc;

use gatehouse_core::{Reply, RequestContext};

use crate::middleware::{BoxFuture, Handler, Middleware, Next};
use crate::types::Request;

/// A type-erased interceptor that can be stored in a list.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// A terminal handler wrapped in a fixed list of interceptors.
pub struct Chain {
    middleware: Arc<[BoxedMiddleware]>,
    terminal: Arc<dyn Handler>,
}

impl Chain {
    /// Returns the interceptor names, outermost first.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of interceptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Returns `true` if the chain has no interceptors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}

impl Handler for Chain {
    fn call<'a>(&'a self, ctx: RequestContext, request: Request) -> BoxFuture<'a, Reply> {
        Next::new(&self.middleware, self.terminal.as_ref()).run(ctx, request)
    }
}

/// Wraps `terminal` so that `middleware[0]` runs first.
///
/// An empty list returns `terminal` itself.
pub fn compose(middleware: Vec<BoxedMiddleware>, terminal: Arc<dyn Handler>) -> Arc<dyn Handler> {
    if middleware.is_empty() {
        return terminal;
    }
    Arc::new(Chain {
        middleware: middleware.into(),
        terminal,
    })
}
