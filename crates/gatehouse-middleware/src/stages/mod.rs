//! Interceptor stages.
//!
//! The default application chain, outermost first:
//!
//! 1. [`panics`] - Recover panics as internal-only errors
//! 2. [`errors`] - Log error replies and hide internal details
//! 3. [`logger`] - Log request start and completion
//! 4. [`csrf`] - Reject unsafe requests without a valid token
//!
//! [`authenticate`] and [`limiter`] are usually attached per route.

pub mod authenticate;
pub mod csrf;
pub mod errors;
pub mod limiter;
pub mod logger;
pub mod panics;

pub use authenticate::{AuthClient, AuthError, AuthResponse, AuthenticateMiddleware, StaticTokenAuth};
pub use csrf::{csrf_key, CsrfMiddleware, CsrfTokenStore, MemoryTokenStore};
pub use errors::{ErrorsMiddleware, INTERNAL_SERVER_ERROR};
pub use limiter::{KeyExtractor, KeyedLimiter, LimitError, Limiter, TokenBucket};
pub use logger::LoggerMiddleware;
pub use panics::PanicsMiddleware;
