//! CSRF token validation.
//!
//! Safe methods (`GET`, `HEAD`, `OPTIONS`, `TRACE`) are never checked. Any
//! other method must carry an `X-CSRF-Token` header whose value was issued
//! for the caller's `User-Agent`. Tokens live in a shared [`CsrfTokenStore`]
//! under the key `ua:{user_agent}:csrftoken:{token}`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use gatehouse_core::{AppError, Reply, RequestContext};
use tokio::time::Instant;

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, RequestExt, CSRF_TOKEN_HEADER};

/// Message for an unsafe request without a token.
pub const TOKEN_REQUIRED: &str = "The csrf token is required";

/// Message for a token the store does not know.
pub const TOKEN_INVALID: &str = "Invalid csrf token";

/// Builds the store key for a token issued to `user_agent`.
#[must_use]
pub fn csrf_key(user_agent: &str, token: &str) -> String {
    format!("ua:{user_agent}:csrftoken:{token}")
}

/// Shared storage of issued CSRF tokens.
///
/// Implementations must allow concurrent `contains` calls.
pub trait CsrfTokenStore: Send + Sync + 'static {
    /// Returns `true` if `key` was issued and has not expired.
    fn contains(&self, key: &str) -> bool;

    /// Records `key` as valid for `ttl`.
    fn issue(&self, key: String, ttl: Duration);
}

/// In-memory token store with per-entry expiry.
///
/// Expired entries are rejected on read and dropped lazily; call
/// [`purge_expired`](Self::purge_expired) periodically to bound memory.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<String, Instant>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues `token` for `user_agent`.
    pub fn issue_token(&self, user_agent: &str, token: &str, ttl: Duration) {
        self.issue(csrf_key(user_agent, token), ttl);
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, expires| *expires > now);
        before.saturating_sub(self.tokens.len())
    }

    /// Returns the number of stored entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl CsrfTokenStore for MemoryTokenStore {
    fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        let live = match self.tokens.get(key) {
            Some(expires) => *expires > now,
            None => return false,
        };
        if !live {
            self.tokens.remove_if(key, |_, expires| *expires <= now);
        }
        live
    }

    fn issue(&self, key: String, ttl: Duration) {
        self.tokens.insert(key, Instant::now() + ttl);
    }
}

/// Rejects unsafe requests that lack a valid CSRF token.
#[derive(Clone)]
pub struct CsrfMiddleware {
    store: Arc<dyn CsrfTokenStore>,
}

impl std::fmt::Debug for CsrfMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfMiddleware").finish_non_exhaustive()
    }
}

impl CsrfMiddleware {
    /// Creates the interceptor over a shared store.
    #[must_use]
    pub fn new(store: Arc<dyn CsrfTokenStore>) -> Self {
        Self { store }
    }

    fn check(&self, request: &Request) -> Result<(), AppError> {
        if request.is_safe_method() {
            return Ok(());
        }

        let token = request
            .header_str(&CSRF_TOKEN_HEADER)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::permission_denied(TOKEN_REQUIRED))?;

        if self.store.contains(&csrf_key(request.user_agent(), token)) {
            Ok(())
        } else {
            Err(AppError::permission_denied(TOKEN_INVALID))
        }
    }
}

impl Middleware for CsrfMiddleware {
    fn name(&self) -> &'static str {
        "csrf"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Reply> {
        match self.check(&request) {
            Ok(()) => next.run(ctx, request),
            Err(err) => Box::pin(async move { Reply::from(err) }),
        }
    }
}
