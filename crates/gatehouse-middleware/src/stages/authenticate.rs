//! Authentication.
//!
//! The credential from the `Authorization` header is handed to an external
//! [`AuthClient`]. The call is bounded by its own timeout (5 seconds unless
//! configured otherwise) and by request cancellation, so a collaborator that
//! never answers cannot hold the request.
//!
//! On success the resolved user ID is added to the context before the rest
//! of the chain runs. On any failure the chain stops with an
//! `Unauthenticated` error.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use gatehouse_middleware::stages::{AuthenticateMiddleware, StaticTokenAuth};
//!
//! let auth = StaticTokenAuth::new().with_token("secret", "user-1");
//! let mw = AuthenticateMiddleware::new(Arc::new(auth)).timeout(Duration::from_secs(2));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_core::{AppError, ErrorKind, Reply, RequestContext};
use thiserror::Error;

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, RequestExt};

/// Default bound on the authentication call.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity resolved by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    /// The authenticated user.
    pub user_id: String,
}

/// Why authentication failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No credential was presented.
    #[error("missing credential")]
    MissingCredential,

    /// The collaborator rejected the credential.
    #[error("credential rejected: {0}")]
    Rejected(String),

    /// The collaborator did not answer in time.
    #[error("authentication timed out after {0:?}")]
    Timeout(Duration),

    /// The request was cancelled while waiting.
    #[error("request cancelled during authentication")]
    Cancelled,

    /// The collaborator could not be reached.
    #[error("authentication service unavailable: {0}")]
    Unavailable(String),
}

/// An external authentication service.
pub trait AuthClient: Send + Sync + 'static {
    /// Resolves `credential` to a user.
    ///
    /// `ctx` carries the deadline for this call.
    fn authenticate<'a>(
        &'a self,
        ctx: &'a RequestContext,
        credential: &'a str,
    ) -> BoxFuture<'a, Result<AuthResponse, AuthError>>;
}

/// Authenticates requests through an [`AuthClient`].
#[derive(Clone)]
pub struct AuthenticateMiddleware {
    client: Arc<dyn AuthClient>,
    timeout: Duration,
}

impl std::fmt::Debug for AuthenticateMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateMiddleware")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AuthenticateMiddleware {
    /// Creates the interceptor with the default timeout.
    #[must_use]
    pub fn new(client: Arc<dyn AuthClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    /// Sets the bound on the authentication call.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn resolve(&self, ctx: &RequestContext, credential: &str) -> Result<AuthResponse, AuthError> {
        let auth_ctx = ctx.with_timeout(self.timeout);
        let call = tokio::time::timeout(self.timeout, self.client.authenticate(&auth_ctx, credential));

        let outcome = tokio::select! {
            result = call => result.unwrap_or(Err(AuthError::Timeout(self.timeout))),
            () = ctx.cancelled() => Err(AuthError::Cancelled),
        };

        // Release anything the collaborator left waiting on the child context.
        auth_ctx.cancellation().cancel();
        outcome
    }
}

impl Middleware for AuthenticateMiddleware {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Reply> {
        Box::pin(async move {
            let credential = request.authorization().to_string();

            match self.resolve(&ctx, &credential).await {
                Ok(resp) => {
                    tracing::debug!(request_id = %ctx.request_id(), user_id = %resp.user_id, "authenticated");
                    next.run(ctx.with_user_id(resp.user_id), request).await
                }
                Err(err) => AppError::new(ErrorKind::Unauthenticated, err).into(),
            }
        })
    }
}

/// In-memory [`AuthClient`] mapping bearer tokens to user IDs.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuth {
    tokens: HashMap<String, String>,
}

impl StaticTokenAuth {
    /// Creates an empty token table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` as `user_id`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }
}

impl AuthClient for StaticTokenAuth {
    fn authenticate<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        credential: &'a str,
    ) -> BoxFuture<'a, Result<AuthResponse, AuthError>> {
        Box::pin(async move {
            let token = credential.strip_prefix("Bearer ").unwrap_or(credential).trim();
            if token.is_empty() {
                return Err(AuthError::MissingCredential);
            }
            self.tokens
                .get(token)
                .map(|user_id| AuthResponse {
                    user_id: user_id.clone(),
                })
                .ok_or_else(|| AuthError::Rejected("unknown token".to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::compose;
    use crate::middleware::{handler_fn, Handler};
    use bytes::Bytes;
    use http::{header, StatusCode};
    use parking_lot::Mutex;

    struct NeverAnswers;

    impl AuthClient for NeverAnswers {
        fn authenticate<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            _credential: &'a str,
        ) -> BoxFuture<'a, Result<AuthResponse, AuthError>> {
            Box::pin(std::future::pending())
        }
    }

    fn request(authorization: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/api/user");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    fn whoami(reached: &Arc<Mutex<bool>>) -> Arc<dyn Handler> {
        let reached = Arc::clone(reached);
        handler_fn(move |ctx: RequestContext, _req| {
            let reached = Arc::clone(&reached);
            async move {
                *reached.lock() = true;
                let user = ctx.user_id().unwrap_or_default().to_string();
                Reply::json(StatusCode::OK, serde_json::json!({ "user": user }))
            }
        })
    }

    fn static_auth() -> Arc<dyn AuthClient> {
        Arc::new(StaticTokenAuth::new().with_token("good", "user-42"))
    }

    #[tokio::test]
    async fn test_success_attaches_user() {
        let reached = Arc::new(Mutex::new(false));
        let chain = compose(
            vec![Arc::new(AuthenticateMiddleware::new(static_auth()))],
            whoami(&reached),
        );

        let reply = chain
            .call(RequestContext::new(), request(Some("Bearer good")))
            .await;
        assert_eq!(&reply.encode().unwrap().body[..], br#"{"user":"user-42"}"#);
        assert!(*reached.lock());
    }

    #[tokio::test]
    async fn test_rejection_stops_chain() {
        let reached = Arc::new(Mutex::new(false));
        let chain = compose(
            vec![Arc::new(AuthenticateMiddleware::new(static_auth()))],
            whoami(&reached),
        );

        let reply = chain
            .call(RequestContext::new(), request(Some("Bearer bad")))
            .await;
        assert_eq!(reply.status(), Some(StatusCode::UNAUTHORIZED));
        assert!(!*reached.lock());
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthenticated() {
        let reached = Arc::new(Mutex::new(false));
        let chain = compose(
            vec![Arc::new(AuthenticateMiddleware::new(static_auth()))],
            whoami(&reached),
        );

        let reply = chain.call(RequestContext::new(), request(None)).await;
        let Reply::Error(err) = reply else {
            panic!("expected an error reply");
        };
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert_eq!(err.message(), "missing credential");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_collaborator_times_out() {
        let reached = Arc::new(Mutex::new(false));
        let chain = compose(
            vec![Arc::new(
                AuthenticateMiddleware::new(Arc::new(NeverAnswers)).timeout(Duration::from_secs(5)),
            )],
            whoami(&reached),
        );

        let started = tokio::time::Instant::now();
        let reply = chain
            .call(RequestContext::new(), request(Some("Bearer good")))
            .await;

        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
        let Reply::Error(err) = reply else {
            panic!("expected an error reply");
        };
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert!(err.message().contains("timed out"));
        assert!(!*reached.lock());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_stops_waiting() {
        let reached = Arc::new(Mutex::new(false));
        let chain = compose(
            vec![Arc::new(AuthenticateMiddleware::new(Arc::new(NeverAnswers)))],
            whoami(&reached),
        );

        let ctx = RequestContext::new();
        ctx.cancellation().cancel();
        let reply = chain.call(ctx, request(Some("Bearer good"))).await;

        let Reply::Error(err) = reply else {
            panic!("expected an error reply");
        };
        assert_eq!(err.message(), AuthError::Cancelled.to_string());
    }

    #[tokio::test]
    async fn test_static_auth_accepts_bare_token() {
        let auth = StaticTokenAuth::new().with_token("raw", "user-7");
        let ctx = RequestContext::new();
        let resp = auth.authenticate(&ctx, "raw").await.unwrap();
        assert_eq!(resp.user_id, "user-7");
    }
}
