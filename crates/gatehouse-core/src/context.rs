//! Request context types.
//!
//! The [`RequestContext`] carries per-request state through the interceptor
//! chain and into handlers: the request ID, cancellation, an optional
//! deadline, and an append-only chain of typed values.
//!
//! Contexts are immutable. Adding a value returns a new context that shares
//! everything already attached, so an interceptor can only ever add keys.

use std::any::{Any, TypeId};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use crate::writer::ResponseWriter;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for log correlation.
///
/// # Example
///
/// ```
/// use gatehouse_core::RequestId;
///
/// let id = RequestId::new();
/// let parsed: RequestId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// The identity resolved by the authentication stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

/// Trace identifier propagated by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

/// Address of the connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

struct ValueNode {
    type_id: TypeId,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<ValueNode>>,
}

/// Per-request context that flows through the interceptor chain.
///
/// # Example
///
/// ```
/// use gatehouse_core::RequestContext;
///
/// let ctx = RequestContext::new();
/// let authed = ctx.with_user_id("user-123");
///
/// assert_eq!(authed.user_id(), Some("user-123"));
/// assert_eq!(ctx.user_id(), None);
/// assert_eq!(authed.request_id(), ctx.request_id());
/// ```
#[derive(Clone)]
pub struct RequestContext {
    request_id: RequestId,
    started_at: Instant,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
    values: Option<Arc<ValueNode>>,
}

impl RequestContext {
    /// Creates a context with a fresh request ID and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cancellation(RequestId::new(), CancellationToken::new())
    }

    /// Creates a context bound to an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(request_id: RequestId, cancellation: CancellationToken) -> Self {
        Self {
            request_id,
            started_at: Instant::now(),
            deadline: None,
            cancellation,
            values: None,
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns when the request started processing.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the deadline, if one was set.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline.
    ///
    /// `None` means no deadline; an expired deadline yields `Some(ZERO)`.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns a child context whose deadline is at most `timeout` from now.
    ///
    /// The child gets its own cancellation token, cancelled with the parent.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            cancellation: self.cancellation.child_token(),
            ..self.clone()
        }
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` once the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes when the request is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }

    /// Returns a new context that also carries `value`.
    ///
    /// A value of the same type attached later shadows this one for readers of
    /// the new context; earlier contexts are unaffected.
    #[must_use]
    pub fn with_value<T: Send + Sync + 'static>(&self, value: T) -> Self {
        Self {
            values: Some(Arc::new(ValueNode {
                type_id: TypeId::of::<T>(),
                value: Arc::new(value),
                parent: self.values.clone(),
            })),
            ..self.clone()
        }
    }

    /// Returns the most recently attached value of type `T`.
    #[must_use]
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        let mut node = self.values.as_deref();
        while let Some(current) = node {
            if current.type_id == TypeId::of::<T>() {
                return current.value.downcast_ref::<T>();
            }
            node = current.parent.as_deref();
        }
        None
    }

    /// Returns the authenticated user ID.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.value::<UserId>().map(|id| id.0.as_str())
    }

    /// Returns a new context carrying the authenticated user ID.
    #[must_use]
    pub fn with_user_id(&self, user_id: impl Into<String>) -> Self {
        self.with_value(UserId(user_id.into()))
    }

    /// Returns the trace ID.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.value::<TraceId>().map(|id| id.0.as_str())
    }

    /// Returns a new context carrying a trace ID.
    #[must_use]
    pub fn with_trace_id(&self, trace_id: impl Into<String>) -> Self {
        self.with_value(TraceId(trace_id.into()))
    }

    /// Returns the transport writer attached by the dispatcher.
    #[must_use]
    pub fn writer(&self) -> Option<&ResponseWriter> {
        self.value::<ResponseWriter>()
    }

    /// Returns a new context carrying the transport writer.
    #[must_use]
    pub fn with_writer(&self, writer: ResponseWriter) -> Self {
        self.with_value(writer)
    }

    /// Returns the peer address.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.value::<RemoteAddr>().map(|addr| addr.0)
    }

    /// Returns a new context carrying the peer address.
    #[must_use]
    pub fn with_remote_addr(&self, addr: SocketAddr) -> Self {
        self.with_value(RemoteAddr(addr))
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("deadline", &self.deadline)
            .field("cancelled", &self.is_cancelled())
            .field("user_id", &self.user_id())
            .finish_non_exhaustive()
    }
}
