//! The uniform return value of handlers and interceptors.
//!
//! Every handler and every interceptor produces a [`Reply`]. Transmission
//! dispatches on it with an exhaustive match and asks it to [`encode`] itself
//! into body bytes and a content type.
//!
//! [`encode`]: Reply::encode

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::error::{AppError, FieldErrors};

/// Content type for encoded JSON.
pub const JSON_UTF8: &str = "application/json; charset=utf-8";

/// Content type for an empty JSON reply.
pub const JSON: &str = "application/json";

/// Content type for encoded markup.
pub const HTML_UTF8: &str = "text/html; charset=UTF-8";

/// Content type for empty markup.
pub const HTML: &str = "text/html";

/// Failure while encoding a reply.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The payload could not be serialized.
    #[error("json encode: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encoded form of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Body bytes.
    pub body: Bytes,
    /// Content type, empty when the reply carries no body.
    pub content_type: &'static str,
}

impl Encoded {
    const fn empty(content_type: &'static str) -> Self {
        Self {
            body: Bytes::new(),
            content_type,
        }
    }
}

/// A payload serialized on demand.
trait JsonPayload: Send + Sync {
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T: Serialize + Send + Sync> JsonPayload for T {
    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// JSON payload with an explicit status.
#[derive(Clone)]
pub struct JsonReply {
    status: StatusCode,
    payload: Option<Arc<dyn JsonPayload>>,
}

impl JsonReply {
    /// Returns the status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    fn encode(&self) -> Result<Encoded, EncodeError> {
        match &self.payload {
            None => Ok(Encoded::empty(JSON)),
            Some(payload) => Ok(Encoded {
                body: Bytes::from(payload.to_json()?),
                content_type: JSON_UTF8,
            }),
        }
    }
}

impl fmt::Debug for JsonReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonReply")
            .field("status", &self.status)
            .field("payload", &self.payload.as_ref().map(|_| "<payload>"))
            .finish()
    }
}

/// Preformatted markup.
#[derive(Debug, Clone)]
pub struct HtmlReply {
    status: StatusCode,
    markup: String,
}

impl HtmlReply {
    /// Overrides the default `200 OK`.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Returns the status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    fn encode(&self) -> Encoded {
        if self.markup.is_empty() {
            return Encoded::empty(HTML);
        }
        Encoded {
            body: Bytes::from(self.markup.clone()),
            content_type: HTML_UTF8,
        }
    }
}

/// What a handler or interceptor returns.
///
/// # Example
///
/// ```
/// use gatehouse_core::{Reply, reply::JSON_UTF8};
/// use http::StatusCode;
///
/// let reply = Reply::json(StatusCode::OK, serde_json::json!({"ok": true}));
/// let encoded = reply.encode().unwrap();
///
/// assert_eq!(encoded.content_type, JSON_UTF8);
/// assert_eq!(&encoded.body[..], br#"{"ok":true}"#);
/// ```
#[derive(Debug, Clone)]
pub enum Reply {
    /// The handler already wrote to the transport.
    NoResponse,
    /// No result; transmitted as `204 No Content`.
    Empty,
    /// JSON payload with an explicit status.
    Json(JsonReply),
    /// Markup payload.
    Html(HtmlReply),
    /// A single classified error.
    Error(AppError),
    /// Field-level validation failures.
    FieldErrors(FieldErrors),
}

/// A reply that represents a failure, borrowed out of a [`Reply`].
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    /// Single error.
    Error(&'a AppError),
    /// Field-error list.
    Fields(&'a FieldErrors),
}

impl Reply {
    /// The no-response sentinel.
    #[must_use]
    pub const fn no_response() -> Self {
        Self::NoResponse
    }

    /// JSON payload encoded lazily at transmission time.
    pub fn json<T>(status: StatusCode, payload: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self::Json(JsonReply {
            status,
            payload: Some(Arc::new(payload)),
        })
    }

    /// JSON reply without a payload.
    #[must_use]
    pub const fn json_status(status: StatusCode) -> Self {
        Self::Json(JsonReply {
            status,
            payload: None,
        })
    }

    /// Markup reply with status `200 OK`.
    pub fn html(markup: impl Into<String>) -> Self {
        Self::Html(HtmlReply {
            status: StatusCode::OK,
            markup: markup.into(),
        })
    }

    /// Returns the status this reply declares, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::NoResponse | Self::Empty => None,
            Self::Json(json) => Some(json.status()),
            Self::Html(html) => Some(html.status()),
            Self::Error(err) => err.kind().status_code(),
            Self::FieldErrors(errs) => errs.kind().status_code(),
        }
    }

    /// Returns the status this reply is transmitted with.
    ///
    /// Error-shaped replies without a declared status use `500`, and `Empty`
    /// uses `204`. `NoResponse` returns `None` since the handler chose the
    /// status itself.
    #[must_use]
    pub fn wire_status(&self) -> Option<StatusCode> {
        match self {
            Self::NoResponse => None,
            Self::Empty => Some(StatusCode::NO_CONTENT),
            other => Some(other.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)),
        }
    }

    /// Returns `true` for error and field-error replies, including the
    /// `None` kind.
    #[must_use]
    pub const fn is_error_shaped(&self) -> bool {
        matches!(self, Self::Error(_) | Self::FieldErrors(_))
    }

    /// Returns the failure carried by this reply.
    ///
    /// An [`ErrorKind::None`](crate::ErrorKind::None) error is error-shaped but
    /// is not a failure, so this returns `None` for it.
    #[must_use]
    pub fn as_failure(&self) -> Option<Failure<'_>> {
        match self {
            Self::Error(err) if err.is_failure() => Some(Failure::Error(err)),
            Self::FieldErrors(errs) => Some(Failure::Fields(errs)),
            _ => None,
        }
    }

    /// Serializes the reply to body bytes and a content type.
    pub fn encode(&self) -> Result<Encoded, EncodeError> {
        match self {
            Self::NoResponse | Self::Empty => Ok(Encoded::empty("")),
            Self::Json(json) => json.encode(),
            Self::Html(html) => Ok(html.encode()),
            Self::Error(err) => Ok(Encoded {
                body: Bytes::from(serde_json::to_vec(&err.to_body())?),
                content_type: JSON_UTF8,
            }),
            Self::FieldErrors(errs) => Ok(Encoded {
                body: Bytes::from(serde_json::to_vec(errs.errors())?),
                content_type: JSON_UTF8,
            }),
        }
    }
}

impl From<AppError> for Reply {
    fn from(err: AppError) -> Self {
        Self::Error(err)
    }
}

impl From<FieldErrors> for Reply {
    fn from(errs: FieldErrors) -> Self {
        Self::FieldErrors(errs)
    }
}

impl From<()> for Reply {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl<T, E> From<Result<T, E>> for Reply
where
    T: Into<Reply>,
    E: Into<Reply>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(ok) => ok.into(),
            Err(err) => err.into(),
        }
    }
}
