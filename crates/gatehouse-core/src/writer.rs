//! Shared transport writer.
//!
//! A [`ResponseWriter`] is the slot the dispatcher eventually turns into the
//! HTTP response. Cross-cutting code (CORS, HSTS) sets headers on it before the
//! chain runs, transmission writes the status and body after it, and a handler
//! that needs full control can write to it directly and return
//! [`Reply::NoResponse`](crate::Reply::NoResponse).

use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::Full;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct WriterState {
    headers: HeaderMap,
    status: Option<StatusCode>,
    body: Option<Bytes>,
}

/// Cloneable handle on the response being built for one request.
///
/// # Example
///
/// ```
/// use gatehouse_core::ResponseWriter;
/// use http::StatusCode;
///
/// let writer = ResponseWriter::new();
/// writer.write_header(StatusCode::ACCEPTED);
/// writer.write_body("queued");
///
/// let response = writer.into_response();
/// assert_eq!(response.status(), StatusCode::ACCEPTED);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResponseWriter {
    state: Arc<Mutex<WriterState>>,
}

impl ResponseWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.state.lock().headers.insert(name, value);
    }

    /// Appends a header value.
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.state.lock().headers.append(name, value);
    }

    /// Returns a copy of a header value.
    #[must_use]
    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.state.lock().headers.get(name).cloned()
    }

    /// Writes the status line. Only the first call has an effect.
    pub fn write_header(&self, status: StatusCode) {
        let mut state = self.state.lock();
        if state.status.is_none() {
            state.status = Some(status);
        }
    }

    /// Writes the body, implying `200 OK` if no status was written yet.
    pub fn write_body(&self, body: impl Into<Bytes>) {
        let mut state = self.state.lock();
        state.status.get_or_insert(StatusCode::OK);
        state.body = Some(body.into());
    }

    /// Returns the written status, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.state.lock().status
    }

    /// Returns `true` once a status has been written.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.state.lock().status.is_some()
    }

    /// Builds the HTTP response from whatever was written.
    ///
    /// Other clones of this writer see an empty state afterwards.
    #[must_use]
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let state = std::mem::take(&mut *self.state.lock());
        let mut response = Response::new(Full::new(state.body.unwrap_or_default()));
        *response.status_mut() = state.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = state.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;
    use http_body_util::BodyExt;

    #[test]
    fn test_first_status_wins() {
        let writer = ResponseWriter::new();
        writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        writer.write_header(StatusCode::OK);
        assert_eq!(writer.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_clones_share_state() {
        let writer = ResponseWriter::new();
        let nested = writer.clone();
        nested.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        nested.write_body("direct");

        assert!(writer.is_written());
        assert_eq!(
            writer.header(&header::CONTENT_TYPE).unwrap(),
            HeaderValue::from_static("text/plain")
        );
    }

    #[tokio::test]
    async fn test_into_response() {
        let writer = ResponseWriter::new();
        writer.append_header(header::VARY, HeaderValue::from_static("Origin"));
        writer.append_header(header::VARY, HeaderValue::from_static("Access-Control-Request-Method"));
        writer.write_header(StatusCode::CREATED);
        writer.write_body(r#"{"id":1}"#);

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get_all(header::VARY).iter().count(), 2);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"id":1}"#);
    }

    #[test]
    fn test_unwritten_defaults_to_ok() {
        let response = ResponseWriter::new().into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
