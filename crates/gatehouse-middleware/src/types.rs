//! Common types used throughout the interceptor chain.

use bytes::Bytes;
use http::header::{self, HeaderName};
use http::Method;

/// The HTTP request type seen by interceptors and handlers.
///
/// The body has already been read in full by the dispatcher.
pub type Request = http::Request<Bytes>;

/// Header carrying the CSRF token.
pub const CSRF_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");

/// Header carrying a caller-supplied request ID.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Header carrying a caller-supplied trace ID.
pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

/// Convenience accessors on [`Request`].
pub trait RequestExt {
    /// Returns a header as a string, or `None` if absent or not valid UTF-8.
    fn header_str(&self, name: &HeaderName) -> Option<&str>;

    /// Returns the `Authorization` header, or an empty string.
    fn authorization(&self) -> &str;

    /// Returns the `User-Agent` header, or an empty string.
    fn user_agent(&self) -> &str;

    /// Returns `true` for methods that never change server state.
    fn is_safe_method(&self) -> bool;
}

impl RequestExt for Request {
    fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn authorization(&self) -> &str {
        self.header_str(&header::AUTHORIZATION).unwrap_or_default()
    }

    fn user_agent(&self) -> &str {
        self.header_str(&header::USER_AGENT).unwrap_or_default()
    }

    fn is_safe_method(&self) -> bool {
        matches!(
            *self.method(),
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method) -> Request {
        http::Request::builder()
            .method(method)
            .uri("/api/user")
            .header(header::USER_AGENT, "curl/8.0")
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn test_safe_methods() {
        for method in [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE] {
            assert!(request(method).is_safe_method());
        }
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            assert!(!request(method).is_safe_method());
        }
    }

    #[test]
    fn test_missing_headers_are_empty() {
        let req = request(Method::GET);
        assert_eq!(req.authorization(), "");
        assert_eq!(req.user_agent(), "curl/8.0");
        assert!(req.header_str(&CSRF_TOKEN_HEADER).is_none());
    }
}
