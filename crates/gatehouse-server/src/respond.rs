//! Writing a [`Reply`] to the transport.

use gatehouse_core::{AppError, EncodeError, ErrorKind, Reply, RequestContext, ResponseWriter};
use gatehouse_middleware::stages::INTERNAL_SERVER_ERROR;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use thiserror::Error;

/// Failure while transmitting a reply.
#[derive(Debug, Error)]
pub enum RespondError {
    /// The request was cancelled before anything was written.
    #[error("client disconnected, do not send response")]
    ClientDisconnected,

    /// The reply could not be encoded. A bare `500` was written instead.
    #[error("respond: {0}")]
    Encode(#[from] EncodeError),
}

/// Writes `reply` to `writer`.
///
/// `NoResponse` leaves the writer untouched. A cancelled context writes
/// nothing and reports [`RespondError::ClientDisconnected`]. An
/// `InternalOnlyLog` error is logged and replaced with a generic internal
/// error before encoding.
///
/// # Errors
///
/// Returns an error when the client has gone away or the reply cannot be
/// encoded.
pub fn respond(ctx: &RequestContext, writer: &ResponseWriter, reply: Reply) -> Result<(), RespondError> {
    if matches!(reply, Reply::NoResponse) {
        return Ok(());
    }

    if ctx.is_cancelled() {
        return Err(RespondError::ClientDisconnected);
    }

    let reply = mask_internal(ctx, reply);
    let Some(status) = reply.wire_status() else {
        return Ok(());
    };

    if status == StatusCode::NO_CONTENT {
        writer.write_header(status);
        return Ok(());
    }

    let encoded = match reply.encode() {
        Ok(encoded) => encoded,
        Err(err) => {
            writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
            return Err(err.into());
        }
    };

    if !encoded.content_type.is_empty() {
        writer.set_header(CONTENT_TYPE, HeaderValue::from_static(encoded.content_type));
    }
    writer.write_header(status);
    writer.write_body(encoded.body);
    Ok(())
}

fn mask_internal(ctx: &RequestContext, reply: Reply) -> Reply {
    match reply {
        Reply::Error(err) if err.kind() == ErrorKind::InternalOnlyLog => {
            tracing::error!(
                err = %err,
                source_err_file = err.provenance().file_name(),
                source_err_line = err.provenance().line(),
                request_id = %ctx.request_id(),
                "internal error reached transmission"
            );
            AppError::internal(INTERNAL_SERVER_ERROR).into()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::FieldErrors;
    use http_body_util::BodyExt;
    use serde::Serialize;

    async fn body_of(writer: ResponseWriter) -> (StatusCode, http::HeaderMap, bytes::Bytes) {
        let response = writer.into_response();
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (parts.status, parts.headers, bytes)
    }

    #[tokio::test]
    async fn test_json_reply_written() {
        let ctx = RequestContext::new();
        let writer = ResponseWriter::new();
        respond(&ctx, &writer, Reply::json(StatusCode::CREATED, serde_json::json!({"id": 7}))).unwrap();

        let (status, headers, body) = body_of(writer).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(headers[CONTENT_TYPE], gatehouse_core::reply::JSON_UTF8);
        assert_eq!(&body[..], br#"{"id":7}"#);
    }

    #[tokio::test]
    async fn test_no_response_leaves_writer_alone() {
        let ctx = RequestContext::new();
        let writer = ResponseWriter::new();
        writer.write_header(StatusCode::ACCEPTED);
        writer.write_body("streamed by handler");

        respond(&ctx, &writer, Reply::no_response()).unwrap();

        let (status, _, body) = body_of(writer).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(&body[..], b"streamed by handler");
    }

    #[test]
    fn test_cancelled_context_writes_nothing() {
        let ctx = RequestContext::new();
        ctx.cancellation().cancel();
        let writer = ResponseWriter::new();

        let err = respond(&ctx, &writer, Reply::json_status(StatusCode::OK)).unwrap_err();
        assert!(matches!(err, RespondError::ClientDisconnected));
        assert!(!writer.is_written());
    }

    #[tokio::test]
    async fn test_empty_is_no_content() {
        let ctx = RequestContext::new();
        let writer = ResponseWriter::new();
        respond(&ctx, &writer, Reply::Empty).unwrap();

        let (status, headers, body) = body_of(writer).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(headers.get(CONTENT_TYPE).is_none());
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_no_content_drops_body() {
        let ctx = RequestContext::new();
        let writer = ResponseWriter::new();
        respond(&ctx, &writer, Reply::json(StatusCode::NO_CONTENT, serde_json::json!({"x": 1}))).unwrap();

        let (status, _, body) = body_of(writer).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_field_errors_written() {
        let ctx = RequestContext::new();
        let writer = ResponseWriter::new();
        respond(&ctx, &writer, FieldErrors::new("value", "field value is required").into()).unwrap();

        let (status, _, body) = body_of(writer).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{"field": "value", "error": "field value is required"}])
        );
    }

    #[tokio::test]
    async fn test_internal_only_detail_never_sent() {
        let ctx = RequestContext::new();
        let writer = ResponseWriter::new();
        let reply = Reply::from(AppError::internal_only_log("PANIC [boom] TRACE[...]"));
        respond(&ctx, &writer, reply).unwrap();

        let (status, _, body) = body_of(writer).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("boom"));
        assert!(text.contains(INTERNAL_SERVER_ERROR));
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refused"))
        }
    }

    #[tokio::test]
    async fn test_encode_failure_writes_500() {
        let ctx = RequestContext::new();
        let writer = ResponseWriter::new();
        let err = respond(&ctx, &writer, Reply::json(StatusCode::OK, Unserializable)).unwrap_err();
        assert!(matches!(err, RespondError::Encode(_)));

        let (status, _, body) = body_of(writer).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());
    }
}
