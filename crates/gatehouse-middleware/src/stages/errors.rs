//! Error translation and logging.
//!
//! Every error reply that reaches this stage is logged exactly once, with the
//! file and line where it was constructed. Errors flagged
//! [`InternalOnlyLog`](ErrorKind::InternalOnlyLog) are then replaced by a
//! generic internal error so their details never leave the process.
//!
//! Replies that are not failures, including errors of kind
//! [`ErrorKind::None`], pass through untouched.

use gatehouse_core::{AppError, ErrorKind, Failure, Reply, RequestContext};
use gatehouse_telemetry::metrics;

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::Request;

/// Message sent to clients in place of internal-only errors.
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

/// Logs error replies and hides internal-only details.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorsMiddleware;

impl ErrorsMiddleware {
    /// Creates the interceptor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn log_failure(ctx: &RequestContext, failure: Failure<'_>) {
    match failure {
        Failure::Error(err) => {
            let provenance = err.provenance();
            tracing::error!(
                err = %err,
                source_err_file = provenance.file_name(),
                source_err_line = provenance.line(),
                request_id = %ctx.request_id(),
                kind = err.kind().code(),
                "request failed"
            );
            metrics::record_error(err.kind().code());
        }
        Failure::Fields(errs) => {
            let provenance = errs.provenance();
            tracing::error!(
                err = ?errs.fields(),
                source_err_file = provenance.file_name(),
                source_err_line = provenance.line(),
                request_id = %ctx.request_id(),
                kind = errs.kind().code(),
                "request failed"
            );
            metrics::record_error(errs.kind().code());
        }
    }
}

impl Middleware for ErrorsMiddleware {
    fn name(&self) -> &'static str {
        "errors"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Reply> {
        Box::pin(async move {
            let reply = next.run(ctx.clone(), request).await;

            let Some(failure) = reply.as_failure() else {
                return reply;
            };
            log_failure(&ctx, failure);

            match reply {
                Reply::Error(err) if err.kind() == ErrorKind::InternalOnlyLog => {
                    AppError::internal(INTERNAL_SERVER_ERROR).into()
                }
                other => other,
            }
        })
    }
}
