//! Request logging.
//!
//! Logs one line when a request enters the chain and one when it leaves,
//! and records the request counter and latency histogram.

use gatehouse_core::{Reply, RequestContext};
use gatehouse_telemetry::metrics;
use http::StatusCode;

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::Request;

/// Logs request start and completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerMiddleware;

impl LoggerMiddleware {
    /// Creates the interceptor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Status the client will see for `reply`.
fn completed_status(ctx: &RequestContext, reply: &Reply) -> StatusCode {
    reply
        .wire_status()
        .or_else(|| ctx.writer().and_then(gatehouse_core::ResponseWriter::status))
        .unwrap_or(StatusCode::OK)
}

impl Middleware for LoggerMiddleware {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Reply> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_string();
            let remote_addr = ctx
                .remote_addr()
                .map_or_else(|| "-".to_string(), |addr| addr.to_string());

            tracing::info!(
                request_id = %ctx.request_id(),
                method = %method,
                path = %path,
                remote_addr = %remote_addr,
                "request started"
            );

            let reply = next.run(ctx.clone(), request).await;

            let status = completed_status(&ctx, &reply);
            let elapsed = ctx.elapsed();
            tracing::info!(
                request_id = %ctx.request_id(),
                method = %method,
                path = %path,
                remote_addr = %remote_addr,
                status = status.as_u16(),
                duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "request completed"
            );
            metrics::record_request(method.as_str(), status.as_u16(), elapsed);

            reply
        })
    }
}
