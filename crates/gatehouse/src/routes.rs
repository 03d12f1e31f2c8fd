//! Routes mounted by the `gatehouse` binary.

use std::sync::Arc;

use gatehouse_config::{GatehouseConfig, LimiterSection};
use gatehouse_core::{FieldErrors, Reply};
use gatehouse_middleware::stages::Limiter;
use gatehouse_middleware::{handler_fn, BoxedMiddleware};
use gatehouse_server::{App, RouteAdder};
use http::{Method, StatusCode};

/// API group prefix.
pub const API_GROUP: &str = "/api";

/// Builds a shared limiter from the `[limiter]` section.
#[must_use]
pub fn limiter_from_config(section: &LimiterSection) -> Limiter {
    Limiter::every(section.period(), section.burst).max_wait(section.max_wait())
}

/// The demonstration routes.
///
/// - `GET /api/test-error` answers with a field-level validation failure.
/// - `GET /api/test-limit` answers `200` while the limiter has tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoRoutes;

impl RouteAdder for DemoRoutes {
    fn add(&self, app: &mut App, cfg: &GatehouseConfig) {
        app.handle(
            Method::GET,
            API_GROUP,
            "/test-error",
            handler_fn(|_ctx, _req| async {
                Reply::from(FieldErrors::new("value", "field value is required"))
            }),
            Vec::new(),
        );

        let limiter: BoxedMiddleware = Arc::new(limiter_from_config(&cfg.limiter));
        app.handle(
            Method::GET,
            API_GROUP,
            "/test-limit",
            handler_fn(|_ctx, _req| async {
                Reply::json(StatusCode::OK, serde_json::json!({"status": "ok"}))
            }),
            vec![limiter],
        );
    }
}
