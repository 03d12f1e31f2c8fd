//! Request metrics.
//!
//! Metrics are emitted through the [`metrics`] facade. No exporter is
//! installed here; without a recorder the calls are no-ops.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `gatehouse_requests_total` | Counter | `method`, `status` | Completed requests |
//! | `gatehouse_request_duration_seconds` | Histogram | `method` | Request latency |
//! | `gatehouse_errors_total` | Counter | `kind` | Error replies by kind |
//! | `gatehouse_rate_limited_total` | Counter | - | Requests rejected by the limiter |
//! | `gatehouse_in_flight_requests` | Gauge | - | Requests being processed |

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Metric names.
pub mod names {
    /// Completed requests.
    pub const REQUESTS_TOTAL: &str = "gatehouse_requests_total";
    /// Request latency.
    pub const REQUEST_DURATION_SECONDS: &str = "gatehouse_request_duration_seconds";
    /// Error replies by kind.
    pub const ERRORS_TOTAL: &str = "gatehouse_errors_total";
    /// Requests rejected by the limiter.
    pub const RATE_LIMITED_TOTAL: &str = "gatehouse_rate_limited_total";
    /// Requests being processed.
    pub const IN_FLIGHT_REQUESTS: &str = "gatehouse_in_flight_requests";
}

/// Registers descriptions for all standard metrics with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(names::REQUESTS_TOTAL, "Total number of HTTP requests processed");
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(names::ERRORS_TOTAL, "Error replies by error kind");
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Requests rejected by the rate limiter"
    );
    describe_gauge!(
        names::IN_FLIGHT_REQUESTS,
        "Number of HTTP requests currently being processed"
    );
}

/// Records a completed request.
pub fn record_request(method: &str, status_code: u16, duration: Duration) {
    counter!(
        names::REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        names::REQUEST_DURATION_SECONDS,
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records one error reply.
pub fn record_error(kind: &'static str) {
    counter!(names::ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Records one rate-limit rejection.
pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}

/// Guard that tracks a request in the in-flight gauge until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::IN_FLIGHT_REQUESTS).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(names::IN_FLIGHT_REQUESTS).decrement(1.0);
    }
}
