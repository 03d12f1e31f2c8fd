//! Observability for Gatehouse.
//!
//! - **Logging**: structured output via `tracing-subscriber`, JSON in release
//!   builds and pretty-printed in development
//! - **Metrics**: request counters and latency histograms via the `metrics`
//!   facade, exported by whichever recorder the binary installs
//!
//! # Example
//!
//! ```rust,ignore
//! use gatehouse_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! gatehouse_telemetry::metrics::describe_metrics();
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{fields, init_logging, LogConfig, LogFormat};
pub use metrics::{describe_metrics, InFlightGuard};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
