//! Structured logging for Gatehouse.
//!
//! Log output is JSON for release builds and human-readable for development.
//! The filter comes from `RUST_LOG` when set, otherwise from the configured
//! level.
//!
//! # Example
//!
//! ```rust,ignore
//! use gatehouse_telemetry::logging::{LogConfig, init_logging};
//!
//! init_logging(&LogConfig::production())?;
//!
//! tracing::info!(request_id = %id, "request started");
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// Subscriber settings, usually built from the `[logging]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Installs no subscriber when `false`.
    pub enabled: bool,

    /// Filter directive (e.g., "info", "gatehouse_server=debug,hyper=warn").
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Adds file and line to each event.
    pub include_location: bool,

    /// Adds the module path to each event.
    pub include_target: bool,

    /// Adds the thread id to each event.
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Human-readable output at `debug`.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            include_target: true,
            thread_ids: false,
        }
    }

    /// JSON output at `info`.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            include_location: false,
            include_target: true,
            thread_ids: false,
        }
    }
}

/// Builds the filter, preferring `RUST_LOG` over the configured level.
pub fn create_env_filter(level: &str) -> TelemetryResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| TelemetryError::InvalidFilter(format!("{level}: {e}"))),
    }
}

/// Installs the global logging subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if a global subscriber is already
/// installed, and `TelemetryError::InvalidFilter` for a bad level.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;

    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Standard log field names.
///
/// Use these for consistency across log lines.
pub mod fields {
    /// Request ID.
    pub const REQUEST_ID: &str = "request_id";

    /// Trace ID.
    pub const TRACE_ID: &str = "trace_id";

    /// Authenticated user.
    pub const USER_ID: &str = "user_id";

    /// HTTP method.
    pub const HTTP_METHOD: &str = "method";

    /// Request path.
    pub const HTTP_PATH: &str = "path";

    /// Response status code.
    pub const HTTP_STATUS: &str = "status";

    /// Peer address.
    pub const REMOTE_ADDR: &str = "remote_addr";

    /// Duration in milliseconds.
    pub const DURATION_MS: &str = "duration_ms";

    /// Error message.
    pub const ERROR: &str = "err";

    /// Error kind code.
    pub const ERROR_KIND: &str = "kind";

    /// File where an error was constructed.
    pub const SOURCE_ERR_FILE: &str = "source_err_file";

    /// Line where an error was constructed.
    pub const SOURCE_ERR_LINE: &str = "source_err_line";
}
