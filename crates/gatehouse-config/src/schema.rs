//! Configuration sections.
//!
//! Every section rejects unknown fields and defaults each missing field, so a
//! file only has to name what it changes.

use std::time::Duration;

use gatehouse_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

/// Build mode. Selects the listen address form and the log defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Local development: bind `localhost`, pretty logs.
    #[default]
    Develop,
    /// Deployed: bind every interface, JSON logs.
    Release,
}

impl BuildMode {
    /// Returns the lowercase name used in files and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Develop => "develop",
            Self::Release => "release",
        }
    }
}

impl std::str::FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "develop" => Ok(Self::Develop),
            "release" => Ok(Self::Release),
            other => Err(format!("unknown build mode '{other}', expected 'develop' or 'release'")),
        }
    }
}

/// HTTP listener section.
///
/// ```
/// use gatehouse_config::ServerSection;
///
/// let server = ServerSection::default();
/// assert_eq!(server.port, "8000");
/// assert_eq!(server.read_timeout_secs, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: String,

    /// Bound on reading a request, in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Bound on producing a response, in seconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Idle keep-alive lifetime, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Drain bound at shutdown, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Largest request body accepted, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_port() -> String {
    "8000".to_string()
}

const fn default_read_timeout() -> u64 {
    5
}

const fn default_write_timeout() -> u64 {
    10
}

const fn default_idle_timeout() -> u64 {
    120
}

const fn default_shutdown_timeout() -> u64 {
    20
}

const fn default_max_body_bytes() -> u64 {
    1024 * 1024
}

/// Cross-origin section. An empty list disables CORS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct CorsSection {
    /// Allowed origins, or `*`.
    #[serde(default)]
    pub origins: Vec<String>,
}

/// Rate limiter section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LimiterSection {
    /// Bucket capacity.
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Seconds between token refills.
    #[serde(default = "default_period")]
    pub period_secs: u64,

    /// Longest a request may wait for a token, in milliseconds.
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,
}

impl LimiterSection {
    /// Returns the refill period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    /// Returns the wait budget.
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl Default for LimiterSection {
    fn default() -> Self {
        Self {
            burst: default_burst(),
            period_secs: default_period(),
            max_wait_ms: default_max_wait(),
        }
    }
}

const fn default_burst() -> u32 {
    5
}

const fn default_period() -> u64 {
    10
}

const fn default_max_wait() -> u64 {
    1000
}

/// CSRF section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CsrfSection {
    /// Lifetime of an issued token, in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

impl CsrfSection {
    /// Returns the token lifetime.
    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

impl Default for CsrfSection {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl(),
        }
    }
}

const fn default_token_ttl() -> u64 {
    3600
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Filter directive, e.g. `info` or `gatehouse=debug,hyper=warn`.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Adds file and line to each event.
    #[serde(default)]
    pub include_location: bool,
}

impl LoggingSection {
    /// Converts to the subscriber settings.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level.clone(),
            format: self.format,
            include_location: self.include_location,
            ..LogConfig::production()
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
