//! The root configuration type.

use serde::{Deserialize, Serialize};

use gatehouse_telemetry::LogFormat;

use crate::{BuildMode, ConfigError, CorsSection, CsrfSection, LimiterSection, LoggingSection, ServerSection};

/// Complete Gatehouse configuration.
///
/// Load it with [`ConfigLoader`](crate::ConfigLoader).
///
/// ```
/// use gatehouse_config::{BuildMode, GatehouseConfig};
///
/// let config = GatehouseConfig::default();
/// assert_eq!(config.build, BuildMode::Develop);
/// assert_eq!(config.listen_addr(), "localhost:8000");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct GatehouseConfig {
    /// Build mode.
    #[serde(default)]
    pub build: BuildMode,

    /// Listener settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Cross-origin settings.
    #[serde(default)]
    pub cors: CorsSection,

    /// Rate limiter settings.
    #[serde(default)]
    pub limiter: LimiterSection,

    /// CSRF settings.
    #[serde(default)]
    pub csrf: CsrfSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl GatehouseConfig {
    /// Local development: `localhost`, pretty logs at `debug` with locations.
    #[must_use]
    pub fn development() -> Self {
        Self {
            build: BuildMode::Develop,
            logging: LoggingSection {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                include_location: true,
            },
            ..Self::default()
        }
    }

    /// Deployment: every interface, JSON logs at `info`.
    #[must_use]
    pub fn release() -> Self {
        Self {
            build: BuildMode::Release,
            logging: LoggingSection::default(),
            ..Self::default()
        }
    }

    /// Returns the preset for `mode`.
    #[must_use]
    pub fn for_mode(mode: BuildMode) -> Self {
        match mode {
            BuildMode::Develop => Self::development(),
            BuildMode::Release => Self::release(),
        }
    }

    /// Returns the address to bind.
    ///
    /// `localhost:{port}` in develop mode, `0.0.0.0:{port}` in release mode.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        match self.build {
            BuildMode::Develop => format!("localhost:{}", self.server.port),
            BuildMode::Release => format!("0.0.0.0:{}", self.server.port),
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.server.port.parse::<u16>() {
            Ok(0) | Err(_) => {
                return Err(ConfigError::invalid_value(
                    "server.port",
                    format!("'{}' is not a port between 1 and 65535", self.server.port),
                ));
            }
            Ok(_) => {}
        }

        let positive = [
            ("server.read_timeout_secs", self.server.read_timeout_secs),
            ("server.write_timeout_secs", self.server.write_timeout_secs),
            ("server.idle_timeout_secs", self.server.idle_timeout_secs),
            ("server.shutdown_timeout_secs", self.server.shutdown_timeout_secs),
            ("server.max_body_bytes", self.server.max_body_bytes),
            ("limiter.burst", u64::from(self.limiter.burst)),
            ("limiter.period_secs", self.limiter.period_secs),
            ("limiter.max_wait_ms", self.limiter.max_wait_ms),
            ("csrf.token_ttl_secs", self.csrf.token_ttl_secs),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::invalid_value(*field, "must be greater than zero"));
        }

        if let Some(origin) = self.cors.origins.iter().find(|origin| !is_valid_origin(origin)) {
            return Err(ConfigError::invalid_value(
                "cors.origins",
                format!("'{origin}' must be '*' or start with http:// or https://"),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }

        Ok(())
    }
}

fn is_valid_origin(origin: &str) -> bool {
    origin == "*" || origin.starts_with("http://") || origin.starts_with("https://")
}
