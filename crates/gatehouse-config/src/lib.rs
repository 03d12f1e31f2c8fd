//! Typed configuration for Gatehouse.
//!
//! [`GatehouseConfig`] holds every setting, grouped in sections:
//!
//! - [`ServerSection`] - port and timeouts
//! - [`CorsSection`] - allowed origins
//! - [`LimiterSection`] - token bucket shape
//! - [`CsrfSection`] - token lifetime
//! - [`LoggingSection`] - level and output format
//!
//! Sections reject unknown fields. [`ConfigLoader`] layers defaults, files
//! and environment variables.
//!
//! # Configuration File Format
//!
//! ```toml
//! build = "release"
//!
//! [server]
//! port = "8000"
//! read_timeout_secs = 5
//! write_timeout_secs = 10
//! idle_timeout_secs = 120
//! shutdown_timeout_secs = 20
//! max_body_bytes = 1048576
//!
//! [cors]
//! origins = ["https://app.example.com"]
//!
//! [limiter]
//! burst = 5
//! period_secs = 10
//! max_wait_ms = 1000
//!
//! [csrf]
//! token_ttl_secs = 3600
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `GATEHOUSE__BUILD=release`
//! - `GATEHOUSE__SERVER__PORT=9000`
//! - `GATEHOUSE__CORS__ORIGINS=https://a.example,https://b.example`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::GatehouseConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{BuildMode, CorsSection, CsrfSection, LimiterSection, LoggingSection, ServerSection};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_file_parses() {
        let text = r#"
build = "release"

[server]
port = "8000"

[cors]
origins = ["https://app.example.com"]

[logging]
level = "info"
format = "json"
"#;
        let config = ConfigLoader::new().with_string(text, "toml").unwrap().load().unwrap();
        assert_eq!(config.build, BuildMode::Release);
        assert_eq!(config.cors.origins.len(), 1);
    }
}
