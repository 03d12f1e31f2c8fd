//! Listener settings.
//!
//! ```
//! use gatehouse_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .http_addr("127.0.0.1:9000")
//!     .write_timeout(Duration::from_secs(3))
//!     .build();
//!
//! assert_eq!(config.http_addr(), "127.0.0.1:9000");
//! assert_eq!(config.write_timeout(), Duration::from_secs(3));
//! ```

use std::time::Duration;

use gatehouse_config::GatehouseConfig;

/// Default listen address in development builds.
pub const DEFAULT_HTTP_ADDR: &str = "localhost:8000";

/// Default bound on reading request headers and body.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on producing a response.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lifetime of an idle keep-alive connection.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Default bound on draining connections at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

/// Default cap on a buffered request body (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// `host:port` to bind. Host names are resolved at bind time.
    http_addr: String,
    read_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    shutdown_timeout: Duration,
    max_body_bytes: usize,
}

impl ServerConfig {
    /// Starts a builder from the defaults.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Returns the bind address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Returns the header and body read bound.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Returns the dispatch bound. Exceeding it answers `503`.
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Returns how long a connection may sit idle between requests.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Returns the drain bound at shutdown.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns the largest request body accepted. Larger bodies get `413`.
    #[must_use]
    pub const fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfigBuilder::new().build()
    }
}

impl From<&GatehouseConfig> for ServerConfig {
    fn from(cfg: &GatehouseConfig) -> Self {
        let server = &cfg.server;
        Self::builder()
            .http_addr(cfg.listen_addr())
            .read_timeout(Duration::from_secs(server.read_timeout_secs))
            .write_timeout(Duration::from_secs(server.write_timeout_secs))
            .idle_timeout(Duration::from_secs(server.idle_timeout_secs))
            .shutdown_timeout(Duration::from_secs(server.shutdown_timeout_secs))
            .max_body_bytes(usize::try_from(server.max_body_bytes).unwrap_or(usize::MAX))
            .build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    http_addr: String,
    read_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    shutdown_timeout: Duration,
    max_body_bytes: usize,
}

impl ServerConfigBuilder {
    /// Creates a builder holding the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Sets the bind address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Sets the read bound.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the dispatch bound.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the idle connection bound.
    #[must_use]
    pub const fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the drain bound.
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the request body cap.
    #[must_use]
    pub const fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            http_addr: self.http_addr,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            idle_timeout: self.idle_timeout,
            shutdown_timeout: self.shutdown_timeout,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_config::BuildMode;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr(), DEFAULT_HTTP_ADDR);
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.write_timeout(), Duration::from_secs(10));
        assert_eq!(config.idle_timeout(), Duration::from_secs(120));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(20));
        assert_eq!(config.max_body_bytes(), 1024 * 1024);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::builder()
            .http_addr("0.0.0.0:9090")
            .read_timeout(Duration::from_secs(1))
            .idle_timeout(Duration::from_secs(30))
            .shutdown_timeout(Duration::from_secs(2))
            .build();

        assert_eq!(config.http_addr(), "0.0.0.0:9090");
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.write_timeout(), DEFAULT_WRITE_TIMEOUT);
        assert_eq!(config.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_from_develop_config() {
        let mut cfg = GatehouseConfig::development();
        cfg.server.port = "8123".to_string();
        cfg.server.write_timeout_secs = 4;
        cfg.server.max_body_bytes = 2048;

        let config = ServerConfig::from(&cfg);
        assert_eq!(config.http_addr(), "localhost:8123");
        assert_eq!(config.write_timeout(), Duration::from_secs(4));
        assert_eq!(config.max_body_bytes(), 2048);
    }

    #[test]
    fn test_from_release_config() {
        let mut cfg = GatehouseConfig::release();
        cfg.server.port = "80".to_string();
        assert_eq!(cfg.build, BuildMode::Release);

        let config = ServerConfig::from(&cfg);
        assert_eq!(config.http_addr(), "0.0.0.0:80");
    }
}
