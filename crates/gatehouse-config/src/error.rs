//! Errors raised by [`ConfigLoader`](crate::ConfigLoader) and
//! [`GatehouseConfig::validate`](crate::GatehouseConfig::validate).

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration file does not exist.
    #[error("config file {path} does not exist")]
    FileNotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// A configuration file exists but could not be read.
    #[error("cannot read config file {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing failed, including unknown fields.
    #[error("malformed TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing failed, including unknown fields.
    #[error("malformed JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The file extension or format name is neither TOML nor JSON.
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// A field holds a value outside its allowed range.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted field path, e.g. `server.port`.
        field: String,
        /// Why the value is rejected.
        reason: String,
    },

    /// An override variable could not be parsed.
    #[error("bad override {var}: {reason}")]
    EnvParseError {
        /// Variable name.
        var: String,
        /// Why parsing failed.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a [`ConfigError::FileNotFound`].
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates a [`ConfigError::ReadError`].
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Creates a [`ConfigError::InvalidValue`].
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`ConfigError::EnvParseError`].
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }
}
