//! Layered configuration loading.
//!
//! Layers apply in call order, each overriding only the keys it names:
//!
//! 1. Defaults or a preset
//! 2. Configuration files and strings (TOML or JSON)
//! 3. Environment variables `PREFIX__SECTION__KEY`, applied by [`load`]
//!
//! [`load`]: ConfigLoader::load

use std::env;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::{BuildMode, ConfigError, GatehouseConfig};

/// Builds a [`GatehouseConfig`] from layered sources.
///
/// ```no_run
/// use gatehouse_config::ConfigLoader;
///
/// # fn main() -> Result<(), gatehouse_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_dotenv()
///     .with_optional_file("config.toml")?
///     .with_env_prefix("GATEHOUSE")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: GatehouseConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Starts from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the preset for `mode`.
    #[must_use]
    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.config = GatehouseConfig::for_mode(mode);
        self
    }

    /// Layers a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, malformed, names an unknown
    /// field or has another extension.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match format.as_str() {
            "toml" | "json" => self.with_string(&content, &format),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Layers a file if it exists.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Layers configuration text in `format` (`toml` or `json`).
    ///
    /// ```
    /// use gatehouse_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\nport = \"9000\"", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.port, "9000");
    /// assert_eq!(config.server.write_timeout_secs, 10);
    /// ```
    ///
    /// # Errors
    ///
    /// Fails on malformed text, unknown fields or an unknown format.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer = match format.to_lowercase().as_str() {
            "toml" => {
                // Parse into the typed form first so strict field errors are reported.
                let _: GatehouseConfig = toml::from_str(content)?;
                let table: toml::Value = toml::from_str(content)?;
                serde_json::to_value(table)?
            }
            "json" => {
                let _: GatehouseConfig = serde_json::from_str(content)?;
                serde_json::from_str(content)?
            }
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        self.merge_layer(layer)?;
        Ok(self)
    }

    /// Reads `.env` into the process environment if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        self
    }

    /// Enables `PREFIX__SECTION__KEY` overrides, e.g.
    /// `GATEHOUSE__SERVER__PORT=9000` or `GATEHOUSE__BUILD=release`.
    ///
    /// List values take a comma-separated string.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Fails on an unparsable override or an invalid final value.
    pub fn load(self) -> Result<GatehouseConfig, ConfigError> {
        let config = self.resolve()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides without validating, so callers can
    /// layer command-line values on top before calling
    /// [`GatehouseConfig::validate`].
    ///
    /// # Errors
    ///
    /// Fails on an unparsable override.
    pub fn resolve(mut self) -> Result<GatehouseConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }
        Ok(self.config)
    }

    /// Returns the configuration without environment overrides or
    /// validation.
    #[must_use]
    pub fn load_unvalidated(self) -> GatehouseConfig {
        self.config
    }

    fn merge_layer(&mut self, layer: Value) -> Result<(), ConfigError> {
        let mut base = serde_json::to_value(&self.config)?;
        merge(&mut base, layer);
        self.config = serde_json::from_value(base)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        let mut vars: Vec<(String, String)> = env::vars()
            .filter(|(key, _)| key.starts_with(&marker))
            .collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let path = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?
            .to_lowercase();
        let parts: Vec<&str> = path.split("__").collect();

        let mut base = serde_json::to_value(&self.config)?;
        let slot = parts
            .iter()
            .try_fold(&mut base, |node, part| node.get_mut(*part))
            .ok_or_else(|| ConfigError::env_parse_error(key, "unknown configuration key"))?;

        let replacement = match &*slot {
            Value::Bool(_) => Value::Bool(
                parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?,
            ),
            Value::Number(_) => Value::Number(
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?
                    .into(),
            ),
            Value::Array(_) => Value::Array(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| Value::String(item.to_string()))
                    .collect(),
            ),
            Value::Object(_) => {
                return Err(ConfigError::env_parse_error(key, "names a section, not a key"));
            }
            Value::String(_) | Value::Null => Value::String(normalize_string(&parts, value)),
        };
        *slot = replacement;

        self.config = serde_json::from_value(base)
            .map_err(|e| ConfigError::env_parse_error(key, e.to_string()))?;
        Ok(())
    }
}

/// Enum-valued keys accept any case.
fn normalize_string(parts: &[&str], value: &str) -> String {
    match parts {
        ["build"] | ["logging", "format"] => value.to_lowercase(),
        _ => value.to_string(),
    }
}

/// Deep-merges `layer` into `base`. Tables merge by key, other values replace.
fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_telemetry::LogFormat;
    use std::io::Write;

    #[test]
    fn test_defaults_load() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, GatehouseConfig::default());
    }

    #[test]
    fn test_mode_preset() {
        let config = ConfigLoader::new().with_mode(BuildMode::Release).load().unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn test_file_layer_keeps_preset_values() {
        let config = ConfigLoader::new()
            .with_mode(BuildMode::Develop)
            .with_string("[limiter]\nburst = 20", "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.limiter.burst, 20);
        assert_eq!(config.limiter.period_secs, 10);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_json_string() {
        let config = ConfigLoader::new()
            .with_string(r#"{"build": "release", "cors": {"origins": ["*"]}}"#, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.build, BuildMode::Release);
        assert_eq!(config.cors.origins, vec!["*".to_string()]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ConfigLoader::new().with_string("[server]\nhttp_addr = \"x\"", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_unknown_format() {
        let result = ConfigLoader::new().with_string("port: 1", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
build = "release"

[server]
port = "8443"
idle_timeout_secs = 60

[csrf]
token_ttl_secs = 600
"#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:8443");
        assert_eq!(config.server.idle_timeout_secs, 60);
        assert_eq!(config.server.read_timeout_secs, 5);
        assert_eq!(config.csrf.token_ttl_secs, 600);
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"logging": {{"level": "warn"}}}}"#).unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_missing_and_optional_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.toml");

        assert!(matches!(
            ConfigLoader::new().with_file(&missing),
            Err(ConfigError::FileNotFound { .. })
        ));
        assert!(ConfigLoader::new().with_optional_file(&missing).is_ok());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(
            ConfigLoader::new().with_file(file.path()),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_invalid_value_fails_load() {
        let result = ConfigLoader::new()
            .with_string("[server]\nport = \"99999\"", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    // Overrides are applied directly so tests do not race on the process
    // environment.
    #[test]
    fn test_env_var_string_and_number() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("GATEHOUSE__SERVER__PORT", "9100", "GATEHOUSE").unwrap();
        loader.apply_env_var("GATEHOUSE__LIMITER__BURST", "12", "GATEHOUSE").unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.server.port, "9100");
        assert_eq!(config.limiter.burst, 12);
    }

    #[test]
    fn test_env_var_enums_and_lists() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("GATEHOUSE__BUILD", "RELEASE", "GATEHOUSE").unwrap();
        loader.apply_env_var("GATEHOUSE__LOGGING__FORMAT", "Pretty", "GATEHOUSE").unwrap();
        loader.apply_env_var("GATEHOUSE__LOGGING__INCLUDE_LOCATION", "yes", "GATEHOUSE").unwrap();
        loader
            .apply_env_var("GATEHOUSE__CORS__ORIGINS", "https://a.example, https://b.example", "GATEHOUSE")
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.build, BuildMode::Release);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.logging.include_location);
        assert_eq!(config.cors.origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_env_var_errors() {
        let mut loader = ConfigLoader::new();
        assert!(matches!(
            loader.apply_env_var("GATEHOUSE__LIMITER__BURST", "many", "GATEHOUSE"),
            Err(ConfigError::EnvParseError { .. })
        ));
        assert!(matches!(
            loader.apply_env_var("GATEHOUSE__SERVER__HOST", "x", "GATEHOUSE"),
            Err(ConfigError::EnvParseError { .. })
        ));
        assert!(matches!(
            loader.apply_env_var("GATEHOUSE__SERVER", "x", "GATEHOUSE"),
            Err(ConfigError::EnvParseError { .. })
        ));
        assert!(matches!(
            loader.apply_env_var("GATEHOUSE__BUILD", "staging", "GATEHOUSE"),
            Err(ConfigError::EnvParseError { .. })
        ));
    }

    #[test]
    fn test_env_prefix_from_process() {
        env::set_var("GHTESTLOAD__SERVER__PORT", "8088");
        let config = ConfigLoader::new().with_env_prefix("ghtestload").load().unwrap();
        env::remove_var("GHTESTLOAD__SERVER__PORT");
        assert_eq!(config.server.port, "8088");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_merge_replaces_leaves() {
        let mut base = serde_json::json!({"a": {"b": 1, "c": 2}, "d": [1]});
        merge(&mut base, serde_json::json!({"a": {"b": 5}, "d": [2, 3]}));
        assert_eq!(base, serde_json::json!({"a": {"b": 5, "c": 2}, "d": [2, 3]}));
    }
}
