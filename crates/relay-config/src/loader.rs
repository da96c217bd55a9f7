//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, ConfigResult, LogFormat, RelayConfig};

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (or a preset)
/// 2. Configuration file or string (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use relay_config::ConfigLoader;
///
/// # fn main() -> Result<(), relay_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_dotenv()
///     .with_file("relay.toml")?
///     .with_env_prefix("RELAY")
///     .load()?;
///
/// println!("max chain size: {}", config.chain.max_chain_size);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: RelayConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Create a loader starting from default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use relay_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = RelayConfig::development();
        self
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = RelayConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension (`.toml` or `.json`). The file
    /// replaces the current configuration; sections and fields it omits
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, has an
    /// unsupported extension, or fails to parse (including unknown fields).
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> ConfigResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::unsupported_format(path.display().to_string()))?;

        self.config = parse(&content, format)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Same as [`with_file`](Self::with_file) when the file exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> ConfigResult<Self> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format
    /// (`"toml"` or `"json"`).
    ///
    /// # Example
    ///
    /// ```
    /// use relay_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [chain]
    ///     max_retries = 5
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.chain.max_retries, 5);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the format is unsupported or parsing fails.
    pub fn with_string(mut self, content: &str, format: &str) -> ConfigResult<Self> {
        self.config = parse(content, format)?;
        Ok(self)
    }

    /// Set the prefix for environment overrides.
    ///
    /// Variables use the form `PREFIX__SECTION__KEY`, for example
    /// `RELAY__CHAIN__MAX_RETRIES=5` or `RELAY__LOGGING__FORMAT=pretty`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load variables from a `.env` file into the process environment.
    ///
    /// A missing `.env` file is not an error.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or the final
    /// configuration is invalid.
    pub fn load(mut self) -> ConfigResult<RelayConfig> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: BTreeMap<String, String> = env::vars()
                .filter(|(key, _)| key.starts_with(&prefix))
                .collect();
            for (key, value) in &vars {
                self.apply_env_var(key, value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Return the configuration without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> RelayConfig {
        self.config
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> ConfigResult<()> {
        let Some(path) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };

        let parts: Vec<&str> = path.split("__").collect();
        let chain = &mut self.config.chain;
        let logging = &mut self.config.logging;
        let metrics = &mut self.config.metrics;

        match parts.as_slice() {
            ["CHAIN", "MAX_CHAIN_SIZE"] => chain.max_chain_size = parse_int(key, value)?,
            ["CHAIN", "DEFAULT_TIMEOUT_MS"] => chain.default_timeout_ms = parse_int(key, value)?,
            ["CHAIN", "MAX_RETRIES"] => chain.max_retries = parse_int(key, value)?,
            ["CHAIN", "RETRY_DELAY_MS"] => chain.retry_delay_ms = parse_int(key, value)?,
            ["CHAIN", "ENABLE_RETRIES"] => chain.enable_retries = parse_flag(key, value)?,
            ["CHAIN", "CONTINUE_ON_ERROR"] => chain.continue_on_error = parse_flag(key, value)?,
            ["CHAIN", "PARALLEL_EXECUTION"] => chain.parallel_execution = parse_flag(key, value)?,

            ["LOGGING", "ENABLED"] => logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "ANSI_ENABLED"] => logging.ansi_enabled = parse_flag(key, value)?,
            ["LOGGING", "INCLUDE_LOCATION"] => logging.include_location = parse_flag(key, value)?,
            ["LOGGING", "SPAN_EVENTS"] => logging.span_events = parse_flag(key, value)?,

            ["METRICS", "ENABLED"] => metrics.enabled = parse_flag(key, value)?,
            ["METRICS", "ADDR"] => metrics.addr = value.to_string(),

            // Unknown keys are ignored.
            _ => {}
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> ConfigResult<RelayConfig> {
    match format.to_lowercase().as_str() {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::unsupported_format(other)),
    }
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> ConfigResult<bool> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_loader_presets() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);

        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"chain": {"continue_on_error": true}, "metrics": {"enabled": false}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert!(config.chain.continue_on_error);
        assert!(!config.metrics.enabled);
        assert_eq!(config.chain.max_retries, 3);
    }

    #[test]
    fn test_loader_rejects_unknown_fields() {
        let toml = r#"
            [chain]
            max_retry = 5
        "#;

        let err = ConfigLoader::new().with_string(toml, "toml").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_loader_rejects_unsupported_format() {
        let err = ConfigLoader::new().with_string("", "yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(f) if f == "yaml"));
    }

    #[test]
    fn test_loader_with_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [chain]
            max_chain_size = 20
            default_timeout_ms = 2000
            parallel_execution = true

            [[chain.parallel_groups]]
            name = "identity"
            middleware = ["auth", "session"]

            [logging]
            level = "relay_middleware=debug,info"
            format = "pretty"

            [metrics]
            addr = "127.0.0.1:9100"
            "#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();

        assert_eq!(config.chain.max_chain_size, 20);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.metrics.addr, "127.0.0.1:9100");

        let options = config.chain.execution_options();
        assert_eq!(options.timeout, Duration::from_secs(2));
        assert_eq!(options.parallel_groups[0].middleware, vec!["auth", "session"]);
        assert!(options.parallel_groups[0].wait_for_all);
    }

    #[test]
    fn test_loader_with_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"chain": {{"retry_delay_ms": 5}}}}"#).unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.chain.retry_delay_ms, 5);
    }

    #[test]
    fn test_loader_file_without_extension() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let err = ConfigLoader::new()
            .with_file("/nonexistent/relay.toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/relay.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_load_validates() {
        let err = ConfigLoader::new()
            .with_string("[chain]\nmax_retries = 0", "toml")
            .unwrap()
            .load()
            .unwrap_err();
        assert_eq!(err.field(), Some("chain.max_retries"));
    }

    #[test]
    fn test_load_unvalidated() {
        let config = ConfigLoader::new()
            .with_string("[chain]\nmax_retries = 0", "toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config.chain.max_retries, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        for value in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(value), Some(true));
        }
        for value in ["false", "False", "0", "no", "off"] {
            assert_eq!(parse_bool(value), Some(false));
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    // Overrides are applied through `apply_env_var` directly so tests never
    // mutate the shared process environment.

    #[test]
    fn test_apply_env_var_chain() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__CHAIN__MAX_RETRIES", "5", "TEST").unwrap();
        loader.apply_env_var("TEST__CHAIN__CONTINUE_ON_ERROR", "yes", "TEST").unwrap();
        loader.apply_env_var("TEST__CHAIN__RETRY_DELAY_MS", "0", "TEST").unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.chain.max_retries, 5);
        assert!(config.chain.continue_on_error);
        assert_eq!(config.chain.retry_delay_ms, 0);
    }

    #[test]
    fn test_parallel_override_without_groups_fails_load() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__CHAIN__PARALLEL_EXECUTION", "true", "TEST")
            .unwrap();

        let err = loader.load().unwrap_err();
        assert_eq!(err.field(), Some("chain.parallel_groups"));
    }

    #[test]
    fn test_apply_env_var_logging_and_metrics() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__LOGGING__FORMAT", "pretty", "TEST").unwrap();
        loader.apply_env_var("TEST__LOGGING__LEVEL", "warn", "TEST").unwrap();
        loader.apply_env_var("TEST__METRICS__ENABLED", "off", "TEST").unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.level, "warn");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_apply_env_var_invalid_values() {
        let mut loader = ConfigLoader::new();
        let err = loader
            .apply_env_var("TEST__CHAIN__MAX_CHAIN_SIZE", "lots", "TEST")
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));

        assert!(loader
            .apply_env_var("TEST__CHAIN__ENABLE_RETRIES", "maybe", "TEST")
            .is_err());
        assert!(loader
            .apply_env_var("TEST__LOGGING__FORMAT", "xml", "TEST")
            .is_err());
    }

    #[test]
    fn test_apply_env_var_ignores_unknown_keys() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__CHAIN__UNKNOWN", "1", "TEST").unwrap();
        loader.apply_env_var("TESTING", "1", "TEST").unwrap();
        assert_eq!(loader.load_unvalidated(), RelayConfig::default());
    }
}
