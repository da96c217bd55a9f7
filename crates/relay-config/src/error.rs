//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Failed to read configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error.
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// File extension or format name is neither TOML nor JSON.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Invalid configuration value.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field with the invalid value.
        field: String,
        /// Explanation of why the value is invalid.
        reason: String,
    },

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },
}

impl ConfigError {
    /// Create a new file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a new read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Create a new unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a new environment variable parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Returns the offending field for value errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_error() {
        let err = ConfigError::file_not_found("/etc/relay/relay.toml");
        assert!(err.to_string().contains("/etc/relay/relay.toml"));
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value("chain.max_retries", "must be at least 1");
        assert!(err.to_string().contains("chain.max_retries"));
        assert!(err.to_string().contains("must be at least 1"));
        assert_eq!(err.field(), Some("chain.max_retries"));
    }

    #[test]
    fn test_env_parse_error() {
        let err = ConfigError::env_parse_error("RELAY__CHAIN__MAX_RETRIES", "expected integer");
        assert!(err.to_string().contains("RELAY__CHAIN__MAX_RETRIES"));
        assert!(err.to_string().contains("expected integer"));
        assert_eq!(err.field(), None);
    }

    #[test]
    fn test_unsupported_format_error() {
        let err = ConfigError::unsupported_format("yaml");
        assert_eq!(err.to_string(), "unsupported configuration format: yaml");
    }
}
