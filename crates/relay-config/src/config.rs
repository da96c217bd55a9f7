//! Main configuration types.
//!
//! This module provides the top-level [`RelayConfig`] struct and its builder.

use serde::{Deserialize, Serialize};

use crate::{ChainConfig, ConfigError, ConfigResult, LogFormat, LoggingConfig, MetricsSection};

/// Complete Relay configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use relay_config::RelayConfig;
///
/// let config = RelayConfig::default();
/// assert_eq!(config.chain.max_chain_size, 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Chain limits and default execution options.
    #[serde(default)]
    pub chain: ChainConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics exporter configuration.
    #[serde(default)]
    pub metrics: MetricsSection,
}

impl RelayConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chain.max_chain_size == 0 {
            return Err(ConfigError::invalid_value(
                "chain.max_chain_size",
                "must be at least 1",
            ));
        }

        if self.chain.max_retries == 0 {
            return Err(ConfigError::invalid_value(
                "chain.max_retries",
                "must be at least 1",
            ));
        }

        if self.chain.default_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "chain.default_timeout_ms",
                "must be at least 1",
            ));
        }

        if self.chain.parallel_execution && self.chain.parallel_groups.is_empty() {
            return Err(ConfigError::invalid_value(
                "chain.parallel_groups",
                "parallel_execution requires at least one group",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }

        if self.metrics.enabled && self.metrics.addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "metrics.addr",
                format!("invalid socket address: {}", self.metrics.addr),
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Debug level pretty logs with source locations, no metrics exporter
    /// and no retries, so failures surface immediately.
    ///
    /// # Example
    ///
    /// ```
    /// use relay_config::RelayConfig;
    ///
    /// let config = RelayConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.ansi_enabled = true;
        config.logging.include_location = true;
        config.logging.span_events = true;

        config.metrics.enabled = false;
        config.chain.enable_retries = false;

        config
    }

    /// Create a production configuration preset.
    ///
    /// # Example
    ///
    /// ```
    /// use relay_config::{LogFormat, RelayConfig};
    ///
    /// let config = RelayConfig::production();
    /// assert_eq!(config.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.logging.ansi_enabled = false;

        config.metrics.enabled = true;

        config
    }
}

/// Builder for [`RelayConfig`].
#[derive(Debug, Default)]
pub struct RelayConfigBuilder {
    chain: Option<ChainConfig>,
    logging: Option<LoggingConfig>,
    metrics: Option<MetricsSection>,
}

impl RelayConfigBuilder {
    /// Set the chain configuration.
    #[must_use]
    pub fn chain(mut self, chain: ChainConfig) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Set the metrics configuration.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricsSection) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> RelayConfig {
        RelayConfig {
            chain: self.chain.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
        }
    }
}
