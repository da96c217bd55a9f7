//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use relay_middleware::options::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT};
use relay_middleware::validator::DEFAULT_MAX_CHAIN_SIZE;
use relay_middleware::{ExecutionOptions, MiddlewareChain, ParallelGroup, ValidatorConfig};
use relay_telemetry::{LogConfig, MetricsConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chain configuration section.
///
/// Supplies the validator limit and the execution options used when a
/// caller runs the chain without explicit options.
///
/// # Example
///
/// ```
/// use relay_config::ChainConfig;
/// use std::time::Duration;
///
/// let config = ChainConfig {
///     default_timeout_ms: 5_000,
///     continue_on_error: true,
///     ..Default::default()
/// };
///
/// let options = config.execution_options();
/// assert_eq!(options.timeout, Duration::from_secs(5));
/// assert!(options.continue_on_error);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Largest chain the validator accepts.
    #[serde(default = "default_max_chain_size")]
    pub max_chain_size: usize,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Attempts per middleware, first attempt included.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Retry failed attempts.
    #[serde(default = "default_true")]
    pub enable_retries: bool,

    /// Keep going after a middleware fails.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Run `parallel_groups` instead of the sequential order.
    #[serde(default)]
    pub parallel_execution: bool,

    /// Groups for parallel mode, in dispatch order.
    #[serde(default)]
    pub parallel_groups: Vec<ParallelGroup>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_chain_size: default_max_chain_size(),
            default_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            enable_retries: true,
            continue_on_error: false,
            parallel_execution: false,
            parallel_groups: Vec::new(),
        }
    }
}

impl ChainConfig {
    /// Converts this section into default execution options.
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            continue_on_error: self.continue_on_error,
            enable_retries: self.enable_retries,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            timeout: Duration::from_millis(self.default_timeout_ms),
            parallel_execution: self.parallel_execution,
            parallel_groups: self.parallel_groups.clone(),
        }
    }

    /// Converts this section into validator limits.
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            max_chain_size: self.max_chain_size,
        }
    }

    /// Creates an empty chain using this section's limits and defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use relay_config::ChainConfig;
    ///
    /// let chain = ChainConfig::default().build_chain();
    /// assert!(!chain.default_options().continue_on_error);
    /// ```
    pub fn build_chain(&self) -> MiddlewareChain {
        MiddlewareChain::new()
            .with_validator_config(self.validator_config())
            .with_default_options(self.execution_options())
    }
}

fn default_max_chain_size() -> usize {
    DEFAULT_MAX_CHAIN_SIZE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log filter directive (e.g. "info" or "relay_middleware=debug,warn").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,

    /// Log span open and close events.
    #[serde(default)]
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
            span_events: false,
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            enabled: config.enabled,
            level: config.level.clone(),
            json_format: config.format == LogFormat::Json,
            span_events: config.span_events,
            file_line_info: config.include_location,
            include_target: true,
            ansi: config.ansi_enabled,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Enable the Prometheus exporter.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus listener address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: default_metrics_addr(),
        }
    }
}

impl From<&MetricsSection> for MetricsConfig {
    fn from(section: &MetricsSection) -> Self {
        Self {
            enabled: section.enabled,
            addr: section.addr.clone(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_true() -> bool {
    true
}
