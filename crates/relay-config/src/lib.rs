//! Typed configuration for Relay.
//!
//! Supports:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! The root type is [`RelayConfig`]:
//!
//! - [`ChainConfig`] - validator limit and default execution options
//! - [`LoggingConfig`] - log filter and output format
//! - [`MetricsSection`] - Prometheus exporter
//!
//! # Example
//!
//! ```no_run
//! use relay_config::ConfigLoader;
//!
//! # fn main() -> Result<(), relay_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_file("relay.toml")?
//!     .with_env_prefix("RELAY")
//!     .load()?;
//!
//! let chain = config.chain.build_chain();
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [chain]
//! max_chain_size = 50
//! default_timeout_ms = 30000
//! max_retries = 3
//! retry_delay_ms = 100
//! enable_retries = true
//! continue_on_error = false
//! parallel_execution = true
//!
//! [[chain.parallel_groups]]
//! name = "identity"
//! middleware = ["auth", "session"]
//!
//! [[chain.parallel_groups]]
//! name = "audit"
//! middleware = ["audit-log"]
//! wait_for_all = false
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Scalar values can be overridden with `PREFIX__SECTION__KEY`:
//!
//! - `RELAY__CHAIN__MAX_RETRIES=5`
//! - `RELAY__LOGGING__LEVEL=debug`
//! - `RELAY__METRICS__ENABLED=false`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{RelayConfig, RelayConfigBuilder};
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use schema::{ChainConfig, LogFormat, LoggingConfig, MetricsSection};
