//! Structured logging for Relay.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and either
//! JSON output (production) or pretty output (development).
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//!
//! tracing::info!(middleware = "auth", duration_ms = 3, "middleware completed");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Log filter (e.g. "info", "relay_middleware=debug,warn").
    pub level: String,

    /// Whether to output JSON format.
    pub json_format: bool,

    /// Whether to include span open/close events.
    pub span_events: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include target (module path).
    pub include_target: bool,

    /// Whether to emit ANSI colour codes (pretty format only).
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            include_target: true,
            ansi: false,
        }
    }
}

impl LogConfig {
    /// Creates a development configuration with human-readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            include_target: true,
            ansi: true,
        }
    }

    /// Creates a production configuration with JSON output.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }
}

/// Initializes the logging subsystem.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the filter is invalid or a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(config.ansi)
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    Ok(())
}

/// Creates an env filter from a string.
///
/// # Errors
///
/// Returns error if the filter string is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("Invalid log level: {e}")))
}
