//! Observability for Relay.
//!
//! This crate wires the two ambient concerns every Relay deployment needs:
//!
//! - **Logging**: structured JSON (or pretty) logs through `tracing-subscriber`
//! - **Metrics**: Prometheus-format metrics via the `metrics` crate
//!
//! The chain engine records metrics through the helpers in [`metrics`]
//! unconditionally; until [`init_metrics`] installs a recorder those calls
//! are no-ops.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `relay_chain_executions_total` | Counter | `state` | Chain invocations by final state |
//! | `relay_chain_duration_seconds` | Histogram | `state` | Chain latency |
//! | `relay_middleware_executions_total` | Counter | `middleware`, `outcome` | Units by outcome |
//! | `relay_middleware_duration_seconds` | Histogram | `middleware` | Unit latency |
//! | `relay_middleware_retries_total` | Counter | `middleware` | Retry attempts |
//! | `relay_policy_decisions_total` | Counter | `policy`, `allowed` | Policy decisions |
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_telemetry::{init_logging, init_metrics, LogConfig, MetricsConfig};
//!
//! init_logging(&LogConfig::production())?;
//! // Inside a Tokio runtime; serves /metrics on 0.0.0.0:9090.
//! init_metrics(&MetricsConfig::default())?;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use crate::error::TelemetryError;
pub use crate::logging::{init_logging, LogConfig};
pub use crate::metrics::{init_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
