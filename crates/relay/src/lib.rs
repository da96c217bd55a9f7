//! # Relay
//!
//! **Dependency-ordered async middleware chains**
//!
//! Relay registers named middleware with priorities, dependencies and
//! conditions, validates the resulting graph, and runs it against a request
//! context:
//!
//! - **Deterministic ordering** – priority first, dependencies always before dependents
//! - **Failure policy** – per-attempt timeouts, bounded retries, halt or continue
//! - **Parallel groups** – blocking or fire-and-forget groups of concurrent middleware
//! - **Cancellation** – cooperative abort checked between units
//! - **Observability** – structured `tracing` logs and Prometheus metrics
//!
//! ## Quick Start
//!
//! ```
//! use http::Method;
//! use relay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ChainError> {
//!     let config = RelayConfig::default();
//!     let chain = config.chain.build_chain();
//!
//!     chain.register(
//!         MiddlewareDescriptor::new("request-log", FnMiddleware::new(|ctx| {
//!             Box::pin(async move {
//!                 ctx.set_attribute("logged", "true");
//!                 Ok(())
//!             })
//!         }))
//!         .with_priority(100),
//!     )?;
//!
//!     let result = chain
//!         .execute(ExecutionContext::new(Method::GET, "/health"), None)
//!         .await?;
//!     assert_eq!(result.state(), ChainState::Completed);
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/relay/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use relay_core as core;

// Re-export the chain engine
pub use relay_middleware as middleware;

// Re-export configuration
pub use relay_config as config;

// Re-export telemetry
pub use relay_telemetry as telemetry;

use relay_telemetry::{LogConfig, MetricsConfig, TelemetryResult};

/// Installs logging and the metrics exporter described by `config`.
///
/// Disabled sections are skipped. With metrics enabled this must be called
/// from within a Tokio runtime, which hosts the scrape endpoint.
///
/// # Errors
///
/// Returns the telemetry error if a subscriber or recorder is already
/// installed, the log filter is invalid, the metrics address cannot be
/// bound, or metrics are enabled outside a Tokio runtime.
pub fn init_telemetry(config: &relay_config::RelayConfig) -> TelemetryResult<()> {
    relay_telemetry::init_logging(&LogConfig::from(&config.logging))?;
    relay_telemetry::init_metrics(&MetricsConfig::from(&config.metrics))
}

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use relay::prelude::*;
///
/// let chain = MiddlewareChain::new();
/// assert!(chain.validate().valid);
/// ```
pub mod prelude {
    pub use relay_core::{
        AbortSignal, BuildResult, ChainError, ChainState, ExecutionContext, ExecutionId,
        MiddlewareError, RequestId, SecurityContext,
    };

    pub use relay_middleware::{
        BoxFuture, ChainResult, Condition, ConditionOperator, ExecutionOptions, ExecutionResult,
        FnMiddleware, Middleware, MiddlewareChain, MiddlewareDescriptor, ParallelGroup,
        PolicyDecision, PolicyEnforcementPoint, PolicyEnforcer, PolicyMiddleware, Recovery,
    };

    pub use relay_config::{ConfigLoader, RelayConfig};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_telemetry_with_everything_disabled() {
        let mut config = relay_config::RelayConfig::default();
        config.logging.enabled = false;
        config.metrics.enabled = false;
        assert!(init_telemetry(&config).is_ok());
    }
}
