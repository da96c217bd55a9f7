//! Prometheus metrics for Relay.
//!
//! The recording helpers below are called by the chain executor. They go
//! through the `metrics` facade, so they are no-ops until [`init_metrics`]
//! installs the Prometheus recorder and starts its scrape endpoint.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names.
pub mod names {
    /// Chain invocations by final state.
    pub const CHAIN_EXECUTIONS: &str = "relay_chain_executions_total";
    /// Chain latency.
    pub const CHAIN_DURATION: &str = "relay_chain_duration_seconds";
    /// Middleware executions by outcome.
    pub const MIDDLEWARE_EXECUTIONS: &str = "relay_middleware_executions_total";
    /// Middleware latency.
    pub const MIDDLEWARE_DURATION: &str = "relay_middleware_duration_seconds";
    /// Middleware retry attempts.
    pub const MIDDLEWARE_RETRIES: &str = "relay_middleware_retries_total";
    /// Policy decisions.
    pub const POLICY_DECISIONS: &str = "relay_policy_decisions_total";
}

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address to expose metrics on (e.g., "0.0.0.0:9090").
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Initializes the metrics subsystem.
///
/// Installs the global Prometheus recorder and spawns its HTTP scrape
/// endpoint on `config.addr` onto the current Tokio runtime. The listener is
/// bound before this returns.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable address and
/// `TelemetryError::MetricsInit` when called outside a Tokio runtime, when
/// the address cannot be bound or when a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let runtime = Handle::try_current().map_err(|_| {
        TelemetryError::MetricsInit("the metrics exporter requires a Tokio runtime".to_string())
    })?;
    let _entered = runtime.enter();

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let handle = recorder.handle();

    metrics::set_global_recorder(recorder)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    if METRICS_HANDLE.set(handle).is_err() {
        warn!("metrics handle already stored; render_metrics keeps the first one");
    }

    runtime.spawn(async move {
        if let Err(e) = exporter.await {
            warn!(error = ?e, "metrics exporter stopped");
        }
    });

    register_metric_descriptions();
    info!(addr = %addr, "metrics exporter listening");

    Ok(())
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(names::CHAIN_EXECUTIONS, "Chain invocations by final state");
    describe_histogram!(names::CHAIN_DURATION, "Chain execution duration in seconds");
    describe_counter!(
        names::MIDDLEWARE_EXECUTIONS,
        "Middleware executions by outcome (success, failure, skipped)"
    );
    describe_histogram!(
        names::MIDDLEWARE_DURATION,
        "Middleware execution duration in seconds"
    );
    describe_counter!(names::MIDDLEWARE_RETRIES, "Middleware retry attempts");
    describe_counter!(names::POLICY_DECISIONS, "Policy decisions by result");
}

/// Outcome label for a single middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The middleware succeeded.
    Success,
    /// The middleware failed after exhausting its attempts.
    Failure,
    /// The middleware was skipped.
    Skipped,
}

impl Outcome {
    /// Returns the label value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        }
    }
}

/// Records a finished chain invocation.
pub fn record_chain(state: &str, duration: Duration) {
    counter!(names::CHAIN_EXECUTIONS, "state" => state.to_string()).increment(1);
    histogram!(names::CHAIN_DURATION, "state" => state.to_string())
        .record(duration.as_secs_f64());
}

/// Records a finished middleware.
///
/// Skipped middleware do not contribute a duration observation.
pub fn record_middleware(middleware: &str, outcome: Outcome, duration: Duration) {
    counter!(
        names::MIDDLEWARE_EXECUTIONS,
        "middleware" => middleware.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    if outcome != Outcome::Skipped {
        histogram!(names::MIDDLEWARE_DURATION, "middleware" => middleware.to_string())
            .record(duration.as_secs_f64());
    }
}

/// Records a retry attempt.
pub fn record_retry(middleware: &str) {
    counter!(names::MIDDLEWARE_RETRIES, "middleware" => middleware.to_string()).increment(1);
}

/// Records a policy decision.
pub fn record_policy_decision(policy: &str, allowed: bool) {
    counter!(
        names::POLICY_DECISIONS,
        "policy" => policy.to_string(),
        "allowed" => allowed.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.addr, "0.0.0.0:9090");
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not-an-address".to_string(),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_disabled_metrics() {
        let config = MetricsConfig {
            enabled: false,
            addr: String::new(),
        };
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_requires_runtime() {
        let config = MetricsConfig {
            enabled: true,
            addr: "127.0.0.1:0".to_string(),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::MetricsInit(_))
        ));
    }

    // The only test in this binary that installs the global recorder.
    #[tokio::test]
    async fn test_exporter_serves_scrapes() {
        let port = {
            let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            free.local_addr().unwrap().port()
        };
        let config = MetricsConfig {
            enabled: true,
            addr: format!("127.0.0.1:{port}"),
        };
        init_metrics(&config).unwrap();

        record_chain("completed", Duration::from_millis(4));
        assert!(render_metrics()
            .unwrap()
            .contains(names::CHAIN_EXECUTIONS));

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(names::CHAIN_EXECUTIONS));

        let again = init_metrics(&config);
        assert!(matches!(again, Err(TelemetryError::MetricsInit(_))));
    }

    #[test]
    fn test_record_functions_dont_panic() {
        record_chain("completed", Duration::from_millis(12));
        record_middleware("auth", Outcome::Success, Duration::from_millis(3));
        record_middleware("cache", Outcome::Skipped, Duration::ZERO);
        record_retry("upstream");
        record_policy_decision("admin-only", false);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Success.as_str(), "success");
        assert_eq!(Outcome::Failure.as_str(), "failure");
        assert_eq!(Outcome::Skipped.as_str(), "skipped");
    }
}
