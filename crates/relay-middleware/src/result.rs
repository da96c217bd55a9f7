//! Execution results and performance summaries.
//!
//! Every dispatched middleware produces one [`ExecutionResult`]; the chain
//! folds them into a [`ChainResult`] with a [`PerformanceSummary`]:
//!
//! | Field | Definition |
//! |---|---|
//! | `average_execution_time` | mean duration of non-skipped results |
//! | `slowest_middleware` / `fastest_middleware` | extremes among non-skipped results |
//! | `bottlenecks` | non-skipped results slower than twice the average |
//!
//! Durations serialize as fractional milliseconds.

use chrono::{DateTime, Utc};
use relay_core::{ChainState, ExecutionId, MiddlewareError, RequestId};
use serde::{Serialize, Serializer};
use std::time::Duration;

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
}

/// Outcome of one middleware.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Middleware name.
    pub name: String,
    /// True if an attempt succeeded.
    pub success: bool,
    /// Wall time from first attempt to final outcome, retry delays included.
    #[serde(serialize_with = "as_millis", rename = "duration_ms")]
    pub duration: Duration,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
    /// When the final outcome was known.
    pub ended_at: DateTime<Utc>,
    /// True if the middleware was not run.
    pub skipped: bool,
    /// Final error of a failed middleware.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MiddlewareError>,
    /// Attempts beyond the first.
    pub retry_count: u32,
}

impl ExecutionResult {
    /// A successful result.
    pub fn succeeded(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
        retry_count: u32,
    ) -> Self {
        Self {
            name: name.into(),
            success: true,
            duration,
            started_at,
            ended_at: ended_at(started_at, duration),
            skipped: false,
            error: None,
            retry_count,
        }
    }

    /// A failed result.
    pub fn failed(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
        error: MiddlewareError,
        retry_count: u32,
    ) -> Self {
        Self {
            name: name.into(),
            success: false,
            duration,
            started_at,
            ended_at: ended_at(started_at, duration),
            skipped: false,
            error: Some(error),
            retry_count,
        }
    }

    /// A skipped result. Skipped middleware count as successful.
    pub fn skipped(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            success: true,
            duration: Duration::ZERO,
            started_at: now,
            ended_at: now,
            skipped: true,
            error: None,
            retry_count: 0,
        }
    }

    /// True for a middleware that ran and failed.
    pub fn is_failure(&self) -> bool {
        !self.success && !self.skipped
    }
}

fn ended_at(started_at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration).map_or(started_at, |d| started_at + d)
}

/// Aggregate timing over a chain's results.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PerformanceSummary {
    /// Number of results.
    pub total_middleware: usize,
    /// Results that ran.
    pub executed_middleware: usize,
    /// Results that were skipped.
    pub skipped_middleware: usize,
    /// Results that ran and failed.
    pub failed_middleware: usize,
    /// Mean duration of results that ran.
    #[serde(serialize_with = "as_millis", rename = "average_execution_time_ms")]
    pub average_execution_time: Duration,
    /// Slowest result that ran. The earliest wins a tie.
    pub slowest_middleware: Option<String>,
    /// Fastest result that ran. The earliest wins a tie.
    pub fastest_middleware: Option<String>,
    /// Results slower than twice the average.
    pub bottlenecks: Vec<String>,
}

impl PerformanceSummary {
    /// Computes the summary for a result list.
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        let ran: Vec<&ExecutionResult> = results.iter().filter(|r| !r.skipped).collect();

        let average_execution_time = u32::try_from(ran.len())
            .ok()
            .filter(|&n| n > 0)
            .map_or(Duration::ZERO, |n| {
                ran.iter().map(|r| r.duration).sum::<Duration>() / n
            });

        let slowest = ran
            .iter()
            .copied()
            .reduce(|a, b| if b.duration > a.duration { b } else { a });
        let fastest = ran
            .iter()
            .copied()
            .reduce(|a, b| if b.duration < a.duration { b } else { a });

        let threshold = average_execution_time * 2;
        let bottlenecks = ran
            .iter()
            .filter(|r| r.duration > threshold)
            .map(|r| r.name.clone())
            .collect();

        Self {
            total_middleware: results.len(),
            executed_middleware: ran.len(),
            skipped_middleware: results.len() - ran.len(),
            failed_middleware: ran.iter().filter(|r| !r.success).count(),
            average_execution_time,
            slowest_middleware: slowest.map(|r| r.name.clone()),
            fastest_middleware: fastest.map(|r| r.name.clone()),
            bottlenecks,
        }
    }
}

/// Chain-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainMetadata {
    /// Final chain state.
    pub state: ChainState,
    /// Planned middleware that were never dispatched.
    pub not_run: Vec<String>,
    /// Set when a middleware's error hook halted the chain.
    pub terminated: bool,
    /// Chain-level error. [`MiddlewareError::Aborted`] once the abort signal
    /// stopped dispatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MiddlewareError>,
}

/// Outcome of a chain execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainResult {
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Request identifier.
    pub request_id: RequestId,
    /// True iff every result succeeded or was skipped.
    pub success: bool,
    /// Wall time of the whole execution.
    #[serde(serialize_with = "as_millis", rename = "total_duration_ms")]
    pub total_duration: Duration,
    /// Per-middleware results in completion order.
    pub results: Vec<ExecutionResult>,
    /// Timing summary.
    pub performance: PerformanceSummary,
    /// State and bookkeeping.
    pub metadata: ChainMetadata,
}

impl ChainResult {
    /// Assembles a chain result.
    pub fn new(
        execution_id: ExecutionId,
        request_id: RequestId,
        total_duration: Duration,
        results: Vec<ExecutionResult>,
        metadata: ChainMetadata,
    ) -> Self {
        Self {
            execution_id,
            request_id,
            success: results.iter().all(|r| r.success || r.skipped),
            total_duration,
            performance: PerformanceSummary::from_results(&results),
            results,
            metadata,
        }
    }

    /// Returns the final chain state.
    pub fn state(&self) -> ChainState {
        self.metadata.state
    }

    /// Looks up the result of a middleware.
    pub fn result(&self, name: &str) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Returns the first failure, if any.
    pub fn first_error(&self) -> Option<&MiddlewareError> {
        self.results.iter().find_map(|r| r.error.as_ref())
    }

    /// Suggested HTTP status for a caller translating the result.
    ///
    /// `200` when completed, `499` when cancelled, `403` when a policy
    /// denied the request, `504` when the failing middleware timed out and
    /// `500` for any other failure.
    pub fn status_hint(&self) -> u16 {
        if self.metadata.error == Some(MiddlewareError::Aborted) {
            return 499;
        }

        match self.metadata.state {
            ChainState::Completed if self.success => 200,
            ChainState::Cancelled => 499,
            _ => match self.first_error() {
                Some(MiddlewareError::PolicyDenied { .. }) => 403,
                Some(MiddlewareError::Timeout(_)) => 504,
                _ => 500,
            },
        }
    }
}
