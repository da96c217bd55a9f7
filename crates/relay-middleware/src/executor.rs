//! Chain execution.
//!
//! The executor runs a registry snapshot against one [`ExecutionContext`],
//! either sequentially in dependency order or as a series of parallel
//! groups.
//!
//! ## Per-middleware lifecycle
//!
//! ```text
//! disabled? ── should_execute? ── conditions? ──▶ skipped
//!      │
//!      ▼
//! attempt ──timeout/error──▶ on_error ──Halt──▶ failed, chain halted
//!    │                          │
//!    ok                   Continue + retryable + attempts left
//!    ▼                          ▼
//! succeeded                sleep(retry_delay), attempt again
//! ```
//!
//! A failure stops the chain unless `continue_on_error` is set. The abort
//! signal is checked before each sequential step and before each parallel
//! group; a running middleware is never interrupted.

use crate::condition;
use crate::descriptor::MiddlewareDescriptor;
use crate::middleware::Recovery;
use crate::options::{ExecutionOptions, ParallelGroup};
use crate::order::execution_order;
use crate::registry::MiddlewareRegistry;
use crate::result::{ChainMetadata, ChainResult, ExecutionResult};
use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use relay_core::{BuildResult, ChainError, ChainState, ExecutionContext, MiddlewareError};
use relay_telemetry::metrics::{record_chain, record_middleware, record_retry, Outcome};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn, Instrument};

/// Runs a registry snapshot with fixed options.
#[derive(Debug, Clone)]
pub struct ChainExecutor {
    registry: MiddlewareRegistry,
    options: ExecutionOptions,
}

#[derive(Debug, Clone, Copy)]
struct AttemptPolicy {
    attempts: u32,
    retry_delay: Duration,
    timeout: Duration,
}

struct UnitOutcome {
    result: ExecutionResult,
    halted: bool,
}

impl UnitOutcome {
    fn stops_chain(&self, continue_on_error: bool) -> bool {
        self.halted || (self.result.is_failure() && !continue_on_error)
    }
}

struct Run {
    results: Vec<ExecutionResult>,
    not_run: Vec<String>,
    state: ChainState,
    error: Option<MiddlewareError>,
}

impl Run {
    fn finished(results: Vec<ExecutionResult>, not_run: Vec<String>, state: ChainState) -> Self {
        Self {
            results,
            not_run,
            state,
            error: None,
        }
    }

    fn cancelled(results: Vec<ExecutionResult>, not_run: Vec<String>) -> Self {
        Self {
            results,
            not_run,
            state: ChainState::Cancelled,
            error: Some(MiddlewareError::Aborted),
        }
    }
}

type UnitHandle = (String, JoinHandle<UnitOutcome>);

impl ChainExecutor {
    /// Creates an executor over a registry snapshot.
    pub fn new(registry: MiddlewareRegistry, options: ExecutionOptions) -> Self {
        Self { registry, options }
    }

    /// Returns the options.
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Checks that the parallel plan is non-empty and every group member is
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NoParallelGroups`] when no group is configured
    /// and [`ChainError::UnknownGroupMember`] for the first unknown member.
    pub fn check_groups(&self) -> BuildResult<()> {
        if self.options.parallel_groups.is_empty() {
            return Err(ChainError::NoParallelGroups);
        }

        for group in &self.options.parallel_groups {
            if let Some(missing) = group
                .middleware
                .iter()
                .find(|name| !self.registry.contains(name))
            {
                return Err(ChainError::unknown_group_member(&group.name, missing));
            }
        }
        Ok(())
    }

    /// Runs the chain.
    ///
    /// Runtime failures are reported in the returned [`ChainResult`].
    ///
    /// # Errors
    ///
    /// In parallel mode, returns [`ChainError::NoParallelGroups`] when no
    /// group is configured and [`ChainError::UnknownGroupMember`] when a
    /// group names an unregistered middleware. Nothing runs in either case.
    #[instrument(
        name = "chain",
        skip_all,
        fields(
            execution_id = %ctx.execution_id(),
            request_id = %ctx.request_id(),
            parallel = self.options.parallel_execution,
        )
    )]
    pub async fn execute(&self, ctx: Arc<ExecutionContext>) -> BuildResult<ChainResult> {
        if self.options.parallel_execution {
            self.check_groups()?;
        }

        let start = Instant::now();
        ctx.set_state(ChainState::Running);
        debug!(middleware_count = self.registry.len(), "chain started");

        let run = if self.options.parallel_execution {
            self.run_parallel(&ctx).await
        } else {
            self.run_sequential(&ctx).await
        };

        ctx.set_state(run.state);
        let total_duration = start.elapsed();
        record_chain(&run.state.to_string(), total_duration);

        let result = ChainResult::new(
            ctx.execution_id(),
            ctx.request_id(),
            total_duration,
            run.results,
            ChainMetadata {
                state: run.state,
                not_run: run.not_run,
                terminated: ctx.is_terminated(),
                error: run.error,
            },
        );

        info!(
            state = %run.state,
            duration_ms = total_duration.as_millis() as u64,
            executed = result.performance.executed_middleware,
            skipped = result.performance.skipped_middleware,
            failed = result.performance.failed_middleware,
            "chain finished"
        );

        Ok(result)
    }

    fn attempt_policy(&self) -> AttemptPolicy {
        AttemptPolicy {
            attempts: self.options.attempts(),
            retry_delay: self.options.retry_delay,
            timeout: self.options.timeout,
        }
    }

    async fn run_sequential(&self, ctx: &ExecutionContext) -> Run {
        let order = execution_order(&self.registry);
        let policy = self.attempt_policy();
        let mut results = Vec::with_capacity(order.len());

        for (index, name) in order.iter().enumerate() {
            if ctx.is_aborted() {
                info!(next = %name, "abort signal observed; cancelling chain");
                return Run::cancelled(results, order[index..].to_vec());
            }

            let Some(descriptor) = self.registry.get(name) else {
                continue;
            };

            let outcome = run_unit(descriptor, ctx, policy).await;
            let stop = outcome.stops_chain(self.options.continue_on_error);
            results.push(outcome.result);

            if stop {
                return Run::finished(results, order[index + 1..].to_vec(), ChainState::Failed);
            }
        }

        Run::finished(results, Vec::new(), ChainState::Completed)
    }

    async fn run_parallel(&self, ctx: &Arc<ExecutionContext>) -> Run {
        let policy = self.attempt_policy();
        let groups = &self.options.parallel_groups;
        let mut results = Vec::new();
        let mut detached: Vec<UnitHandle> = Vec::new();
        let mut stopped: Option<(ChainState, Vec<String>)> = None;

        for (index, group) in groups.iter().enumerate() {
            if ctx.is_aborted() {
                info!(next_group = %group.name, "abort signal observed; cancelling chain");
                stopped = Some((ChainState::Cancelled, members(&groups[index..])));
                break;
            }

            let handles = self.spawn_group(group, ctx, policy);

            if !group.wait_for_all {
                debug!(group = %group.name, members = handles.len(), "detached group dispatched");
                detached.extend(handles);
                continue;
            }

            let mut stop = false;
            for outcome in join_units(handles, ctx).await {
                stop |= outcome.stops_chain(self.options.continue_on_error);
                results.push(outcome.result);
            }

            if stop {
                stopped = Some((ChainState::Failed, members(&groups[index + 1..])));
                break;
            }
        }

        let mut detached_failed = false;
        for outcome in join_units(detached, ctx).await {
            detached_failed |= outcome.stops_chain(self.options.continue_on_error);
            results.push(outcome.result);
        }

        match stopped {
            Some((ChainState::Cancelled, not_run)) => Run::cancelled(results, not_run),
            Some((state, not_run)) => Run::finished(results, not_run, state),
            None if detached_failed => Run::finished(results, Vec::new(), ChainState::Failed),
            None => Run::finished(results, Vec::new(), ChainState::Completed),
        }
    }

    fn spawn_group(
        &self,
        group: &ParallelGroup,
        ctx: &Arc<ExecutionContext>,
        policy: AttemptPolicy,
    ) -> Vec<UnitHandle> {
        group
            .middleware
            .iter()
            .filter_map(|name| {
                let descriptor = Arc::clone(self.registry.get(name)?);
                let ctx = Arc::clone(ctx);
                let span = tracing::debug_span!("group", group = %group.name);
                let handle = tokio::spawn(
                    async move { run_unit(&descriptor, &ctx, policy).await }.instrument(span),
                );
                Some((name.clone(), handle))
            })
            .collect()
    }
}

fn members(groups: &[ParallelGroup]) -> Vec<String> {
    groups
        .iter()
        .flat_map(|group| group.middleware.iter().cloned())
        .collect()
}

/// Awaits spawned units, yielding outcomes in completion order.
async fn join_units(handles: Vec<UnitHandle>, ctx: &ExecutionContext) -> Vec<UnitOutcome> {
    let mut pending: FuturesUnordered<_> = handles
        .into_iter()
        .map(|(name, handle)| async move { (name, handle.await) })
        .collect();

    let mut outcomes = Vec::new();
    while let Some((name, joined)) = pending.next().await {
        outcomes.push(match joined {
            Ok(outcome) => outcome,
            Err(e) => join_failure(&name, &e, ctx),
        });
    }
    outcomes
}

fn join_failure(name: &str, error: &JoinError, ctx: &ExecutionContext) -> UnitOutcome {
    let reason = if error.is_panic() {
        "task panicked"
    } else {
        "task cancelled"
    };
    warn!(middleware = name, reason, "parallel middleware did not complete");

    ctx.record_failed(name, Duration::ZERO);
    record_middleware(name, Outcome::Failure, Duration::ZERO);

    UnitOutcome {
        result: ExecutionResult::failed(
            name,
            Utc::now(),
            Duration::ZERO,
            MiddlewareError::panicked(reason),
            0,
        ),
        halted: false,
    }
}

fn skip_reason(descriptor: &MiddlewareDescriptor, ctx: &ExecutionContext) -> Option<&'static str> {
    if !descriptor.is_enabled() {
        Some("disabled")
    } else if !descriptor.middleware().should_execute(ctx) {
        Some("should_execute declined")
    } else if !condition::evaluate(descriptor.conditions(), ctx) {
        Some("conditions not met")
    } else {
        None
    }
}

/// Runs one middleware with skip checks, timeout and retries.
async fn run_unit(
    descriptor: &MiddlewareDescriptor,
    ctx: &ExecutionContext,
    policy: AttemptPolicy,
) -> UnitOutcome {
    let name = descriptor.name();
    ctx.begin_middleware(name);

    if let Some(reason) = skip_reason(descriptor, ctx) {
        debug!(middleware = name, reason, "middleware skipped");
        record_middleware(name, Outcome::Skipped, Duration::ZERO);
        return UnitOutcome {
            result: ExecutionResult::skipped(name),
            halted: false,
        };
    }

    let timeout = descriptor.timeout().unwrap_or(policy.timeout);
    let started_at = Utc::now();
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let error = match attempt_once(descriptor, ctx, timeout).await {
            Ok(()) => {
                let duration = start.elapsed();
                ctx.record_executed(name, duration);
                record_middleware(name, Outcome::Success, duration);
                debug!(
                    middleware = name,
                    attempt,
                    duration_ms = duration.as_millis() as u64,
                    "middleware completed"
                );
                return UnitOutcome {
                    result: ExecutionResult::succeeded(name, started_at, duration, attempt - 1),
                    halted: false,
                };
            }
            Err(error) => error,
        };

        let halted = descriptor.middleware().on_error(&error, ctx) == Recovery::Halt;

        if halted || attempt >= policy.attempts || !error.is_retryable() {
            let duration = start.elapsed();
            ctx.record_failed(name, duration);
            if halted {
                ctx.terminate();
            }
            record_middleware(name, Outcome::Failure, duration);
            warn!(
                middleware = name,
                attempt,
                duration_ms = duration.as_millis() as u64,
                error = %error,
                halted,
                "middleware failed"
            );
            return UnitOutcome {
                result: ExecutionResult::failed(name, started_at, duration, error, attempt - 1),
                halted,
            };
        }

        debug!(middleware = name, attempt, error = %error, "attempt failed; retrying");
        record_retry(name);
        tokio::time::sleep(policy.retry_delay).await;
    }
}

/// Makes one bounded attempt, converting panics and timeouts to errors.
async fn attempt_once(
    descriptor: &MiddlewareDescriptor,
    ctx: &ExecutionContext,
    timeout: Duration,
) -> Result<(), MiddlewareError> {
    let call = AssertUnwindSafe(async { descriptor.middleware().execute(ctx).await }).catch_unwind();

    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(payload)) => Err(MiddlewareError::panicked(panic_message(payload.as_ref()))),
        Err(_) => Err(MiddlewareError::timeout(timeout)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{BoxFuture, FnMiddleware, Middleware};
    use http::Method;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` attempts, then succeeds.
    struct Flaky {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    impl Middleware for Flaky {
        fn execute<'a>(
            &'a self,
            _ctx: &'a ExecutionContext,
        ) -> BoxFuture<'a, Result<(), MiddlewareError>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= self.failures {
                    Err(MiddlewareError::execution(format!("attempt {call} failed")))
                } else {
                    Ok(())
                }
            })
        }
    }

    struct Halting;

    impl Middleware for Halting {
        fn execute<'a>(
            &'a self,
            _ctx: &'a ExecutionContext,
        ) -> BoxFuture<'a, Result<(), MiddlewareError>> {
            Box::pin(async { Err(MiddlewareError::execution("fatal")) })
        }

        fn on_error(&self, _error: &MiddlewareError, _ctx: &ExecutionContext) -> Recovery {
            Recovery::Halt
        }
    }

    fn ok(name: &str) -> MiddlewareDescriptor {
        MiddlewareDescriptor::new(name, FnMiddleware::new(|_ctx| Box::pin(async { Ok(()) })))
    }

    fn flaky(name: &str, failures: u32) -> (MiddlewareDescriptor, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let descriptor = MiddlewareDescriptor::new(
            name,
            Flaky {
                failures,
                calls: Arc::clone(&calls),
            },
        );
        (descriptor, calls)
    }

    fn ctx() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(Method::GET, "/api/items"))
    }

    fn executor(descriptors: Vec<MiddlewareDescriptor>, options: ExecutionOptions) -> ChainExecutor {
        let mut registry = MiddlewareRegistry::new();
        for descriptor in descriptors {
            registry.register(descriptor).unwrap();
        }
        ChainExecutor::new(registry, options)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let (descriptor, calls) = flaky("upstream", 2);
        let result = executor(vec![descriptor], ExecutionOptions::default())
            .execute(ctx())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.state(), ChainState::Completed);
        assert_eq!(result.results[0].retry_count, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let (descriptor, calls) = flaky("upstream", 10);
        let result = executor(vec![descriptor], ExecutionOptions::default())
            .execute(ctx())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.state(), ChainState::Failed);
        assert_eq!(result.results[0].retry_count, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_disabled() {
        let (descriptor, calls) = flaky("upstream", 1);
        let result = executor(vec![descriptor], ExecutionOptions::default().with_retries(false))
            .execute(ctx())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.results[0].retry_count, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_descriptor_timeout_overrides_default() {
        let slow = MiddlewareDescriptor::new(
            "slow",
            FnMiddleware::new(|_ctx| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
            }),
        )
        .with_timeout(Duration::from_millis(50));

        let result = executor(vec![slow], ExecutionOptions::default().with_retries(false))
            .execute(ctx())
            .await
            .unwrap();

        assert_eq!(
            result.results[0].error,
            Some(MiddlewareError::timeout(Duration::from_millis(50)))
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let panicking = MiddlewareDescriptor::new(
            "panicky",
            FnMiddleware::new(|ctx| {
                Box::pin(async move {
                    if ctx.path().starts_with("/api") {
                        panic!("kaboom");
                    }
                    Ok(())
                })
            }),
        );

        let result = executor(vec![panicking], ExecutionOptions::default())
            .execute(ctx())
            .await
            .unwrap();

        assert_eq!(
            result.results[0].error,
            Some(MiddlewareError::panicked("kaboom"))
        );
        assert_eq!(result.results[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_halt_overrides_continue_on_error() {
        let ctx = ctx();
        let result = executor(
            vec![
                MiddlewareDescriptor::new("fatal", Halting).with_priority(10),
                ok("after"),
            ],
            ExecutionOptions::default().with_continue_on_error(true),
        )
        .execute(Arc::clone(&ctx))
        .await
        .unwrap();

        assert_eq!(result.state(), ChainState::Failed);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].retry_count, 0);
        assert_eq!(result.metadata.not_run, vec!["after"]);
        assert!(result.metadata.terminated);
        assert!(ctx.is_terminated());
    }

    #[tokio::test]
    async fn test_unknown_group_member_rejected() {
        let err = executor(
            vec![ok("a")],
            ExecutionOptions::default()
                .with_parallel_groups(vec![ParallelGroup::new("g", ["a", "ghost"])]),
        )
        .execute(ctx())
        .await
        .unwrap_err();

        assert_eq!(err, ChainError::unknown_group_member("g", "ghost"));
    }

    #[tokio::test]
    async fn test_parallel_mode_without_groups_rejected() {
        let options = ExecutionOptions {
            parallel_execution: true,
            ..ExecutionOptions::default()
        };
        let ctx = ctx();

        let err = executor(vec![ok("auth")], options)
            .execute(Arc::clone(&ctx))
            .await
            .unwrap_err();

        assert_eq!(err, ChainError::NoParallelGroups);
        assert_eq!(ctx.state(), ChainState::Pending);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
