//! The middleware chain facade.
//!
//! [`MiddlewareChain`] owns the registry and ties registration,
//! validation, ordering and execution together. Each execution runs against
//! a snapshot of the registry taken when it starts, so concurrent
//! registrations never affect an in-flight chain.

use crate::descriptor::MiddlewareDescriptor;
use crate::executor::ChainExecutor;
use crate::options::ExecutionOptions;
use crate::order::execution_order;
use crate::registry::MiddlewareRegistry;
use crate::result::ChainResult;
use crate::validator::{ChainValidator, ValidationReport, ValidatorConfig};
use dashmap::DashMap;
use parking_lot::RwLock;
use relay_core::{AbortSignal, BuildResult, ExecutionContext, ExecutionId};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Summary of one registered middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiddlewareSummary {
    /// Name.
    pub name: String,
    /// Priority.
    pub priority: i32,
    /// Whether it is enabled.
    pub enabled: bool,
    /// Declared dependencies.
    pub dependencies: Vec<String>,
    /// Number of declarative conditions.
    pub conditions: usize,
    /// Timeout override in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Snapshot of a chain's registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainInfo {
    /// Number of registered middleware.
    pub total_middleware: usize,
    /// Number of enabled middleware.
    pub enabled_middleware: usize,
    /// Registered names in registration order.
    pub names: Vec<String>,
    /// Current sequential execution order.
    pub execution_order: Vec<String>,
    /// Per-middleware summaries in registration order.
    pub middleware: Vec<MiddlewareSummary>,
}

/// A registry of middleware plus the machinery to run it.
///
/// # Example
///
/// ```
/// use http::Method;
/// use relay_core::ExecutionContext;
/// use relay_middleware::{FnMiddleware, MiddlewareChain, MiddlewareDescriptor};
///
/// # tokio_test::block_on(async {
/// let chain = MiddlewareChain::new();
/// chain.register(MiddlewareDescriptor::new(
///     "stamp",
///     FnMiddleware::new(|ctx| {
///         Box::pin(async move {
///             ctx.set_attribute("stamped", "yes");
///             Ok(())
///         })
///     }),
/// ))?;
///
/// let result = chain
///     .execute(ExecutionContext::new(Method::GET, "/"), None)
///     .await?;
/// assert!(result.success);
/// # Ok::<(), relay_core::ChainError>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct MiddlewareChain {
    registry: RwLock<MiddlewareRegistry>,
    validator: ChainValidator,
    defaults: ExecutionOptions,
    in_flight: DashMap<ExecutionId, AbortSignal>,
}

impl MiddlewareChain {
    /// Creates an empty chain with default limits and options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the validator limits.
    #[must_use]
    pub fn with_validator_config(mut self, config: ValidatorConfig) -> Self {
        self.validator = ChainValidator::new(config);
        self
    }

    /// Sets the options used when `execute` is given none.
    #[must_use]
    pub fn with_default_options(mut self, options: ExecutionOptions) -> Self {
        self.defaults = options;
        self
    }

    /// Returns the default execution options.
    pub fn default_options(&self) -> &ExecutionOptions {
        &self.defaults
    }

    /// Registers a middleware. See [`MiddlewareRegistry::register`].
    pub fn register(&self, descriptor: MiddlewareDescriptor) -> BuildResult<()> {
        self.registry.write().register(descriptor)
    }

    /// Unregisters a middleware. See [`MiddlewareRegistry::unregister`].
    pub fn unregister(&self, name: &str) -> BuildResult<()> {
        self.registry.write().unregister(name).map(drop)
    }

    /// Enables or disables a middleware. See [`MiddlewareRegistry::set_enabled`].
    pub fn set_enabled(&self, name: &str, enabled: bool) -> BuildResult<()> {
        self.registry.write().set_enabled(name, enabled)
    }

    /// Returns a descriptor by name.
    pub fn get(&self, name: &str) -> Option<Arc<MiddlewareDescriptor>> {
        self.registry.read().get(name).cloned()
    }

    /// Returns a copy of the registry.
    pub fn snapshot(&self) -> MiddlewareRegistry {
        self.registry.read().clone()
    }

    /// Validates the current registrations.
    pub fn validate(&self) -> ValidationReport {
        self.validator.validate(&self.registry.read())
    }

    /// Returns the current sequential execution order.
    pub fn execution_order(&self) -> Vec<String> {
        execution_order(&self.registry.read())
    }

    /// Describes the current registrations.
    pub fn info(&self) -> ChainInfo {
        let registry = self.registry.read();
        let middleware: Vec<MiddlewareSummary> = registry
            .iter()
            .map(|d| MiddlewareSummary {
                name: d.name().to_string(),
                priority: d.priority(),
                enabled: d.is_enabled(),
                dependencies: d.dependencies().to_vec(),
                conditions: d.conditions().len(),
                timeout_ms: d.timeout().map(|t| t.as_millis() as u64),
            })
            .collect();

        ChainInfo {
            total_middleware: registry.len(),
            enabled_middleware: middleware.iter().filter(|m| m.enabled).count(),
            names: registry.names(),
            execution_order: execution_order(&registry),
            middleware,
        }
    }

    /// Runs the chain against a context.
    ///
    /// `options` falls back to the chain's defaults. While the execution is
    /// in flight it can be cancelled with [`cancel`](Self::cancel).
    ///
    /// # Errors
    ///
    /// Only build-time problems are returned as errors; see
    /// [`ChainExecutor::execute`].
    pub async fn execute(
        &self,
        ctx: impl Into<Arc<ExecutionContext>>,
        options: Option<ExecutionOptions>,
    ) -> BuildResult<ChainResult> {
        let ctx = ctx.into();
        let executor = ChainExecutor::new(
            self.snapshot(),
            options.unwrap_or_else(|| self.defaults.clone()),
        );

        let _guard = InFlightGuard::register(&self.in_flight, &ctx);
        executor.execute(ctx).await
    }

    /// Requests cancellation of an in-flight execution.
    ///
    /// Returns false if no execution with that ID is running.
    pub fn cancel(&self, execution_id: ExecutionId) -> bool {
        match self.in_flight.get(&execution_id) {
            Some(signal) => {
                signal.abort();
                info!(execution_id = %execution_id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Returns the IDs of executions currently in flight.
    pub fn in_flight(&self) -> Vec<ExecutionId> {
        self.in_flight.iter().map(|entry| *entry.key()).collect()
    }
}

/// Removes an execution from the in-flight map when dropped.
struct InFlightGuard<'a> {
    map: &'a DashMap<ExecutionId, AbortSignal>,
    id: ExecutionId,
}

impl<'a> InFlightGuard<'a> {
    fn register(map: &'a DashMap<ExecutionId, AbortSignal>, ctx: &ExecutionContext) -> Self {
        let id = ctx.execution_id();
        map.insert(id, ctx.abort_signal());
        Self { map, id }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnMiddleware;
    use http::Method;
    use relay_core::{ChainError, ChainState};
    use std::time::Duration;

    fn noop(name: &str) -> MiddlewareDescriptor {
        MiddlewareDescriptor::new(name, FnMiddleware::new(|_ctx| Box::pin(async { Ok(()) })))
    }

    #[test]
    fn test_info() {
        let chain = MiddlewareChain::new();
        chain.register(noop("auth").with_priority(100)).unwrap();
        chain
            .register(
                noop("session")
                    .with_dependency("auth")
                    .with_timeout(Duration::from_millis(250)),
            )
            .unwrap();
        chain.register(noop("cache").with_priority(50)).unwrap();
        chain.set_enabled("cache", false).unwrap();

        let info = chain.info();
        assert_eq!(info.total_middleware, 3);
        assert_eq!(info.enabled_middleware, 2);
        assert_eq!(info.names, vec!["auth", "session", "cache"]);
        assert_eq!(info.execution_order, vec!["auth", "cache", "session"]);
        assert_eq!(info.middleware[1].timeout_ms, Some(250));
        assert_eq!(info.middleware[1].dependencies, vec!["auth"]);
    }

    #[test]
    fn test_order_recomputed_after_mutation() {
        let chain = MiddlewareChain::new();
        chain.register(noop("a").with_priority(1)).unwrap();
        chain.register(noop("b").with_priority(2)).unwrap();
        assert_eq!(chain.execution_order(), vec!["b", "a"]);

        chain.register(noop("c").with_priority(3)).unwrap();
        assert_eq!(chain.execution_order(), vec!["c", "b", "a"]);

        chain.unregister("b").unwrap();
        assert_eq!(chain.execution_order(), vec!["c", "a"]);
    }

    #[test]
    fn test_validate_uses_configured_limit() {
        let chain = MiddlewareChain::new()
            .with_validator_config(ValidatorConfig { max_chain_size: 1 });
        chain.register(noop("a")).unwrap();
        assert!(chain.validate().valid);

        chain.register(noop("b").with_priority(1)).unwrap();
        assert_eq!(
            chain.validate().errors,
            vec![ChainError::size_exceeded(2, 1)]
        );
    }

    #[test]
    fn test_cancel_unknown_execution() {
        let chain = MiddlewareChain::new();
        assert!(!chain.cancel(ExecutionId::new()));
        assert!(chain.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_cleared_after_execution() {
        let chain = MiddlewareChain::new();
        chain.register(noop("a")).unwrap();

        let result = chain
            .execute(ExecutionContext::new(Method::GET, "/"), None)
            .await
            .unwrap();

        assert_eq!(result.state(), ChainState::Completed);
        assert!(chain.in_flight().is_empty());
        assert!(!chain.cancel(result.execution_id));
    }

    #[tokio::test]
    async fn test_default_options_apply() {
        let chain = MiddlewareChain::new()
            .with_default_options(ExecutionOptions::default().with_continue_on_error(true));
        chain
            .register(MiddlewareDescriptor::new(
                "fails",
                FnMiddleware::new(|_ctx| {
                    Box::pin(async { Err(relay_core::MiddlewareError::execution("nope")) })
                }),
            ))
            .unwrap();
        chain.register(noop("after")).unwrap();

        let options = chain.default_options().clone().with_retries(false);
        let result = chain
            .execute(ExecutionContext::new(Method::GET, "/"), Some(options))
            .await
            .unwrap();

        assert_eq!(result.state(), ChainState::Completed);
        assert!(!result.success);
        assert_eq!(result.results.len(), 2);
    }
}
