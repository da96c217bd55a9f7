//! Middleware registration descriptors.

use crate::condition::Condition;
use crate::middleware::Middleware;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default priority for middleware that do not set one.
pub const DEFAULT_PRIORITY: i32 = 0;

/// A registered middleware together with its scheduling metadata.
///
/// Descriptors are immutable once registered. Toggling `enabled` replaces the
/// registry entry with a modified copy, so executions already holding the
/// old descriptor are unaffected.
///
/// # Example
///
/// ```
/// use relay_middleware::{Condition, FnMiddleware, MiddlewareDescriptor};
/// use std::time::Duration;
///
/// let session = MiddlewareDescriptor::new(
///     "session",
///     FnMiddleware::new(|_ctx| Box::pin(async { Ok(()) })),
/// )
/// .with_priority(80)
/// .with_dependency("auth")
/// .with_condition(Condition::path_starts_with("/api"))
/// .with_timeout(Duration::from_secs(2));
///
/// assert_eq!(session.name(), "session");
/// assert_eq!(session.dependencies(), ["auth"]);
/// ```
#[derive(Clone)]
pub struct MiddlewareDescriptor {
    name: String,
    priority: i32,
    enabled: bool,
    dependencies: Vec<String>,
    conditions: Vec<Condition>,
    timeout: Option<Duration>,
    middleware: Arc<dyn Middleware>,
}

impl MiddlewareDescriptor {
    /// Creates an enabled descriptor with default priority and no dependencies.
    pub fn new(name: impl Into<String>, middleware: impl Middleware) -> Self {
        Self::from_arc(name, Arc::new(middleware))
    }

    /// Creates a descriptor for an already shared middleware.
    pub fn from_arc(name: impl Into<String>, middleware: Arc<dyn Middleware>) -> Self {
        Self {
            name: name.into(),
            priority: DEFAULT_PRIORITY,
            enabled: true,
            dependencies: Vec::new(),
            conditions: Vec::new(),
            timeout: None,
            middleware,
        }
    }

    /// Sets the priority. Higher runs earlier among independent middleware.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a dependency. Duplicate names are ignored.
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Adds several dependencies, keeping their order.
    pub fn with_dependencies<I, S>(self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        dependencies
            .into_iter()
            .fold(self, Self::with_dependency)
    }

    /// Adds a condition. All conditions must hold for the middleware to run.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Overrides the chain's per-attempt timeout for this middleware.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Registers the middleware disabled.
    pub fn disabled(self) -> Self {
        self.with_enabled(false)
    }

    /// Returns the unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the priority.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns whether the middleware is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the declared dependencies in declaration order.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Returns the declared conditions.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the timeout override, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the middleware implementation.
    pub fn middleware(&self) -> &Arc<dyn Middleware> {
        &self.middleware
    }
}

impl fmt::Debug for MiddlewareDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("dependencies", &self.dependencies)
            .field("conditions", &self.conditions.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
