//! Middleware registration.
//!
//! The registry maps unique names to descriptors and remembers registration
//! order, which breaks priority ties when the execution order is built.

use crate::descriptor::MiddlewareDescriptor;
use indexmap::IndexMap;
use relay_core::{BuildResult, ChainError};
use std::sync::Arc;
use tracing::debug;

/// Registered middleware, in registration order.
///
/// Cloning is cheap: descriptors are shared. The chain executes against a
/// clone so registrations made mid-execution do not affect it.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareRegistry {
    entries: IndexMap<String, Arc<MiddlewareDescriptor>>,
}

impl MiddlewareRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a middleware.
    ///
    /// Every dependency must already be registered, so a middleware can never
    /// depend on itself through the registry.
    ///
    /// # Errors
    ///
    /// - [`ChainError::DuplicateName`] if the name is taken
    /// - [`ChainError::MissingDependency`] for the first unknown dependency
    pub fn register(&mut self, descriptor: MiddlewareDescriptor) -> BuildResult<()> {
        if self.entries.contains_key(descriptor.name()) {
            return Err(ChainError::duplicate(descriptor.name()));
        }

        if let Some(missing) = descriptor
            .dependencies()
            .iter()
            .find(|dep| !self.entries.contains_key(dep.as_str()))
        {
            return Err(ChainError::missing_dependency(descriptor.name(), missing));
        }

        debug!(
            middleware = descriptor.name(),
            priority = descriptor.priority(),
            dependencies = ?descriptor.dependencies(),
            "middleware registered"
        );

        self.entries
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// Removes a middleware.
    ///
    /// # Errors
    ///
    /// - [`ChainError::NotRegistered`] if the name is unknown
    /// - [`ChainError::DependentsExist`] if other middleware depend on it
    pub fn unregister(&mut self, name: &str) -> BuildResult<Arc<MiddlewareDescriptor>> {
        if !self.entries.contains_key(name) {
            return Err(ChainError::not_registered(name));
        }

        let dependents = self.dependents_of(name);
        if !dependents.is_empty() {
            return Err(ChainError::dependents_exist(name, dependents));
        }

        debug!(middleware = name, "middleware unregistered");

        self.entries
            .shift_remove(name)
            .ok_or_else(|| ChainError::not_registered(name))
    }

    /// Enables or disables a middleware.
    ///
    /// The entry keeps its registration position.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NotRegistered`] if the name is unknown.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> BuildResult<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ChainError::not_registered(name))?;

        if entry.is_enabled() != enabled {
            *entry = Arc::new((**entry).clone().with_enabled(enabled));
            debug!(middleware = name, enabled, "middleware toggled");
        }
        Ok(())
    }

    /// Returns a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&Arc<MiddlewareDescriptor>> {
        self.entries.get(name)
    }

    /// Returns true if the name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the number of registered middleware.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterates over descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<MiddlewareDescriptor>> {
        self.entries.values()
    }

    /// Returns the names of middleware that declare `name` as a dependency.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.entries
            .values()
            .filter(|d| d.dependencies().iter().any(|dep| dep == name))
            .map(|d| d.name().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnMiddleware;

    fn noop(name: &str) -> MiddlewareDescriptor {
        MiddlewareDescriptor::new(name, FnMiddleware::new(|_ctx| Box::pin(async { Ok(()) })))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = MiddlewareRegistry::new();
        registry.register(noop("auth")).unwrap();
        registry.register(noop("session").with_dependency("auth")).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("auth"));
        assert_eq!(registry.names(), vec!["auth", "session"]);
        assert_eq!(registry.get("session").unwrap().dependencies(), ["auth"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = MiddlewareRegistry::new();
        registry.register(noop("auth")).unwrap();

        let err = registry.register(noop("auth")).unwrap_err();
        assert_eq!(err, ChainError::duplicate("auth"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_dependency_rejected() {
        let mut registry = MiddlewareRegistry::new();
        let err = registry
            .register(noop("session").with_dependency("auth"))
            .unwrap_err();

        assert_eq!(err, ChainError::missing_dependency("session", "auth"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut registry = MiddlewareRegistry::new();
        let err = registry
            .register(noop("loop").with_dependency("loop"))
            .unwrap_err();

        assert_eq!(err, ChainError::missing_dependency("loop", "loop"));
    }

    #[test]
    fn test_unregister() {
        let mut registry = MiddlewareRegistry::new();
        registry.register(noop("auth")).unwrap();
        registry.register(noop("session").with_dependency("auth")).unwrap();
        registry.register(noop("audit").with_dependency("auth")).unwrap();

        let err = registry.unregister("auth").unwrap_err();
        assert_eq!(
            err,
            ChainError::dependents_exist("auth", vec!["session".into(), "audit".into()])
        );

        assert_eq!(
            registry.unregister("missing").unwrap_err(),
            ChainError::not_registered("missing")
        );

        registry.unregister("session").unwrap();
        registry.unregister("audit").unwrap();
        registry.unregister("auth").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_preserves_order() {
        let mut registry = MiddlewareRegistry::new();
        for name in ["a", "b", "c", "d"] {
            registry.register(noop(name)).unwrap();
        }
        registry.unregister("b").unwrap();
        assert_eq!(registry.names(), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_set_enabled_replaces_descriptor() {
        let mut registry = MiddlewareRegistry::new();
        registry.register(noop("auth")).unwrap();
        registry.register(noop("cache")).unwrap();

        let before = Arc::clone(registry.get("auth").unwrap());
        registry.set_enabled("auth", false).unwrap();

        assert!(before.is_enabled());
        assert!(!registry.get("auth").unwrap().is_enabled());
        assert_eq!(registry.names(), vec!["auth", "cache"]);

        assert_eq!(
            registry.set_enabled("nope", true).unwrap_err(),
            ChainError::not_registered("nope")
        );
    }
}
