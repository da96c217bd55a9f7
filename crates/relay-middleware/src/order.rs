//! Execution order construction.
//!
//! Middleware are sorted by descending priority (registration order breaks
//! ties) and then visited depth-first, dependencies before dependents. The
//! result is a topological order that favours higher priority wherever the
//! dependency graph leaves a choice.
//!
//! ```text
//! registered:   auth(100)   metrics(90)   session(50, deps: auth)
//! by priority:  auth        metrics       session
//! order:        auth        metrics       session
//! ```
//!
//! Unknown dependency names are skipped, and a cycle is broken at the first
//! node revisited while still in progress. Neither can occur in a
//! [`MiddlewareRegistry`]; the validator reports both for ad-hoc descriptor
//! sets.

use crate::descriptor::MiddlewareDescriptor;
use crate::registry::MiddlewareRegistry;
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::collections::HashSet;

/// Builds the execution order of every registered middleware.
///
/// Disabled middleware are included; the executor skips them.
pub fn execution_order(registry: &MiddlewareRegistry) -> Vec<String> {
    order_descriptors(registry.iter().map(|d| &**d))
}

/// Builds the execution order of an arbitrary descriptor set.
///
/// Later descriptors with a duplicate name are ignored.
pub fn order_descriptors<'a, I>(descriptors: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a MiddlewareDescriptor>,
{
    let mut graph: IndexMap<&'a str, &'a MiddlewareDescriptor> = IndexMap::new();
    for descriptor in descriptors {
        graph.entry(descriptor.name()).or_insert(descriptor);
    }

    let mut by_priority: Vec<&'a MiddlewareDescriptor> = graph.values().copied().collect();
    by_priority.sort_by_key(|d| Reverse(d.priority()));

    let mut builder = OrderBuilder {
        order: Vec::with_capacity(graph.len()),
        visited: HashSet::with_capacity(graph.len()),
        in_progress: HashSet::new(),
        graph,
    };

    for descriptor in by_priority {
        builder.visit(descriptor.name());
    }

    builder.order
}

struct OrderBuilder<'a> {
    graph: IndexMap<&'a str, &'a MiddlewareDescriptor>,
    visited: HashSet<&'a str>,
    in_progress: HashSet<&'a str>,
    order: Vec<String>,
}

impl<'a> OrderBuilder<'a> {
    fn visit(&mut self, name: &'a str) {
        if self.visited.contains(name) || self.in_progress.contains(name) {
            return;
        }
        let Some(&descriptor) = self.graph.get(name) else {
            return;
        };

        self.in_progress.insert(name);
        for dependency in descriptor.dependencies() {
            self.visit(dependency.as_str());
        }
        self.in_progress.remove(name);

        self.visited.insert(name);
        self.order.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnMiddleware;
    use proptest::prelude::*;

    fn noop(name: &str) -> MiddlewareDescriptor {
        MiddlewareDescriptor::new(name, FnMiddleware::new(|_ctx| Box::pin(async { Ok(()) })))
    }

    fn registry(descriptors: Vec<MiddlewareDescriptor>) -> MiddlewareRegistry {
        let mut registry = MiddlewareRegistry::new();
        for descriptor in descriptors {
            registry.register(descriptor).unwrap();
        }
        registry
    }

    #[test]
    fn test_priority_with_dependency() {
        let registry = registry(vec![
            noop("A").with_priority(100),
            noop("C").with_priority(90),
            noop("B").with_priority(50).with_dependency("A"),
        ]);

        assert_eq!(execution_order(&registry), vec!["A", "C", "B"]);
    }

    #[test]
    fn test_dependency_pulls_low_priority_forward() {
        let registry = registry(vec![
            noop("db").with_priority(1),
            noop("cache").with_priority(5),
            noop("api").with_priority(10).with_dependency("db"),
        ]);

        assert_eq!(execution_order(&registry), vec!["db", "api", "cache"]);
    }

    #[test]
    fn test_ties_follow_registration_order() {
        let registry = registry(vec![noop("x"), noop("y"), noop("z").with_priority(1)]);
        assert_eq!(execution_order(&registry), vec!["z", "x", "y"]);
    }

    #[test]
    fn test_dependencies_visited_in_declared_order() {
        let registry = registry(vec![
            noop("a"),
            noop("b"),
            noop("c").with_priority(10).with_dependencies(["b", "a"]),
        ]);

        assert_eq!(execution_order(&registry), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_cycle_and_unknown_dependencies_terminate() {
        let descriptors = [
            noop("a").with_dependency("b"),
            noop("b").with_dependency("a"),
            noop("c").with_dependency("ghost"),
        ];

        let order = order_descriptors(descriptors.iter());
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_empty() {
        assert!(execution_order(&MiddlewareRegistry::new()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_order_is_a_priority_respecting_topological_sort(
            specs in prop::collection::vec(
                (-5i32..5, prop::collection::vec(any::<prop::sample::Index>(), 0..3)),
                1..12,
            )
        ) {
            let mut descriptors = Vec::new();
            for (i, (priority, deps)) in specs.iter().enumerate() {
                let mut descriptor = noop(&format!("m{i}")).with_priority(*priority);
                if i > 0 {
                    for dep in deps {
                        descriptor = descriptor.with_dependency(format!("m{}", dep.index(i)));
                    }
                }
                descriptors.push(descriptor);
            }
            let registry = registry(descriptors);
            let order = execution_order(&registry);

            prop_assert_eq!(order.len(), registry.len());
            let position = |name: &str| order.iter().position(|n| n == name).unwrap();
            for descriptor in registry.iter() {
                for dep in descriptor.dependencies() {
                    prop_assert!(position(dep) < position(descriptor.name()));
                }
            }
        }
    }
}
