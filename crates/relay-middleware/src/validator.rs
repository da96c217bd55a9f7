//! Chain validation.
//!
//! The validator checks a set of descriptors for problems that make the
//! chain unusable (errors) and for suspicious but legal setups (warnings):
//!
//! | Check | Severity |
//! |---|---|
//! | Duplicate name | error |
//! | Dependency cycle | error |
//! | Unknown dependency | error |
//! | More than `max_chain_size` middleware | error |
//! | Several middleware share a priority | warning |
//!
//! A registry built through [`MiddlewareRegistry::register`] can never hold
//! duplicates, cycles or unknown dependencies; those checks matter for
//! descriptor sets assembled elsewhere, e.g. from configuration, before they
//! are registered.

use crate::descriptor::MiddlewareDescriptor;
use crate::registry::MiddlewareRegistry;
use indexmap::IndexMap;
use relay_core::{BuildResult, ChainError};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Default maximum number of middleware in a chain.
pub const DEFAULT_MAX_CHAIN_SIZE: usize = 50;

/// Validator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Maximum number of middleware in a chain.
    pub max_chain_size: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_chain_size: DEFAULT_MAX_CHAIN_SIZE,
        }
    }
}

/// A non-fatal validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// Several middleware share a priority; their relative order falls back
    /// to registration order.
    PriorityConflict {
        /// The shared priority.
        priority: i32,
        /// Middleware with that priority, in registration order.
        middleware: Vec<String>,
    },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PriorityConflict {
                priority,
                middleware,
            } => write!(
                f,
                "middleware share priority {priority}: {}",
                middleware.join(", ")
            ),
        }
    }
}

/// Outcome of a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    /// True when `errors` is empty.
    pub valid: bool,
    /// Fatal problems.
    pub errors: Vec<ChainError>,
    /// Non-fatal findings.
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// Converts the report into a result carrying the warnings.
    ///
    /// # Errors
    ///
    /// Returns the first error when the report is invalid.
    pub fn into_result(self) -> BuildResult<Vec<ValidationWarning>> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.warnings),
        }
    }
}

/// Validates descriptor sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainValidator {
    config: ValidatorConfig,
}

impl ChainValidator {
    /// Creates a validator.
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validates a registry.
    pub fn validate(&self, registry: &MiddlewareRegistry) -> ValidationReport {
        self.validate_descriptors(registry.iter().map(|d| &**d))
    }

    /// Validates an arbitrary descriptor set.
    pub fn validate_descriptors<'a, I>(&self, descriptors: I) -> ValidationReport
    where
        I: IntoIterator<Item = &'a MiddlewareDescriptor>,
    {
        let mut errors = Vec::new();
        let mut graph: IndexMap<&'a str, &'a MiddlewareDescriptor> = IndexMap::new();

        for descriptor in descriptors {
            if graph.contains_key(descriptor.name()) {
                errors.push(ChainError::duplicate(descriptor.name()));
            } else {
                graph.insert(descriptor.name(), descriptor);
            }
        }

        if let Some(path) = CycleFinder::new(&graph).find() {
            errors.push(ChainError::cycle(path));
        }

        for descriptor in graph.values() {
            for dependency in descriptor.dependencies() {
                if !graph.contains_key(dependency.as_str()) {
                    errors.push(ChainError::missing_dependency(descriptor.name(), dependency));
                }
            }
        }

        if graph.len() > self.config.max_chain_size {
            errors.push(ChainError::size_exceeded(
                graph.len(),
                self.config.max_chain_size,
            ));
        }

        let warnings = priority_conflicts(&graph);

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

fn priority_conflicts(graph: &IndexMap<&str, &MiddlewareDescriptor>) -> Vec<ValidationWarning> {
    let mut by_priority: IndexMap<i32, Vec<String>> = IndexMap::new();
    for descriptor in graph.values() {
        by_priority
            .entry(descriptor.priority())
            .or_default()
            .push(descriptor.name().to_string());
    }

    by_priority
        .into_iter()
        .filter(|(_, middleware)| middleware.len() > 1)
        .map(|(priority, middleware)| ValidationWarning::PriorityConflict {
            priority,
            middleware,
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search reporting the first cycle found.
struct CycleFinder<'g, 'a> {
    graph: &'g IndexMap<&'a str, &'a MiddlewareDescriptor>,
    marks: HashMap<&'a str, Mark>,
    path: Vec<&'a str>,
}

impl<'g, 'a> CycleFinder<'g, 'a> {
    fn new(graph: &'g IndexMap<&'a str, &'a MiddlewareDescriptor>) -> Self {
        Self {
            graph,
            marks: HashMap::with_capacity(graph.len()),
            path: Vec::new(),
        }
    }

    fn find(mut self) -> Option<Vec<String>> {
        let graph = self.graph;
        graph.keys().find_map(|&name| self.visit(name))
    }

    fn visit(&mut self, name: &'a str) -> Option<Vec<String>> {
        match self.marks.get(name) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = self.path.iter().position(|&n| n == name)?;
                let mut cycle: Vec<String> =
                    self.path[start..].iter().map(|n| (*n).to_string()).collect();
                cycle.push(name.to_string());
                return Some(cycle);
            }
            None => {}
        }

        let &descriptor = self.graph.get(name)?;

        self.marks.insert(name, Mark::Visiting);
        self.path.push(name);
        for dependency in descriptor.dependencies() {
            if let Some(cycle) = self.visit(dependency.as_str()) {
                return Some(cycle);
            }
        }
        self.path.pop();
        self.marks.insert(name, Mark::Done);
        None
    }
}
