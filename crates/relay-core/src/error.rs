//! Error types for Relay.
//!
//! Errors fall into two families:
//!
//! | Family | Type | Surfaced | Retried |
//! |---|---|---|---|
//! | Build time | [`ChainError`] | Synchronously from registration/validation | Never |
//! | Runtime, per unit | [`MiddlewareError`] | Recorded on the unit's execution result | `Execution` and `Timeout` only |
//!
//! Callers always receive a structured chain result for runtime failures;
//! only build-time errors are returned as `Err`.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for build-time operations.
pub type BuildResult<T> = Result<T, ChainError>;

/// Fatal errors raised while registering, validating or planning a chain.
///
/// # Example
///
/// ```
/// use relay_core::ChainError;
///
/// let err = ChainError::cycle(vec!["auth".into(), "session".into(), "auth".into()]);
/// assert_eq!(err.to_string(), "dependency cycle detected: auth -> session -> auth");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// A middleware with the same name is already registered.
    #[error("middleware already registered: {0}")]
    DuplicateName(String),

    /// A declared dependency is not registered.
    #[error("middleware '{middleware}' depends on unregistered middleware '{dependency}'")]
    MissingDependency {
        /// The middleware declaring the dependency.
        middleware: String,
        /// The dependency that could not be resolved.
        dependency: String,
    },

    /// The named middleware is not registered.
    #[error("middleware not registered: {0}")]
    NotRegistered(String),

    /// The middleware cannot be removed while others depend on it.
    #[error("cannot unregister '{name}': required by {}", dependents.join(", "))]
    DependentsExist {
        /// The middleware that was to be removed.
        name: String,
        /// Registered middleware listing `name` as a dependency.
        dependents: Vec<String>,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected {
        /// Cycle path, starting and ending with the same name.
        path: Vec<String>,
    },

    /// The registry holds more middleware than allowed.
    #[error("chain size {size} exceeds maximum of {max}")]
    ChainSizeExceeded {
        /// Current number of registered middleware.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A parallel group names a middleware that is not registered.
    #[error("parallel group '{group}' references unregistered middleware '{middleware}'")]
    UnknownGroupMember {
        /// The group name.
        group: String,
        /// The unresolved member.
        middleware: String,
    },

    /// Parallel mode was requested without any groups to dispatch.
    #[error("parallel execution requires at least one parallel group")]
    NoParallelGroups,
}

impl ChainError {
    /// Create a duplicate name error.
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateName(name.into())
    }

    /// Create a missing dependency error.
    pub fn missing_dependency(middleware: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::MissingDependency {
            middleware: middleware.into(),
            dependency: dependency.into(),
        }
    }

    /// Create a not registered error.
    pub fn not_registered(name: impl Into<String>) -> Self {
        Self::NotRegistered(name.into())
    }

    /// Create a dependents exist error.
    pub fn dependents_exist(name: impl Into<String>, dependents: Vec<String>) -> Self {
        Self::DependentsExist {
            name: name.into(),
            dependents,
        }
    }

    /// Create a cycle detected error.
    pub fn cycle(path: Vec<String>) -> Self {
        Self::CycleDetected { path }
    }

    /// Create a chain size exceeded error.
    pub fn size_exceeded(size: usize, max: usize) -> Self {
        Self::ChainSizeExceeded { size, max }
    }

    /// Create an unknown group member error.
    pub fn unknown_group_member(group: impl Into<String>, middleware: impl Into<String>) -> Self {
        Self::UnknownGroupMember {
            group: group.into(),
            middleware: middleware.into(),
        }
    }
}

/// Errors produced while running a single middleware.
///
/// These never escape the executor; they are recorded on the unit's
/// execution result after retries are exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MiddlewareError {
    /// The middleware returned an error.
    #[error("execution failed: {message}")]
    Execution {
        /// Human-readable error message.
        message: String,
    },

    /// The middleware did not finish within its timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The chain observed its abort signal and stopped dispatching.
    ///
    /// Recorded on the chain metadata, never on a unit result.
    #[error("chain execution aborted")]
    Aborted,

    /// The middleware panicked while running.
    #[error("middleware panicked: {0}")]
    Panicked(String),

    /// A policy denied the request.
    #[error("policy '{policy}' denied the request")]
    PolicyDenied {
        /// The denying policy.
        policy: String,
    },
}

impl MiddlewareError {
    /// Create an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Create a panicked error.
    pub fn panicked(reason: impl Into<String>) -> Self {
        Self::Panicked(reason.into())
    }

    /// Create a policy denied error.
    pub fn policy_denied(policy: impl Into<String>) -> Self {
        Self::PolicyDenied {
            policy: policy.into(),
        }
    }

    /// Check if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::Timeout(_))
    }

    /// Check if the error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<anyhow::Error> for MiddlewareError {
    fn from(err: anyhow::Error) -> Self {
        Self::execution(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_error_display() {
        let err = ChainError::missing_dependency("session", "auth");
        assert_eq!(
            err.to_string(),
            "middleware 'session' depends on unregistered middleware 'auth'"
        );

        let err = ChainError::dependents_exist("auth", vec!["session".into(), "audit".into()]);
        assert_eq!(err.to_string(), "cannot unregister 'auth': required by session, audit");

        let err = ChainError::size_exceeded(51, 50);
        assert!(err.to_string().contains("51"));
    }

    #[test]
    fn test_empty_parallel_plan_display() {
        assert_eq!(
            ChainError::NoParallelGroups.to_string(),
            "parallel execution requires at least one parallel group"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(MiddlewareError::execution("boom").is_retryable());
        assert!(MiddlewareError::timeout(Duration::from_millis(5)).is_retryable());
        assert!(!MiddlewareError::Aborted.is_retryable());
        assert!(!MiddlewareError::panicked("oops").is_retryable());
        assert!(!MiddlewareError::policy_denied("admin-only").is_retryable());
    }

    #[test]
    fn test_from_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("loading session");
        let converted = MiddlewareError::from(err);
        assert_eq!(
            converted,
            MiddlewareError::execution("loading session: connection refused")
        );
    }

    #[test]
    fn test_middleware_error_serializes_with_kind() {
        let json = serde_json::to_value(MiddlewareError::policy_denied("admin-only")).unwrap();
        assert_eq!(json["kind"], "policy_denied");
        assert_eq!(json["detail"]["policy"], "admin-only");
    }
}
