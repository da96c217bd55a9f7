//! Policy enforcement.
//!
//! Authorization decisions are delegated to an external Policy Enforcement
//! Point (PEP). The [`PolicyEnforcer`] wraps a PEP and reduces every outcome
//! to a boolean: a missing security context, an error from the PEP and an
//! explicit deny all mean "not allowed". Enforcement never fails.
//!
//! [`PolicyMiddleware`] puts a single policy into a chain, and
//! [`RbacPolicyPoint`] is an in-process PEP for development and tests.

use crate::middleware::{BoxFuture, Middleware};
use http::Method;
use relay_core::{ExecutionContext, MiddlewareError, SecurityContext};
use relay_telemetry::metrics::record_policy_decision;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Policy evaluation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Request is allowed.
    Allow,
    /// Request is denied with a reason.
    Deny {
        /// The reason for denial.
        reason: String,
    },
}

impl PolicyDecision {
    /// Returns true for [`PolicyDecision::Allow`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Errors a Policy Enforcement Point may report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The PEP does not know the policy.
    #[error("unknown policy: {0}")]
    UnknownPolicy(String),

    /// The PEP could not be reached.
    #[error("policy engine unavailable: {0}")]
    Unavailable(String),

    /// The PEP failed while evaluating.
    #[error("policy evaluation failed: {0}")]
    Evaluation(String),
}

/// Everything a PEP sees when evaluating a policy.
#[derive(Debug, Clone, Copy)]
pub struct PolicyRequest<'a> {
    /// Policy name.
    pub policy: &'a str,
    /// Authenticated principal.
    pub security: &'a SecurityContext,
    /// Request method.
    pub method: &'a Method,
    /// Request path.
    pub path: &'a str,
    /// Optional resource identifier.
    pub resource: Option<&'a str>,
}

/// An external policy engine.
pub trait PolicyEnforcementPoint: Send + Sync + 'static {
    /// Evaluates a policy.
    fn evaluate<'a>(
        &'a self,
        request: PolicyRequest<'a>,
    ) -> BoxFuture<'a, Result<PolicyDecision, PolicyError>>;
}

/// Reduces PEP outcomes to allow/deny.
#[derive(Clone)]
pub struct PolicyEnforcer {
    pep: Arc<dyn PolicyEnforcementPoint>,
}

impl std::fmt::Debug for PolicyEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEnforcer").finish_non_exhaustive()
    }
}

impl PolicyEnforcer {
    /// Creates an enforcer backed by a PEP.
    pub fn new(pep: impl PolicyEnforcementPoint) -> Self {
        Self { pep: Arc::new(pep) }
    }

    /// Creates an enforcer for an already shared PEP.
    pub fn from_arc(pep: Arc<dyn PolicyEnforcementPoint>) -> Self {
        Self { pep }
    }

    /// Returns true if the policy allows the request.
    ///
    /// False without a security context or when the PEP errors.
    pub async fn enforce(
        &self,
        policy: &str,
        ctx: &ExecutionContext,
        resource: Option<&str>,
    ) -> bool {
        let Some(security) = ctx.security() else {
            debug!(policy, "no security context; denying");
            record_policy_decision(policy, false);
            return false;
        };

        let request = PolicyRequest {
            policy,
            security,
            method: ctx.method(),
            path: ctx.path(),
            resource,
        };

        let allowed = match self.pep.evaluate(request).await {
            Ok(PolicyDecision::Allow) => true,
            Ok(PolicyDecision::Deny { reason }) => {
                debug!(
                    policy,
                    principal = %security.log_id(),
                    reason = %reason,
                    "policy denied"
                );
                false
            }
            Err(e) => {
                warn!(
                    policy,
                    principal = %security.log_id(),
                    error = %e,
                    "policy evaluation failed; denying"
                );
                false
            }
        };

        record_policy_decision(policy, allowed);
        allowed
    }

    /// Returns true if every policy allows. Stops at the first denial.
    ///
    /// An empty list allows.
    pub async fn enforce_all(
        &self,
        policies: &[&str],
        ctx: &ExecutionContext,
        resource: Option<&str>,
    ) -> bool {
        for policy in policies {
            if !self.enforce(policy, ctx, resource).await {
                return false;
            }
        }
        true
    }

    /// Returns true if any policy allows. Stops at the first allow.
    ///
    /// An empty list denies.
    pub async fn enforce_any(
        &self,
        policies: &[&str],
        ctx: &ExecutionContext,
        resource: Option<&str>,
    ) -> bool {
        for policy in policies {
            if self.enforce(policy, ctx, resource).await {
                return true;
            }
        }
        false
    }
}

/// Policy outcome stored in the context for auditing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOutcome {
    /// The policy that was enforced.
    pub policy: String,
    /// Whether the request was allowed.
    pub allowed: bool,
}

/// Middleware that fails with [`MiddlewareError::PolicyDenied`] unless a
/// policy allows the request.
///
/// # Example
///
/// ```
/// use relay_middleware::{MiddlewareDescriptor, PolicyEnforcer, PolicyMiddleware, RbacPolicyPoint};
///
/// let pep = RbacPolicyPoint::builder()
///     .allow_role("admin", ["media:delete"])
///     .build();
///
/// let guard = MiddlewareDescriptor::new(
///     "delete-guard",
///     PolicyMiddleware::new(PolicyEnforcer::new(pep), "media:delete"),
/// )
/// .with_priority(90);
/// # let _ = guard;
/// ```
#[derive(Debug, Clone)]
pub struct PolicyMiddleware {
    enforcer: PolicyEnforcer,
    policy: String,
    resource: Option<String>,
}

impl PolicyMiddleware {
    /// Creates a middleware enforcing `policy`.
    pub fn new(enforcer: PolicyEnforcer, policy: impl Into<String>) -> Self {
        Self {
            enforcer,
            policy: policy.into(),
            resource: None,
        }
    }

    /// Passes a resource identifier to the PEP.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

impl Middleware for PolicyMiddleware {
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<(), MiddlewareError>> {
        Box::pin(async move {
            let allowed = self
                .enforcer
                .enforce(&self.policy, ctx, self.resource.as_deref())
                .await;

            ctx.set_extension(PolicyOutcome {
                policy: self.policy.clone(),
                allowed,
            });

            if allowed {
                Ok(())
            } else {
                Err(MiddlewareError::policy_denied(&self.policy))
            }
        })
    }
}

/// Wildcard granting every policy to a role.
pub const ALL_POLICIES: &str = "*";

/// In-process role-based PEP.
///
/// Each role maps to the policies it satisfies. Unknown policies are an
/// error, which the enforcer turns into a denial.
#[derive(Debug, Clone, Default)]
pub struct RbacPolicyPoint {
    role_policies: HashMap<String, HashSet<String>>,
    known_policies: HashSet<String>,
}

impl RbacPolicyPoint {
    /// Starts building a role table.
    pub fn builder() -> RbacBuilder {
        RbacBuilder::default()
    }

    fn decide(&self, request: &PolicyRequest<'_>) -> Result<PolicyDecision, PolicyError> {
        if !self.known_policies.contains(request.policy) {
            return Err(PolicyError::UnknownPolicy(request.policy.to_string()));
        }

        let granted = request.security.roles.iter().any(|role| {
            self.role_policies.get(role).is_some_and(|policies| {
                policies.contains(ALL_POLICIES) || policies.contains(request.policy)
            })
        });

        if granted {
            Ok(PolicyDecision::Allow)
        } else {
            Ok(PolicyDecision::Deny {
                reason: format!(
                    "no role of {} grants '{}'",
                    request.security.log_id(),
                    request.policy
                ),
            })
        }
    }
}

impl PolicyEnforcementPoint for RbacPolicyPoint {
    fn evaluate<'a>(
        &'a self,
        request: PolicyRequest<'a>,
    ) -> BoxFuture<'a, Result<PolicyDecision, PolicyError>> {
        Box::pin(async move { self.decide(&request) })
    }
}

/// Builder for [`RbacPolicyPoint`].
#[derive(Debug, Default)]
pub struct RbacBuilder {
    point: RbacPolicyPoint,
}

impl RbacBuilder {
    /// Declares a policy without granting it to any role.
    #[must_use]
    pub fn policy(mut self, policy: impl Into<String>) -> Self {
        self.point.known_policies.insert(policy.into());
        self
    }

    /// Grants policies to a role. Use `["*"]` to grant every known policy.
    #[must_use]
    pub fn allow_role<S, I>(mut self, role: S, policies: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let policies: HashSet<String> = policies.into_iter().map(Into::into).collect();
        self.point.known_policies.extend(
            policies
                .iter()
                .filter(|p| p.as_str() != ALL_POLICIES)
                .cloned(),
        );
        self.point
            .role_policies
            .entry(role.into())
            .or_default()
            .extend(policies);
        self
    }

    /// Builds the PEP.
    #[must_use]
    pub fn build(self) -> RbacPolicyPoint {
        self.point
    }
}
