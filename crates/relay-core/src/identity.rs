//! Security context attached to an execution.
//!
//! The HTTP layer authenticates the caller and hands the chain a
//! [`SecurityContext`]. Relay never validates tokens itself; it only reads
//! the principal when consulting a Policy Enforcement Point.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of principal behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// An end user.
    User,
    /// A workload or service identity.
    Service,
    /// An API key.
    ApiKey,
}

/// Authenticated principal for a request.
///
/// # Example
///
/// ```
/// use relay_core::SecurityContext;
///
/// let security = SecurityContext::user("u-42")
///     .with_role("admin")
///     .with_tenant("acme");
///
/// assert!(security.has_role("admin"));
/// assert_eq!(security.log_id(), "user:u-42");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityContext {
    /// Principal identifier (user ID, service name or key ID).
    pub principal: String,
    /// What kind of principal this is.
    pub kind: PrincipalKind,
    /// Roles granted to the principal.
    #[serde(default)]
    pub roles: Vec<String>,
    /// OAuth-style scopes granted to the principal.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Tenant the principal belongs to, if any.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Additional claims forwarded to the policy engine.
    #[serde(default)]
    pub claims: HashMap<String, serde_json::Value>,
}

impl SecurityContext {
    /// Creates a context for an end user.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(user_id, PrincipalKind::User)
    }

    /// Creates a context for a service identity.
    #[must_use]
    pub fn service(service_name: impl Into<String>) -> Self {
        Self::new(service_name, PrincipalKind::Service)
    }

    /// Creates a context for an API key.
    #[must_use]
    pub fn api_key(key_id: impl Into<String>) -> Self {
        Self::new(key_id, PrincipalKind::ApiKey)
    }

    fn new(principal: impl Into<String>, kind: PrincipalKind) -> Self {
        Self {
            principal: principal.into(),
            kind,
            roles: Vec::new(),
            scopes: Vec::new(),
            tenant_id: None,
            claims: HashMap::new(),
        }
    }

    /// Adds a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Adds a scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Sets the tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Adds a claim.
    #[must_use]
    pub fn with_claim(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.claims.insert(key.into(), value);
        self
    }

    /// Returns true if the principal holds the role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Returns true if the principal holds the scope.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Returns a string identifier suitable for logging.
    ///
    /// Never includes claims or other potentially sensitive data.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self.kind {
            PrincipalKind::User => format!("user:{}", self.principal),
            PrincipalKind::Service => format!("service:{}", self.principal),
            PrincipalKind::ApiKey => format!("apikey:{}", self.principal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_ids() {
        assert_eq!(SecurityContext::user("u1").log_id(), "user:u1");
        assert_eq!(SecurityContext::service("billing").log_id(), "service:billing");
        assert_eq!(SecurityContext::api_key("k9").log_id(), "apikey:k9");
    }

    #[test]
    fn test_roles_and_scopes() {
        let security = SecurityContext::api_key("k1")
            .with_scope("media:read")
            .with_role("uploader");

        assert!(security.has_scope("media:read"));
        assert!(!security.has_scope("media:write"));
        assert!(security.has_role("uploader"));
        assert!(!security.has_role("admin"));
    }

    #[test]
    fn test_claims_round_trip_through_json() {
        let security = SecurityContext::user("u1")
            .with_tenant("acme")
            .with_claim("plan", serde_json::json!("pro"));

        let json = serde_json::to_string(&security).unwrap();
        let back: SecurityContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, security);
    }
}
