//! Per-endpoint security declarations.

use crate::audit::AuditAction;
use crate::security::access_control::RoleSet;
use crate::security::auth::Role;
use crate::security::rate_limit::RateLimitPolicy;
use crate::security::validation::Field;

/// What the guard enforces in front of one route.
///
/// ```text
/// EndpointPolicy::roles([Role::Admin, Role::Manager])
///     .rate_limit(RateLimitPolicy::STRICT)
///     .schema(schemas::service_creation())
///     .audit(AuditAction::ResourceCreated, "service")
/// ```
#[derive(Debug, Clone, Default)]
pub struct EndpointPolicy {
    pub rate_limit: Option<RateLimitPolicy>,
    pub require_auth: bool,
    pub required_roles: RoleSet,
    pub schema: Option<Field>,
    pub audit_action: Option<AuditAction>,
    pub resource_type: Option<String>,
}

impl EndpointPolicy {
    /// No authentication; only rate limiting and validation if configured.
    pub fn public() -> Self {
        Self::default()
    }

    /// Any authenticated principal.
    pub fn authenticated() -> Self {
        Self {
            require_auth: true,
            ..Self::default()
        }
    }

    /// Authenticated principals holding one of `roles`.
    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            require_auth: true,
            required_roles: roles.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    pub fn schema(mut self, schema: Field) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Record `action` on success and SUSPICIOUS_ACTIVITY on handler failure.
    pub fn audit(mut self, action: AuditAction, resource_type: impl Into<String>) -> Self {
        self.audit_action = Some(action);
        self.resource_type = Some(resource_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_imply_authentication() {
        let policy = EndpointPolicy::roles([Role::Admin]);
        assert!(policy.require_auth);
        assert!(policy.required_roles.contains(&Role::Admin));
        assert!(!EndpointPolicy::public().require_auth);
    }
}
