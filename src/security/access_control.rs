//! Role-based authorization.
//!
//! A pure set-membership check: an empty requirement admits everyone,
//! otherwise the principal's role must be listed.

use std::collections::BTreeSet;

use crate::security::auth::{Principal, Role};

/// Roles allowed to call an endpoint. Empty means any authenticated caller.
pub type RoleSet = BTreeSet<Role>;

pub fn authorize(principal: &Principal, required_roles: &RoleSet) -> bool {
    required_roles.is_empty() || required_roles.contains(&principal.role)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            id: "u".into(),
            email: "u@salon.test".into(),
            role,
            authorized_locations: BTreeSet::new(),
        }
    }

    #[test]
    fn test_empty_requirement_admits_everyone() {
        assert!(authorize(&principal(Role::Guest), &RoleSet::new()));
    }

    #[test]
    fn test_membership() {
        let managers: RoleSet = [Role::Admin, Role::Manager].into_iter().collect();
        assert!(authorize(&principal(Role::Manager), &managers));
        assert!(!authorize(&principal(Role::Staff), &managers));
    }
}
