use serde::{Deserialize, Serialize};

use campusmarket_core::UserId;

use crate::{permissions_for_role, JwtClaims, Permission, Role};

/// A fully resolved principal for authorization decisions.
///
/// Construction is intentionally decoupled from transport: the API derives
/// principals from verified JWT claims, tests build them directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        let permissions = roles.iter().flat_map(permissions_for_role).collect();
        Self {
            user_id,
            roles,
            permissions,
        }
    }

    /// Resolve a principal from verified claims (roles → effective permissions).
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self::new(claims.sub, claims.roles.clone())
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}
