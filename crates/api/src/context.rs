use campusmarket_auth::{JwtClaims, Principal};
use campusmarket_core::UserId;
use campusmarket_infra::UserRecord;

/// Principal context for a request (authenticated identity + capabilities).
///
/// This is immutable and must be present for all authenticated routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
    display_name: Option<String>,
}

impl PrincipalContext {
    pub fn new(principal: Principal, display_name: Option<String>) -> Self {
        Self {
            principal,
            display_name,
        }
    }

    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self::new(Principal::from_claims(claims), claims.name.clone())
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    /// The identity record kept for display joins in moderation views.
    pub fn user_record(&self) -> UserRecord {
        UserRecord {
            id: self.user_id(),
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| self.user_id().to_string()),
            role: self
                .principal
                .roles
                .first()
                .map(|r| r.as_str().to_string())
                .unwrap_or_else(|| "member".to_string()),
        }
    }
}
