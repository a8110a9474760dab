use shared::{AccessClaims, Role};
use uuid::Uuid;

/// Identity of the caller, resolved once by the auth middleware and passed
/// explicitly into every service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: Uuid,
    pub role: Role,
    /// Merchant the caller works for, when the token carries it.
    pub merchant_id: Option<Uuid>,
}

impl RequestContext {
    pub fn new(user_id: Uuid, role: Role, merchant_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            role,
            merchant_id,
        }
    }

    pub fn consumer(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Consumer, None)
    }

    pub fn staff(user_id: Uuid, merchant_id: Uuid) -> Self {
        Self::new(user_id, Role::Merchant, Some(merchant_id))
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

impl From<AccessClaims> for RequestContext {
    fn from(claims: AccessClaims) -> Self {
        Self::new(claims.sub, claims.role, claims.merchant_id)
    }
}
