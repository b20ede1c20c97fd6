//! Database models for users.

use chrono::{DateTime, Utc};

use crate::auth::identity::{CallerIdentity, Role};
use crate::types::{TenantId, UserId};

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub tenant_id: TenantId,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub email_verified: bool,
}

/// Database response for a user
#[derive(Debug, Clone)]
pub struct UserDBResponse {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserDBResponse> for CallerIdentity {
    fn from(user: &UserDBResponse) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            tenant_id: user.tenant_id,
            role: user.role,
            email_verified: user.email_verified,
        }
    }
}
