//! API models for users and the caller's own view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::tenants::TenantResponse;
use crate::auth::identity::{CallerIdentity, Role};
use crate::db::models::users::UserDBResponse;
use crate::quota::QuotaPolicy;
use crate::types::{TenantId, UserId};

/// A user account. Never includes the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub tenant_id: TenantId,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(user: UserDBResponse) -> Self {
        Self {
            id: user.id,
            tenant_id: user.tenant_id,
            email: user.email,
            role: user.role,
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

/// Platform-admin request to provision a user into a tenant
#[derive(Debug, Deserialize, ToSchema)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub email_verified: bool,
}

/// The caller, their tenant and the quota policy in force
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub identity: CallerIdentity,
    pub tenant: TenantResponse,
    pub policy: QuotaPolicy,
}
