//! API models for tenants (platform-admin routes and the caller's own tenant).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::db::models::tenants::{TenantDBResponse, TenantStatus};
use crate::types::TenantId;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TenantResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    pub plan: String,
    /// Opaque tenant configuration; `quotas` overrides plan bounds
    #[schema(value_type = Object)]
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TenantDBResponse> for TenantResponse {
    fn from(tenant: TenantDBResponse) -> Self {
        Self {
            id: tenant.id,
            name: tenant.name,
            status: tenant.status,
            plan: tenant.plan,
            settings: tenant.settings,
            created_at: tenant.created_at,
            updated_at: tenant.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TenantCreate {
    pub name: String,
    /// Defaults to the configured default plan
    pub plan: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub settings: Option<serde_json::Value>,
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TenantUpdate {
    pub name: Option<String>,
    pub status: Option<TenantStatus>,
    pub plan: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub settings: Option<serde_json::Value>,
}

/// Query parameters for listing tenants
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListTenantsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only tenants in this status
    pub status: Option<TenantStatus>,
}
