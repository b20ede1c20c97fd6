//! Database models for tenants.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::TenantId;

/// Lifecycle status of a tenant. Only `active` tenants are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "tenant_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Disabled,
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Disabled => "disabled",
        })
    }
}

/// Database request for creating a new tenant
#[derive(Debug, Clone)]
pub struct TenantCreateDBRequest {
    pub name: String,
    pub plan: String,
    pub settings: serde_json::Value,
}

/// Database request for updating a tenant. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TenantUpdateDBRequest {
    pub name: Option<String>,
    pub status: Option<TenantStatus>,
    pub plan: Option<String>,
    pub settings: Option<serde_json::Value>,
}

/// Database response for a tenant
#[derive(Debug, Clone, PartialEq)]
pub struct TenantDBResponse {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    pub plan: String,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantDBResponse {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}
