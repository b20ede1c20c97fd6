//! Database models for recorded quota rejections.

use chrono::{DateTime, Utc};

use crate::quota::QuotaExceeded;
use crate::types::{TenantId, UserId};

/// A rejection to record for the bound tenant
#[derive(Debug, Clone)]
pub struct QuotaEventCreateDBRequest {
    pub user_id: Option<UserId>,
    pub exceeded: QuotaExceeded,
}

/// Database response for a recorded rejection
#[derive(Debug, Clone)]
pub struct QuotaEventDBResponse {
    pub id: i64,
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub resource: String,
    pub period: Option<String>,
    pub limit: u64,
    pub current: u64,
    pub requested: u64,
    pub created_at: DateTime<Utc>,
}
