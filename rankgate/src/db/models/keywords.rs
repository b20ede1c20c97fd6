//! Database models for tracked keywords.

use chrono::{DateTime, Utc};

use crate::types::{KeywordId, TenantId};

/// A keyword to start tracking
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeywordCreateDBRequest {
    pub keyword: String,
    pub locale: String,
}

/// Database response for a tracked keyword
#[derive(Debug, Clone)]
pub struct KeywordDBResponse {
    pub id: KeywordId,
    pub tenant_id: TenantId,
    pub keyword: String,
    pub locale: String,
    pub created_at: DateTime<Utc>,
}
