//! Database models for crawl and SERP jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::quota::Counter;
use crate::types::{JobId, TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "job_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Crawl,
    Serp,
}

impl JobKind {
    /// Monthly counter consumed by submitting a job of this kind
    pub fn counter(&self) -> Counter {
        match self {
            JobKind::Crawl => Counter::CrawlJobs,
            JobKind::Serp => Counter::SerpJobs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Database request for recording a submitted job
#[derive(Debug, Clone)]
pub struct JobCreateDBRequest {
    pub kind: JobKind,
    pub target: String,
    pub requested_by: UserId,
}

/// Database response for a job
#[derive(Debug, Clone)]
pub struct JobDBResponse {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub kind: JobKind,
    pub target: String,
    pub status: JobStatus,
    pub requested_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}
