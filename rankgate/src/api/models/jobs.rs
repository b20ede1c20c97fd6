//! API models for crawl and SERP job submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::jobs::{JobDBResponse, JobKind, JobStatus};
use crate::quota::{Admission, PeriodKey};
use crate::types::{JobId, UserId};

#[derive(Debug, Deserialize, ToSchema)]
pub struct JobCreate {
    /// URL to crawl, or query to fetch SERPs for
    #[schema(example = "https://example.com/")]
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: JobId,
    pub kind: JobKind,
    pub target: String,
    pub status: JobStatus,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub requested_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl From<JobDBResponse> for JobResponse {
    fn from(job: JobDBResponse) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            target: job.target,
            status: job.status,
            requested_by: job.requested_by,
            created_at: job.created_at,
        }
    }
}

/// Counter state after the job's unit was admitted; absent when the resource is unbounded.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdmittedUnits {
    #[schema(value_type = String, example = "2024-01")]
    pub period: PeriodKey,
    pub used: u64,
    pub limit: u64,
}

impl AdmittedUnits {
    pub fn from_admission(admission: Admission) -> Option<Self> {
        match admission {
            Admission::Admitted { period, used, limit } => Some(Self { period, used, limit }),
            Admission::Unmetered => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobSubmittedResponse {
    pub job: JobResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<AdmittedUnits>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListJobsQuery {
    pub kind: Option<JobKind>,
    /// Maximum number of jobs to return (default: 50, max: 500)
    pub limit: Option<i64>,
}
