//! Database repository for crawl and SERP jobs.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::jobs::{JobCreateDBRequest, JobDBResponse, JobKind, JobStatus},
};
use crate::types::{JobId, TenantId, UserId};

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub kind: JobKind,
    pub target: String,
    pub status: JobStatus,
    pub requested_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl From<Job> for JobDBResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            tenant_id: job.tenant_id,
            kind: job.kind,
            target: job.target,
            status: job.status,
            requested_by: job.requested_by,
            created_at: job.created_at,
        }
    }
}

const JOB_COLUMNS: &str = "id, tenant_id, kind, target, status, requested_by, created_at";

pub struct Jobs<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Jobs<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Record a submitted job for the bound tenant.
    #[instrument(skip(self, request), fields(kind = ?request.kind), err)]
    pub async fn create(&mut self, request: &JobCreateDBRequest) -> Result<JobDBResponse> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "INSERT INTO jobs (kind, target, requested_by) VALUES ($1, $2, $3) RETURNING {JOB_COLUMNS}"
        ))
        .bind(request.kind)
        .bind(&request.target)
        .bind(request.requested_by)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(job.into())
    }

    /// Most recent jobs of the bound tenant, optionally of one kind.
    #[instrument(skip(self), err)]
    pub async fn list(&mut self, kind: Option<JobKind>, limit: i64) -> Result<Vec<JobDBResponse>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE ($1::job_kind IS NULL OR kind = $1) ORDER BY created_at DESC, id LIMIT $2"
        ))
        .bind(kind)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(jobs.into_iter().map(Into::into).collect())
    }
}
