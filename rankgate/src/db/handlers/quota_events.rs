//! Database repository for recorded quota rejections.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

use super::to_bigint;
use crate::db::{
    errors::Result,
    models::quota_events::{QuotaEventCreateDBRequest, QuotaEventDBResponse},
};
use crate::types::{TenantId, UserId};

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct QuotaEvent {
    pub id: i64,
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub resource: String,
    pub period: Option<String>,
    pub quota_limit: i64,
    pub current_usage: i64,
    pub requested: i64,
    pub created_at: DateTime<Utc>,
}

impl From<QuotaEvent> for QuotaEventDBResponse {
    fn from(event: QuotaEvent) -> Self {
        Self {
            id: event.id,
            tenant_id: event.tenant_id,
            user_id: event.user_id,
            resource: event.resource,
            period: event.period,
            limit: event.quota_limit.max(0) as u64,
            current: event.current_usage.max(0) as u64,
            requested: event.requested.max(0) as u64,
            created_at: event.created_at,
        }
    }
}

pub struct QuotaEvents<'c> {
    db: &'c mut PgConnection,
}

impl<'c> QuotaEvents<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Record a rejection for the bound tenant.
    #[instrument(skip(self, request), fields(resource = %request.exceeded.kind), err)]
    pub async fn create(&mut self, request: &QuotaEventCreateDBRequest) -> Result<i64> {
        let exceeded = &request.exceeded;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO quota_events (user_id, resource, period, quota_limit, current_usage, requested)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(request.user_id)
        .bind(exceeded.kind.as_str())
        .bind(exceeded.period.map(|p| p.to_string()))
        .bind(to_bigint(exceeded.limit))
        .bind(to_bigint(exceeded.current))
        .bind(to_bigint(exceeded.requested))
        .fetch_one(&mut *self.db)
        .await?;

        Ok(id)
    }

    /// Most recent rejections of the bound tenant.
    #[instrument(skip(self), err)]
    pub async fn recent(&mut self, limit: i64) -> Result<Vec<QuotaEventDBResponse>> {
        let events = sqlx::query_as::<_, QuotaEvent>(
            r#"
            SELECT id, tenant_id, user_id, resource, period, quota_limit, current_usage, requested, created_at
            FROM quota_events
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(events.into_iter().map(Into::into).collect())
    }
}
