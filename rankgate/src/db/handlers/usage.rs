//! Database repository for monthly usage counters.
//!
//! One row per `(tenant_id, period)`, created lazily by the first admission in a period. Counters
//! only ever grow.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::{instrument, warn};

use super::to_bigint;
use crate::db::{errors::Result, models::usage::UsageDBResponse};
use crate::quota::{Counter, PeriodKey};
use crate::types::{TenantId, abbrev_uuid};

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct UsageRow {
    pub tenant_id: TenantId,
    pub period: String,
    pub api_calls: i64,
    pub serp_jobs: i64,
    pub crawl_jobs: i64,
    pub updated_at: DateTime<Utc>,
}

impl UsageRow {
    /// Rows with an unparseable period cannot exist (CHECK constraint); skip rather than fail
    fn into_response(self) -> Option<UsageDBResponse> {
        let period = match self.period.parse::<PeriodKey>() {
            Ok(period) => period,
            Err(e) => {
                warn!(error = %e, "Skipping usage row with malformed period");
                return None;
            }
        };
        Some(UsageDBResponse {
            tenant_id: self.tenant_id,
            period,
            api_calls: self.api_calls.max(0) as u64,
            serp_jobs: self.serp_jobs.max(0) as u64,
            crawl_jobs: self.crawl_jobs.max(0) as u64,
            updated_at: self.updated_at,
        })
    }
}

const USAGE_COLUMNS: &str = "tenant_id, period, api_calls, serp_jobs, crawl_jobs, updated_at";

/// Monthly usage counters, one row per tenant and period.
pub struct Usage<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Usage<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Add `amount` to a counter if the result stays within `limit`.
    ///
    /// Returns the new counter value, or `None` when the increment would exceed the limit (the row
    /// is left untouched). PostgreSQL re-checks the `WHERE` of `ON CONFLICT DO UPDATE` after taking
    /// the row lock, so concurrent callers for the same tenant and period are serialised on the row
    /// and can never jointly exceed the limit.
    #[instrument(skip(self), fields(tenant_id = %abbrev_uuid(&tenant_id), period = %period, counter = counter.column()), err)]
    pub async fn try_increment(
        &mut self,
        tenant_id: TenantId,
        period: PeriodKey,
        counter: Counter,
        amount: u64,
        limit: u64,
    ) -> Result<Option<u64>> {
        let column = counter.column();
        let statement = format!(
            r#"
            INSERT INTO usage_counters AS u (tenant_id, period, {column})
            SELECT $1, $2, $3 WHERE $3 <= $4
            ON CONFLICT (tenant_id, period) DO UPDATE
                SET {column} = u.{column} + EXCLUDED.{column}, updated_at = NOW()
                WHERE u.{column} + EXCLUDED.{column} <= $4
            RETURNING u.{column}
            "#
        );

        let value: Option<i64> = sqlx::query_scalar(&statement)
            .bind(tenant_id)
            .bind(period.to_string())
            .bind(to_bigint(amount))
            .bind(to_bigint(limit))
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(value.map(|v| v.max(0) as u64))
    }

    /// Current value of a counter, zero when the period has no row yet.
    #[instrument(skip(self), fields(tenant_id = %abbrev_uuid(&tenant_id), period = %period, counter = counter.column()), err)]
    pub async fn current(&mut self, tenant_id: TenantId, period: PeriodKey, counter: Counter) -> Result<u64> {
        let column = counter.column();
        let value: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT {column} FROM usage_counters WHERE tenant_id = $1 AND period = $2"
        ))
        .bind(tenant_id)
        .bind(period.to_string())
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(value.unwrap_or(0).max(0) as u64)
    }

    /// All counters of one period; an empty record when nothing was admitted yet.
    #[instrument(skip(self), fields(tenant_id = %abbrev_uuid(&tenant_id), period = %period), err)]
    pub async fn get(&mut self, tenant_id: TenantId, period: PeriodKey) -> Result<UsageDBResponse> {
        let row = sqlx::query_as::<_, UsageRow>(&format!(
            "SELECT {USAGE_COLUMNS} FROM usage_counters WHERE tenant_id = $1 AND period = $2"
        ))
        .bind(tenant_id)
        .bind(period.to_string())
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row
            .and_then(UsageRow::into_response)
            .unwrap_or_else(|| UsageDBResponse::empty(tenant_id, period)))
    }

    /// Every recorded period visible under the current tenant binding, newest first.
    #[instrument(skip(self), err)]
    pub async fn history(&mut self) -> Result<Vec<UsageDBResponse>> {
        let rows = sqlx::query_as::<_, UsageRow>(&format!(
            "SELECT {USAGE_COLUMNS} FROM usage_counters ORDER BY period DESC"
        ))
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows.into_iter().filter_map(UsageRow::into_response).collect())
    }

    /// Every recorded period of any tenant (platform admin), newest first.
    #[instrument(skip(self), fields(tenant_id = %abbrev_uuid(&tenant_id)), err)]
    pub async fn admin_history(&mut self, tenant_id: TenantId) -> Result<Vec<UsageDBResponse>> {
        let rows = sqlx::query_as::<_, UsageRow>(&format!("SELECT {USAGE_COLUMNS} FROM admin_tenant_usage($1)"))
            .bind(tenant_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(rows.into_iter().filter_map(UsageRow::into_response).collect())
    }
}
