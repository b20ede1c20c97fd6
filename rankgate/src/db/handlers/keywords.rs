//! Database repository for tracked keywords.
//!
//! Queries carry no tenant predicate: on a bound connection row-level security scopes every
//! statement to the bound tenant, and inserts take `tenant_id` from the session default.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::keywords::{KeywordCreateDBRequest, KeywordDBResponse},
};
use crate::types::{KeywordId, TenantId, abbrev_uuid};

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Keyword {
    pub id: KeywordId,
    pub tenant_id: TenantId,
    pub keyword: String,
    pub locale: String,
    pub created_at: DateTime<Utc>,
}

impl From<Keyword> for KeywordDBResponse {
    fn from(keyword: Keyword) -> Self {
        Self {
            id: keyword.id,
            tenant_id: keyword.tenant_id,
            keyword: keyword.keyword,
            locale: keyword.locale,
            created_at: keyword.created_at,
        }
    }
}

pub struct Keywords<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Keywords<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Number of keywords the tenant tracks.
    #[instrument(skip(self), fields(tenant_id = %abbrev_uuid(&tenant_id)), err)]
    pub async fn count(&mut self, tenant_id: TenantId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenant_keywords WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count.max(0) as u64)
    }

    /// How many of `keywords` the tenant already tracks.
    #[instrument(skip(self, keywords), fields(tenant_id = %abbrev_uuid(&tenant_id), count = keywords.len()), err)]
    pub async fn count_tracked(&mut self, tenant_id: TenantId, keywords: &[KeywordCreateDBRequest]) -> Result<u64> {
        if keywords.is_empty() {
            return Ok(0);
        }

        let (terms, locales): (Vec<&str>, Vec<&str>) = keywords
            .iter()
            .map(|k| (k.keyword.as_str(), k.locale.as_str()))
            .unzip();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tenant_keywords k \
             JOIN UNNEST($2::text[], $3::text[]) AS batch(keyword, locale) \
               ON k.keyword = batch.keyword AND k.locale = batch.locale \
             WHERE k.tenant_id = $1",
        )
        .bind(tenant_id)
        .bind(&terms)
        .bind(&locales)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count.max(0) as u64)
    }

    /// Serialise keyword imports of one tenant until the surrounding transaction ends.
    #[instrument(skip(self), fields(tenant_id = %abbrev_uuid(&tenant_id)), err)]
    pub async fn lock_for_import(&mut self, tenant_id: TenantId) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended('tenant_keywords:' || $1::text, 0))")
            .bind(tenant_id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    /// Insert keywords, skipping ones already tracked. Returns the inserted rows.
    #[instrument(skip(self, keywords), fields(count = keywords.len()), err)]
    pub async fn insert_many(&mut self, keywords: &[KeywordCreateDBRequest]) -> Result<Vec<KeywordDBResponse>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO tenant_keywords (keyword, locale) ");
        query.push_values(keywords, |mut row, keyword| {
            row.push_bind(&keyword.keyword).push_bind(&keyword.locale);
        });
        query.push(
            " ON CONFLICT (tenant_id, keyword, locale) DO NOTHING RETURNING id, tenant_id, keyword, locale, created_at",
        );

        let inserted = query.build_query_as::<Keyword>().fetch_all(&mut *self.db).await?;

        Ok(inserted.into_iter().map(Into::into).collect())
    }

    /// Keywords visible under the current tenant binding.
    #[instrument(skip(self), err)]
    pub async fn list(&mut self, skip: i64, limit: i64) -> Result<Vec<KeywordDBResponse>> {
        let keywords = sqlx::query_as::<_, Keyword>(
            "SELECT id, tenant_id, keyword, locale, created_at FROM tenant_keywords ORDER BY created_at, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(keywords.into_iter().map(Into::into).collect())
    }
}
