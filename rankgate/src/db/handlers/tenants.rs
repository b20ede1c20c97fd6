//! Database repository for tenants.
//!
//! `tenants` carries no row-level security: it is read by exact primary key before any tenant is
//! bound to the connection, and listed or mutated only by platform-admin routes.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::tenants::{TenantCreateDBRequest, TenantDBResponse, TenantStatus, TenantUpdateDBRequest},
};
use crate::types::{TenantId, abbrev_uuid};

/// Filter for listing tenants
#[derive(Debug, Clone)]
pub struct TenantFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<TenantStatus>,
}

impl TenantFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit, status: None }
    }

    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = Some(status);
        self
    }
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    pub plan: String,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Tenant> for TenantDBResponse {
    fn from(tenant: Tenant) -> Self {
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

const TENANT_COLUMNS: &str = "id, name, status, plan, settings, created_at, updated_at";

pub struct Tenants<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Tenants<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Tenants<'c> {
    type CreateRequest = TenantCreateDBRequest;
    type UpdateRequest = TenantUpdateDBRequest;
    type Response = TenantDBResponse;
    type Id = TenantId;
    type Filter = TenantFilter;

    #[instrument(skip(self, request), fields(name = %request.name, plan = %request.plan), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let tenant = sqlx::query_as::<_, Tenant>(&format!(
            "INSERT INTO tenants (name, plan, settings) VALUES ($1, $2, $3) RETURNING {TENANT_COLUMNS}"
        ))
        .bind(&request.name)
        .bind(&request.plan)
        .bind(&request.settings)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(tenant.into())
    }

    #[instrument(skip(self), fields(tenant_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let tenant = sqlx::query_as::<_, Tenant>(&format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(tenant.map(Into::into))
    }

    #[instrument(skip(self, filter), fields(skip = filter.skip, limit = filter.limit), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {TENANT_COLUMNS} FROM tenants"));
        if let Some(status) = filter.status {
            query.push(" WHERE status = ").push_bind(status);
        }
        query
            .push(" ORDER BY created_at, id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.skip);

        let tenants = query.build_query_as::<Tenant>().fetch_all(&mut *self.db).await?;

        Ok(tenants.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, request), fields(tenant_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Atomic update with conditional field updates
        let tenant = sqlx::query_as::<_, Tenant>(&format!(
            r#"
            UPDATE tenants SET
                name = COALESCE($2, name),
                status = COALESCE($3, status),
                plan = COALESCE($4, plan),
                settings = COALESCE($5, settings),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TENANT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.name)
        .bind(request.status)
        .bind(&request.plan)
        .bind(&request.settings)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(tenant.into())
    }
}
