//! Platform-admin tenant management.
//!
//! These handlers run on an unbound connection: `tenants` is not row-secured, and cross-tenant
//! reads and writes of row-secured tables go through `SECURITY DEFINER` functions.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        tenants::{ListTenantsQuery, TenantCreate, TenantResponse, TenantUpdate},
        usage::UsagePeriodResponse,
        users::{UserCreate, UserResponse},
    },
    auth::password,
    config::Config,
    db::{
        errors::DbError,
        handlers::{Repository, Tenants, Usage, Users, tenants::TenantFilter},
        models::{
            tenants::{TenantCreateDBRequest, TenantDBResponse, TenantUpdateDBRequest},
            users::UserCreateDBRequest,
        },
    },
    errors::{Error, ErrorEnvelope},
    pipeline::AdminContext,
    types::TenantId,
};

fn tenant_not_found(id: TenantId) -> Error {
    Error::NotFound {
        resource: "Tenant".to_string(),
        id: id.to_string(),
    }
}

fn require_known_plan(config: &Config, plan: &str) -> Result<(), Error> {
    if config.quotas.plans.contains_key(plan) {
        Ok(())
    } else {
        Err(Error::BadRequest {
            message: format!("Unknown plan '{plan}'"),
        })
    }
}

fn require_object(settings: &serde_json::Value) -> Result<(), Error> {
    if settings.is_object() {
        Ok(())
    } else {
        Err(Error::BadRequest {
            message: "Tenant settings must be a JSON object".to_string(),
        })
    }
}

async fn load_tenant(admin: &AdminContext, id: TenantId) -> Result<TenantDBResponse, Error> {
    let mut conn = admin.connection.lease().await?;
    Tenants::new(&mut conn).get_by_id(id).await?.ok_or_else(|| tenant_not_found(id))
}

/// List tenants
#[utoipa::path(
    get,
    path = "/admin/api/v1/tenants",
    tag = "platform-admin",
    params(ListTenantsQuery),
    responses(
        (status = 200, description = "Tenants", body = Vec<TenantResponse>),
        (status = 403, description = "Missing admin secret or admin role", body = ErrorEnvelope),
    ),
    security(("bearer" = [], "platform_admin_secret" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_tenants(admin: AdminContext, Query(query): Query<ListTenantsQuery>) -> Result<Json<Vec<TenantResponse>>, Error> {
    let (skip, limit) = query.pagination.params();
    let mut filter = TenantFilter::new(skip, limit);
    if let Some(status) = query.status {
        filter = filter.with_status(status);
    }

    let mut conn = admin.connection.lease().await?;
    let tenants = Tenants::new(&mut conn).list(&filter).await?;

    Ok(Json(tenants.into_iter().map(Into::into).collect()))
}

/// Get a tenant
#[utoipa::path(
    get,
    path = "/admin/api/v1/tenants/{id}",
    tag = "platform-admin",
    params(("id" = String, Path, description = "Tenant ID")),
    responses(
        (status = 200, description = "Tenant", body = TenantResponse),
        (status = 404, description = "Tenant not found", body = ErrorEnvelope),
    ),
    security(("bearer" = [], "platform_admin_secret" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_tenant(admin: AdminContext, Path(id): Path<TenantId>) -> Result<Json<TenantResponse>, Error> {
    Ok(Json(load_tenant(&admin, id).await?.into()))
}

/// Create a tenant
#[utoipa::path(
    post,
    path = "/admin/api/v1/tenants",
    tag = "platform-admin",
    request_body = TenantCreate,
    responses(
        (status = 201, description = "Tenant created", body = TenantResponse),
        (status = 400, description = "Unknown plan or invalid settings", body = ErrorEnvelope),
    ),
    security(("bearer" = [], "platform_admin_secret" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_tenant(
    State(state): State<AppState>,
    admin: AdminContext,
    Json(request): Json<TenantCreate>,
) -> Result<(StatusCode, Json<TenantResponse>), Error> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::BadRequest {
            message: "Tenant name must not be empty".to_string(),
        });
    }
    let plan = request.plan.unwrap_or_else(|| state.config.quotas.default_plan.clone());
    require_known_plan(&state.config, &plan)?;
    let settings = request.settings.unwrap_or_else(|| serde_json::json!({}));
    require_object(&settings)?;

    let mut conn = admin.connection.lease().await?;
    let tenant = Tenants::new(&mut conn)
        .create(&TenantCreateDBRequest { name, plan, settings })
        .await?;

    Ok((StatusCode::CREATED, Json(tenant.into())))
}

/// Update a tenant's name, status, plan or settings
#[utoipa::path(
    patch,
    path = "/admin/api/v1/tenants/{id}",
    tag = "platform-admin",
    params(("id" = String, Path, description = "Tenant ID")),
    request_body = TenantUpdate,
    responses(
        (status = 200, description = "Updated tenant", body = TenantResponse),
        (status = 400, description = "Unknown plan or invalid settings", body = ErrorEnvelope),
        (status = 404, description = "Tenant not found", body = ErrorEnvelope),
    ),
    security(("bearer" = [], "platform_admin_secret" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_tenant(
    State(state): State<AppState>,
    admin: AdminContext,
    Path(id): Path<TenantId>,
    Json(request): Json<TenantUpdate>,
) -> Result<Json<TenantResponse>, Error> {
    if let Some(plan) = &request.plan {
        require_known_plan(&state.config, plan)?;
    }
    if let Some(settings) = &request.settings {
        require_object(settings)?;
    }

    let mut conn = admin.connection.lease().await?;
    let update = TenantUpdateDBRequest {
        name: request.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        status: request.status,
        plan: request.plan,
        settings: request.settings,
    };
    let tenant = Tenants::new(&mut conn).update(id, &update).await.map_err(|e| match e {
        DbError::NotFound => tenant_not_found(id),
        e => e.into(),
    })?;

    Ok(Json(tenant.into()))
}

/// Monthly usage of any tenant
#[utoipa::path(
    get,
    path = "/admin/api/v1/tenants/{id}/usage",
    tag = "platform-admin",
    params(("id" = String, Path, description = "Tenant ID")),
    responses(
        (status = 200, description = "Usage history, newest first", body = Vec<UsagePeriodResponse>),
        (status = 404, description = "Tenant not found", body = ErrorEnvelope),
    ),
    security(("bearer" = [], "platform_admin_secret" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_tenant_usage(admin: AdminContext, Path(id): Path<TenantId>) -> Result<Json<Vec<UsagePeriodResponse>>, Error> {
    load_tenant(&admin, id).await?;

    let mut conn = admin.connection.lease().await?;
    let history = Usage::new(&mut conn).admin_history(id).await?;

    Ok(Json(history.into_iter().map(Into::into).collect()))
}

/// Provision a user into a tenant
#[utoipa::path(
    post,
    path = "/admin/api/v1/tenants/{id}/users",
    tag = "platform-admin",
    params(("id" = String, Path, description = "Tenant ID")),
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid email or password", body = ErrorEnvelope),
        (status = 404, description = "Tenant not found", body = ErrorEnvelope),
        (status = 409, description = "Email already registered", body = ErrorEnvelope),
    ),
    security(("bearer" = [], "platform_admin_secret" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_tenant_user(
    State(state): State<AppState>,
    admin: AdminContext,
    Path(id): Path<TenantId>,
    Json(request): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>), Error> {
    let email = request.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(Error::BadRequest {
            message: "A valid email address is required".to_string(),
        });
    }
    let password_config = &state.config.auth.password;
    if request.password.len() < password_config.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", password_config.min_length),
        });
    }
    if request.password.len() > password_config.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", password_config.max_length),
        });
    }

    load_tenant(&admin, id).await?;
    let password_hash = password::hash_password(request.password, Some(password_config.argon2_params())).await?;

    let mut conn = admin.connection.lease().await?;
    let user = Users::new(&mut conn)
        .admin_create(&UserCreateDBRequest {
            tenant_id: id,
            email,
            password_hash: Some(password_hash),
            role: request.role,
            email_verified: request.email_verified,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

#[cfg(test)]
mod tests {
    use crate::api::models::{
        tenants::TenantResponse,
        usage::UsagePeriodResponse,
        users::UserResponse,
    };
    use crate::auth::identity::Role;
    use crate::db::models::tenants::TenantStatus;
    use crate::quota::{Counter, PeriodKey};
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use sqlx::PgPool;

    struct Admin {
        server: TestServer,
        headers: Vec<(String, String)>,
    }

    impl Admin {
        async fn new(pool: PgPool) -> Self {
            let home = create_tenant(&pool, "enterprise").await;
            let admin = create_user(&pool, home.id, Role::Admin).await;
            let server = create_test_app(pool).await;
            Self {
                server,
                headers: admin_headers(&admin),
            }
        }

        fn get(&self, path: &str) -> axum_test::TestRequest {
            self.headers
                .iter()
                .fold(self.server.get(path), |req, (name, value)| req.add_header(name, value))
        }

        fn post(&self, path: &str) -> axum_test::TestRequest {
            self.headers
                .iter()
                .fold(self.server.post(path), |req, (name, value)| req.add_header(name, value))
        }

        fn patch(&self, path: &str) -> axum_test::TestRequest {
            self.headers
                .iter()
                .fold(self.server.patch(path), |req, (name, value)| req.add_header(name, value))
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_list_and_update_tenants(pool: PgPool) {
        let admin = Admin::new(pool).await;

        let response = admin.post("/admin/api/v1/tenants").json(&json!({"name": "Acme SEO"})).await;
        response.assert_status(StatusCode::CREATED);
        let created: TenantResponse = response.json();
        assert_eq!(created.plan, "starter");
        assert_eq!(created.status, TenantStatus::Active);

        admin
            .post("/admin/api/v1/tenants")
            .json(&json!({"name": "Bad plan", "plan": "platinum"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let response = admin
            .patch(&format!("/admin/api/v1/tenants/{}", created.id))
            .json(&json!({"status": "suspended", "plan": "agency"}))
            .await;
        response.assert_status_ok();
        let updated: TenantResponse = response.json();
        assert_eq!(updated.status, TenantStatus::Suspended);
        assert_eq!(updated.plan, "agency");
        assert_eq!(updated.name, "Acme SEO");

        let suspended: Vec<TenantResponse> = admin.get("/admin/api/v1/tenants?status=suspended").await.json();
        assert_eq!(suspended.len(), 1);
        assert_eq!(suspended[0].id, created.id);

        let all: Vec<TenantResponse> = admin.get("/admin/api/v1/tenants?limit=10").await.json();
        assert_eq!(all.len(), 2);

        admin
            .get(&format!("/admin/api/v1/tenants/{}", uuid::Uuid::new_v4()))
            .await
            .assert_status_not_found();
        admin
            .patch(&format!("/admin/api/v1/tenants/{}", uuid::Uuid::new_v4()))
            .json(&json!({"status": "active"}))
            .await
            .assert_status_not_found();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_reads_usage_across_tenants(pool: PgPool) {
        let other = create_tenant(&pool, "starter").await;
        seed_usage(&pool, other.id, PeriodKey::from_ym(2024, 1).unwrap(), Counter::CrawlJobs, 3).await;
        seed_usage(&pool, other.id, PeriodKey::from_ym(2024, 2).unwrap(), Counter::CrawlJobs, 5).await;
        let admin = Admin::new(pool).await;

        let response = admin.get(&format!("/admin/api/v1/tenants/{}/usage", other.id)).await;
        response.assert_status_ok();
        let history: Vec<UsagePeriodResponse> = response.json();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].period.to_string(), "2024-02");
        assert_eq!(history[0].crawl_jobs, 5);
        assert_eq!(history[1].crawl_jobs, 3);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_provision_user_then_log_in(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let admin = Admin::new(pool).await;

        let response = admin
            .post(&format!("/admin/api/v1/tenants/{}/users", tenant.id))
            .json(&json!({"email": "New.Analyst@Example.com", "password": "correct horse battery", "role": "analyst"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let user: UserResponse = response.json();
        assert_eq!(user.email, "new.analyst@example.com");
        assert_eq!(user.tenant_id, tenant.id);
        assert!(!user.email_verified);

        // Duplicate email
        admin
            .post(&format!("/admin/api/v1/tenants/{}/users", tenant.id))
            .json(&json!({"email": "new.analyst@example.com", "password": "correct horse battery", "role": "analyst"}))
            .await
            .assert_status(StatusCode::CONFLICT);

        admin
            .post(&format!("/admin/api/v1/tenants/{}/users", tenant.id))
            .json(&json!({"email": "short@example.com", "password": "short", "role": "analyst"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        admin
            .server
            .post("/authentication/login")
            .json(&json!({"email": "new.analyst@example.com", "password": "correct horse battery"}))
            .await
            .assert_status_ok();
    }
}
