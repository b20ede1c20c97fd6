//! The admission middleware.
//!
//! Wraps the whole router, so it runs before path matching: a path no route serves still goes
//! through admission and is refused with 401 rather than leaking a 404 to anonymous callers.
//!
//! Tenant routes:
//!
//! ```text
//! checkout ─► verify access credential ─► email check ─► tenant gate ─► bind ─► admit API call ─► handler ─► release
//! ```
//!
//! Platform-admin routes:
//!
//! ```text
//! checkout ─► shared secret ─► verify access credential ─► admin role ─► handler ─► release
//! ```
//!
//! Any failure returns early; dropping the [`ConnectionGuard`] releases the connection.

use axum::{
    extract::{Request, State},
    http::{Method, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::{debug, field, instrument, trace};

use crate::AppState;
use crate::audit;
use crate::auth::{
    identity::{CallerIdentity, Role},
    tokens::{self, CredentialKind},
};
use crate::errors::{Error, Result};
use crate::quota::{self, Counter, QuotaPolicy};
use crate::types::abbrev_uuid;

use super::{
    binder::bind,
    context::{AdminContext, TenantContext},
    gate::check_tenant_active,
    guard::ConnectionGuard,
};

/// Which admission path a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// No credential, no connection: health, docs, metrics and the pre-auth token routes.
    Public,
    /// Cross-tenant routes under `/admin/api/v1`.
    PlatformAdmin,
    /// Everything else.
    Tenant,
}

impl RouteClass {
    pub fn classify(path: &str) -> Self {
        fn under(path: &str, prefix: &str) -> bool {
            path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
        }

        if path == "/healthz" || under(path, "/docs") || under(path, "/api-docs") || under(path, "/authentication") || path == "/internal/metrics" {
            RouteClass::Public
        } else if under(path, "/admin/api/v1") {
            RouteClass::PlatformAdmin
        } else {
            RouteClass::Tenant
        }
    }
}

/// Stages of admission, logged when the request leaves the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unauthenticated,
    Authenticated,
    TenantGated,
    TenantBound,
    QuotaCleared,
    AdminSecretChecked,
    AdminRoleChecked,
    Handling,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Unauthenticated => "unauthenticated",
            Phase::Authenticated => "authenticated",
            Phase::TenantGated => "tenant_gated",
            Phase::TenantBound => "tenant_bound",
            Phase::QuotaCleared => "quota_cleared",
            Phase::AdminSecretChecked => "admin_secret_checked",
            Phase::AdminRoleChecked => "admin_role_checked",
            Phase::Handling => "handling",
        }
    }
}

/// Axum middleware entry point; install with `from_fn_with_state` around the router.
pub async fn admission(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    // CORS preflights carry no credentials and are answered by the CORS layer
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    match RouteClass::classify(request.uri().path()) {
        RouteClass::Public => Ok(next.run(request).await),
        RouteClass::PlatformAdmin => admit_platform_admin(&state, request, next).await,
        RouteClass::Tenant => admit_tenant(&state, request, next).await,
    }
}

fn outcome(phase: Phase) {
    let outcome = if phase == Phase::Handling { "handled" } else { "rejected" };
    counter!("rankgate_pipeline_requests_total", "outcome" => outcome, "phase" => phase.as_str()).increment(1);
    debug!(phase = phase.as_str(), "Released request");
}

fn authorization(request: &Request) -> Option<&str> {
    request.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok())
}

fn access_secret(state: &AppState) -> Result<&str> {
    state.config.auth.access.secret.as_deref().ok_or_else(|| Error::Internal {
        operation: "verify credential: access secret not configured".to_string(),
    })
}

fn require_verified(state: &AppState, identity: &CallerIdentity) -> Result<()> {
    if state.config.require_verified_email() && !identity.email_verified {
        return Err(Error::Forbidden {
            reason: "Email address must be verified".to_string(),
        });
    }
    Ok(())
}

#[instrument(skip_all, fields(path = %request.uri().path(), tenant_id, user_id))]
async fn admit_tenant(state: &AppState, mut request: Request, next: Next) -> Result<Response> {
    let (guard, conn) = ConnectionGuard::checkout(&state.db).await?;
    let mut phase = scopeguard::guard(Phase::Unauthenticated, outcome);

    let identity = tokens::verify(authorization(&request), access_secret(state)?, CredentialKind::Access)?;
    let span = tracing::Span::current();
    span.record("tenant_id", field::display(abbrev_uuid(&identity.tenant_id)));
    span.record("user_id", field::display(abbrev_uuid(&identity.user_id)));
    *phase = Phase::Authenticated;
    trace!(role = %identity.role, "Authenticated");

    require_verified(state, &identity)?;

    let tenant = check_tenant_active(&conn, identity.tenant_id).await?;
    *phase = Phase::TenantGated;

    let connection = bind(conn, &identity).await?;
    *phase = Phase::TenantBound;

    let policy = QuotaPolicy::resolve(&tenant.plan, &tenant.settings, &state.config.quotas);
    let admission = {
        let mut lease = connection.lease().await?;
        match quota::admit(&mut lease, tenant.id, Counter::ApiCalls, 1, policy.monthly_limit(Counter::ApiCalls)).await {
            Ok(admission) => admission,
            Err(e) => return Err(audit::reject(&mut lease, &identity, e).await),
        }
    };
    *phase = Phase::QuotaCleared;
    trace!(?admission, "API call admitted");

    request.extensions_mut().insert(TenantContext {
        identity,
        tenant,
        policy,
        admission,
        connection,
    });

    *phase = Phase::Handling;
    let response = next.run(request).await;
    guard.release();

    Ok(response)
}

#[instrument(skip_all, fields(path = %request.uri().path(), user_id))]
async fn admit_platform_admin(state: &AppState, mut request: Request, next: Next) -> Result<Response> {
    let (guard, conn) = ConnectionGuard::checkout(&state.db).await?;
    let mut phase = scopeguard::guard(Phase::Unauthenticated, outcome);

    let admin = &state.config.auth.platform_admin;
    let presented = request.headers().get(admin.header.as_str()).map(|value| value.as_bytes());
    let secret_ok = match (admin.secret.as_deref(), presented) {
        (Some(expected), Some(presented)) => constant_time_eq(expected.as_bytes(), presented),
        _ => false,
    };
    if !secret_ok {
        return Err(Error::Forbidden {
            reason: "Platform admin secret missing or invalid".to_string(),
        });
    }
    *phase = Phase::AdminSecretChecked;

    let identity = tokens::verify(authorization(&request), access_secret(state)?, CredentialKind::Access)?;
    tracing::Span::current().record("user_id", field::display(abbrev_uuid(&identity.user_id)));
    require_verified(state, &identity)?;
    if identity.role != Role::Admin {
        return Err(Error::Forbidden {
            reason: "Platform admin routes require the admin role".to_string(),
        });
    }
    *phase = Phase::AdminRoleChecked;

    request.extensions_mut().insert(AdminContext {
        identity,
        connection: conn.into_platform(),
    });

    *phase = Phase::Handling;
    let response = next.run(request).await;
    guard.release();

    Ok(response)
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::{Repository, Tenants};
    use crate::db::models::tenants::{TenantStatus, TenantUpdateDBRequest};
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use serde_json::Value;
    use sqlx::PgPool;

    #[test]
    fn test_classify() {
        assert_eq!(RouteClass::classify("/healthz"), RouteClass::Public);
        assert_eq!(RouteClass::classify("/docs"), RouteClass::Public);
        assert_eq!(RouteClass::classify("/docs/"), RouteClass::Public);
        assert_eq!(RouteClass::classify("/api-docs/openapi.json"), RouteClass::Public);
        assert_eq!(RouteClass::classify("/authentication/login"), RouteClass::Public);
        assert_eq!(RouteClass::classify("/internal/metrics"), RouteClass::Public);

        assert_eq!(RouteClass::classify("/admin/api/v1/tenants"), RouteClass::PlatformAdmin);
        assert_eq!(RouteClass::classify("/admin/api/v1"), RouteClass::PlatformAdmin);

        assert_eq!(RouteClass::classify("/api/v1/keywords"), RouteClass::Tenant);
        assert_eq!(RouteClass::classify("/"), RouteClass::Tenant);
        // Prefixes only match on a segment boundary
        assert_eq!(RouteClass::classify("/docsx"), RouteClass::Tenant);
        assert_eq!(RouteClass::classify("/healthz/extra"), RouteClass::Tenant);
        assert_eq!(RouteClass::classify("/authenticationx/login"), RouteClass::Tenant);
        assert_eq!(RouteClass::classify("/admin/api/v10/tenants"), RouteClass::Tenant);
        assert_eq!(RouteClass::classify("/internal/other"), RouteClass::Tenant);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret-longer"));
        assert!(!constant_time_eq(b"", b"x"));
    }

    async fn set_status(pool: &PgPool, id: uuid::Uuid, status: TenantStatus) {
        let mut conn = pool.acquire().await.unwrap();
        Tenants::new(&mut conn)
            .update(
                id,
                &TenantUpdateDBRequest {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_public_routes_need_no_credential(pool: PgPool) {
        let server = create_test_app(pool).await;

        let response = server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_text("OK");

        server.get("/api-docs/openapi.json").await.assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unknown_paths_fail_closed(pool: PgPool) {
        let server = create_test_app(pool).await;

        let response = server.get("/api/v1/does-not-exist").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "unauthenticated");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_and_invalid_credentials(pool: PgPool) {
        let server = create_test_app(pool).await;

        server.get("/api/v1/me").await.assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/api/v1/me")
            .add_header("authorization", "Bearer not-a-token")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/api/v1/me")
            .add_header("authorization", "Basic dXNlcjpwYXNz")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refresh_credential_is_not_an_access_credential(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let user = create_user(&pool, tenant.id, Role::Analyst).await;
        let server = create_test_app(pool).await;

        server
            .get("/api/v1/me")
            .add_header("authorization", bearer(&refresh_token(&user)))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        server
            .get("/api/v1/me")
            .add_header("authorization", bearer(&access_token(&user)))
            .await
            .assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_malformed_role_never_reaches_the_gate(pool: PgPool) {
        // A tenant id nobody owns: reaching the gate would answer 404
        let token = token_with_role(uuid::Uuid::new_v4(), "superuser");
        let server = create_test_app(pool).await;

        let response = server.get("/api/v1/me").add_header("authorization", bearer(&token)).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_inactive_tenant_is_refused_for_every_role(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let admin = create_user(&pool, tenant.id, Role::Admin).await;
        let analyst = create_user(&pool, tenant.id, Role::Analyst).await;
        set_status(&pool, tenant.id, TenantStatus::Disabled).await;
        let server = create_test_app(pool.clone()).await;

        for user in [&admin, &analyst] {
            let response = server
                .get("/api/v1/usage")
                .add_header("authorization", bearer(&access_token(user)))
                .await;
            response.assert_status(StatusCode::FORBIDDEN);
            let body: Value = response.json();
            assert_eq!(body["error"]["code"], "forbidden");
        }

        // Rejected before the API-call admission wrote anything
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_counters WHERE tenant_id = $1")
            .bind(tenant.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_deleted_tenant_is_not_found(pool: PgPool) {
        let token = token_with_role(uuid::Uuid::new_v4(), "analyst");
        let server = create_test_app(pool).await;

        let response = server.get("/api/v1/me").add_header("authorization", bearer(&token)).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unverified_email_is_refused_in_production(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let user = create_unverified_user(&pool, tenant.id).await;

        let mut config = create_test_config();
        config.environment = crate::config::Environment::Production;
        let production = create_test_app_with_config(pool.clone(), config).await;
        production
            .get("/api/v1/me")
            .add_header("authorization", bearer(&access_token(&user)))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let development = create_test_app(pool).await;
        development
            .get("/api/v1/me")
            .add_header("authorization", bearer(&access_token(&user)))
            .await
            .assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_api_call_quota_rejection(pool: PgPool) {
        let tenant = create_tenant_with_settings(&pool, "starter", serde_json::json!({"quotas": {"api_calls_per_month": 2}})).await;
        let user = create_user(&pool, tenant.id, Role::Analyst).await;
        let server = create_test_app(pool.clone()).await;
        let auth = bearer(&access_token(&user));

        server.get("/api/v1/me").add_header("authorization", auth.clone()).await.assert_status_ok();
        server.get("/api/v1/me").add_header("authorization", auth.clone()).await.assert_status_ok();

        let response = server.get("/api/v1/me").add_header("authorization", auth).await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "quota_exceeded");
        assert_eq!(body["quota"]["kind"], "api_calls");
        assert_eq!(body["quota"]["period"], crate::quota::PeriodKey::current().to_string());
        assert_eq!(body["quota"]["limit"], 2);
        assert_eq!(body["quota"]["current"], 2);
        assert_eq!(body["quota"]["requested"], 1);

        // The rejection was recorded for the tenant
        let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quota_events WHERE tenant_id = $1 AND resource = 'api_calls'")
            .bind(tenant.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(events, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_exhausted_pool_is_service_unavailable(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let user = create_user(&pool, tenant.id, Role::Analyst).await;

        let mut config = create_test_config();
        config.database.pool.max_connections = 1;
        config.database.pool.min_connections = 0;
        config.database.pool.acquire_timeout_secs = 1;
        let app_pool = crate::db::pools::connect((*pool.connect_options()).clone(), &config.database.pool, Some("rankgate_app"))
            .await
            .unwrap();

        let _held = app_pool.acquire().await.unwrap();
        let server = create_test_app_with_pool(app_pool, config).await;

        let response = server
            .get("/api/v1/me")
            .add_header("authorization", bearer(&access_token(&user)))
            .await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "service_unavailable");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_every_outcome_returns_the_connection(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let user = create_user(&pool, tenant.id, Role::Analyst).await;

        let mut config = create_test_config();
        config.database.pool.max_connections = 1;
        config.database.pool.min_connections = 0;
        config.database.pool.acquire_timeout_secs = 2;
        let app_pool = crate::db::pools::connect((*pool.connect_options()).clone(), &config.database.pool, Some("rankgate_app"))
            .await
            .unwrap();
        let server = create_test_app_with_pool(app_pool, config).await;
        let auth = bearer(&access_token(&user));

        // With a single connection, any leak turns the next request into a 503
        for _ in 0..3 {
            server.get("/api/v1/me").await.assert_status(StatusCode::UNAUTHORIZED);
            server.get("/api/v1/nowhere").add_header("authorization", auth.clone()).await.assert_status_not_found();
            server
                .post("/api/v1/keywords")
                .add_header("authorization", auth.clone())
                .json(&serde_json::json!({"keywords": []}))
                .await
                .assert_status_bad_request();
            server.get("/api/v1/me").add_header("authorization", auth.clone()).await.assert_status_ok();
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_platform_admin_requires_secret_and_role(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let admin = create_user(&pool, tenant.id, Role::Admin).await;
        let manager = create_user(&pool, tenant.id, Role::Manager).await;
        let config = create_test_config();
        let header = config.auth.platform_admin.header.clone();
        let secret = config.auth.platform_admin.secret.clone().unwrap();
        let server = create_test_app(pool).await;

        // Credential alone is not enough
        server
            .get("/admin/api/v1/tenants")
            .add_header("authorization", bearer(&access_token(&admin)))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        // Wrong secret
        server
            .get("/admin/api/v1/tenants")
            .add_header("authorization", bearer(&access_token(&admin)))
            .add_header(header.clone(), "not-the-secret")
            .await
            .assert_status(StatusCode::FORBIDDEN);

        // Secret without a credential
        server
            .get("/admin/api/v1/tenants")
            .add_header(header.clone(), secret.clone())
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        // Secret with a non-admin caller
        server
            .get("/admin/api/v1/tenants")
            .add_header("authorization", bearer(&access_token(&manager)))
            .add_header(header.clone(), secret.clone())
            .await
            .assert_status(StatusCode::FORBIDDEN);

        server
            .get("/admin/api/v1/tenants")
            .add_header("authorization", bearer(&access_token(&admin)))
            .add_header(header, secret)
            .await
            .assert_status_ok();
    }
}
