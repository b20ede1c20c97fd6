//! Test fixtures.
//!
//! `#[sqlx::test]` hands tests a pool that logs in as the database owner, which bypasses
//! row-level security. Fixtures seed through that pool; anything that has to observe isolation
//! (the test app included) runs on [`app_pool`], whose connections switch to `rankgate_app`.

use axum_test::TestServer;
use sqlx::{PgConnection, PgPool};

use crate::auth::{
    identity::{CallerIdentity, Role},
    password::{self, Argon2Params},
    tokens::{self, Claims, CredentialKind},
};
use crate::config::{Config, CredentialConfig, Environment, PoolSettings};
use crate::db::{
    handlers::{Repository, Tenants, Users},
    models::{
        tenants::{TenantCreateDBRequest, TenantDBResponse},
        users::{UserCreateDBRequest, UserDBResponse},
    },
};
use crate::quota::{Counter, PeriodKey};
use crate::types::TenantId;

/// Password of every user created by [`create_user`]
pub const TEST_PASSWORD: &str = "correct horse battery staple";

const CHEAP_ARGON2: Argon2Params = Argon2Params {
    memory_kib: 64,
    iterations: 1,
    parallelism: 1,
};

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.environment = Environment::Development;
    config.enable_metrics = false;
    config.database.pool = PoolSettings {
        max_connections: 4,
        min_connections: 0,
        acquire_timeout_secs: 5,
        ..Default::default()
    };
    config.auth.access = CredentialConfig {
        secret: Some("test-access-secret-0123456789abcdef".to_string()),
        expiry: None,
    };
    config.auth.refresh = CredentialConfig {
        secret: Some("test-refresh-secret-0123456789abcdef".to_string()),
        expiry: None,
    };
    config.auth.platform_admin.secret = Some("test-platform-admin-secret".to_string());
    config.auth.password.argon2_memory_kib = CHEAP_ARGON2.memory_kib;
    config.auth.password.argon2_iterations = CHEAP_ARGON2.iterations;
    config.auth.password.argon2_parallelism = CHEAP_ARGON2.parallelism;
    config
}

/// A row-secured pool on the same test database, running as `rankgate_app`.
pub async fn app_pool(pool: &PgPool) -> PgPool {
    let settings = PoolSettings {
        max_connections: 1,
        min_connections: 0,
        ..Default::default()
    };
    crate::db::pools::connect((*pool.connect_options()).clone(), &settings, Some("rankgate_app"))
        .await
        .expect("Failed to connect row-secured pool")
}

pub async fn create_test_app(pool: PgPool) -> TestServer {
    create_test_app_with_config(pool, create_test_config()).await
}

/// Test app with a custom config, on a row-secured pool sized by `config.database.pool`.
pub async fn create_test_app_with_config(pool: PgPool, config: Config) -> TestServer {
    let app_pool = crate::db::pools::connect(
        (*pool.connect_options()).clone(),
        &config.database.pool,
        config.database.session_role.as_deref(),
    )
    .await
    .expect("Failed to connect row-secured pool");
    create_test_app_with_pool(app_pool, config).await
}

/// Test app on a pool the caller built (and may be holding connections of).
pub async fn create_test_app_with_pool(app_pool: PgPool, config: Config) -> TestServer {
    crate::Application::new_with_pool(config, app_pool)
        .expect("Failed to create application")
        .into_test_server()
}

pub async fn create_tenant(pool: &PgPool, plan: &str) -> TenantDBResponse {
    create_tenant_with_settings(pool, plan, serde_json::json!({})).await
}

pub async fn create_tenant_with_settings(pool: &PgPool, plan: &str, settings: serde_json::Value) -> TenantDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Tenants::new(&mut conn)
        .create(&TenantCreateDBRequest {
            name: format!("Tenant {}", &uuid::Uuid::new_v4().to_string()[..8]),
            plan: plan.to_string(),
            settings,
        })
        .await
        .expect("Failed to create tenant")
}

async fn insert_user(pool: &PgPool, tenant_id: TenantId, role: Role, email_verified: bool) -> UserDBResponse {
    let password_hash = password::hash_password(TEST_PASSWORD.to_string(), Some(CHEAP_ARGON2))
        .await
        .expect("Failed to hash password");
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .admin_create(&UserCreateDBRequest {
            tenant_id,
            email: format!("{}-{}@example.com", role.as_str(), uuid::Uuid::new_v4()),
            password_hash: Some(password_hash),
            role,
            email_verified,
        })
        .await
        .expect("Failed to create user")
}

/// A verified user with password [`TEST_PASSWORD`].
pub async fn create_user(pool: &PgPool, tenant_id: TenantId, role: Role) -> UserDBResponse {
    insert_user(pool, tenant_id, role, true).await
}

pub async fn create_unverified_user(pool: &PgPool, tenant_id: TenantId) -> UserDBResponse {
    insert_user(pool, tenant_id, Role::Analyst, false).await
}

/// Bind a raw connection to `tenant_id` the way the pipeline does.
pub async fn bind_session(conn: &mut PgConnection, tenant_id: TenantId) {
    sqlx::query("SELECT set_config('app.tenant_id', $1, false)")
        .bind(tenant_id.to_string())
        .execute(conn)
        .await
        .expect("Failed to bind session");
}

/// Set one monthly counter directly, bypassing the bounds.
pub async fn seed_usage(pool: &PgPool, tenant_id: TenantId, period: PeriodKey, counter: Counter, value: u64) {
    let column = counter.column();
    let query = format!(
        "INSERT INTO usage_counters (tenant_id, period, {column}) VALUES ($1, $2, $3) \
         ON CONFLICT (tenant_id, period) DO UPDATE SET {column} = EXCLUDED.{column}"
    );
    sqlx::query(&query)
        .bind(tenant_id)
        .bind(period.to_string())
        .bind(value as i64)
        .execute(pool)
        .await
        .expect("Failed to seed usage");
}

fn issue(user: &UserDBResponse, kind: CredentialKind) -> String {
    let config = create_test_config();
    let (secret, ttl) = match kind {
        CredentialKind::Access => (config.auth.access.secret.clone(), config.auth.access_expiry()),
        CredentialKind::Refresh => (config.auth.refresh.secret.clone(), config.auth.refresh_expiry()),
    };
    tokens::issue(&CallerIdentity::from(user), kind, &secret.expect("secret"), ttl).expect("Failed to issue token")
}

pub fn access_token(user: &UserDBResponse) -> String {
    issue(user, CredentialKind::Access)
}

pub fn refresh_token(user: &UserDBResponse) -> String {
    issue(user, CredentialKind::Refresh)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// A correctly signed access token carrying an arbitrary role string, for a user that need not exist.
pub fn token_with_role(tenant_id: TenantId, role: &str) -> String {
    let config = create_test_config();
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: uuid::Uuid::new_v4(),
        email: "ghost@example.com".to_string(),
        tenant_id,
        role: role.to_string(),
        email_verified: true,
        typ: CredentialKind::Access,
        exp: now + 600,
        iat: now,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(config.auth.access.secret.expect("secret").as_bytes()),
    )
    .expect("Failed to encode token")
}

/// Headers for a platform-admin request on behalf of `admin`.
pub fn admin_headers(admin: &UserDBResponse) -> Vec<(String, String)> {
    let config = create_test_config();
    vec![
        ("authorization".to_string(), bearer(&access_token(admin))),
        (
            config.auth.platform_admin.header,
            config.auth.platform_admin.secret.expect("secret"),
        ),
    ]
}
