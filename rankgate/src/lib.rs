//! # rankgate: tenant-isolated request admission
//!
//! `rankgate` is the backend of a multi-tenant SEO workspace. Agencies and in-house teams track
//! keywords and submit SERP and crawl jobs; each organisation is a *tenant*, the unit of billing
//! and of data isolation.
//!
//! ## Overview
//!
//! Every tenant request passes the same admission pipeline before any handler runs, and the
//! pipeline's last step is what makes isolation hold: the database connection the handler
//! receives is bound to the caller's tenant, and PostgreSQL row-level security refuses to show
//! or accept rows of any other tenant on that connection. Handlers never filter by tenant
//! themselves, and a handler bug cannot widen what a connection can see.
//!
//! ### Request Flow
//!
//! ```text
//!            ┌─────────────────────────── admission (pipeline::middleware) ───────────────────────────┐
//! request ──►│ checkout ─► verify credential ─► tenant active? ─► bind tenant ─► admit API call       │──► handler ──► release
//!            └────────────────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Checkout** ([`pipeline::ConnectionGuard`]): one pooled connection per request, returned to
//!   the pool exactly once however the request ends, including cancellation.
//! - **Credential** ([`auth::tokens`]): HS256 access token carrying user, tenant, role and
//!   email-verified flag. Refresh tokens are refused.
//! - **Tenant gate** ([`pipeline::gate`]): suspended and disabled tenants are refused with 403
//!   before anything is metered.
//! - **Binding** ([`pipeline::binder`]): sets `app.tenant_id` on the connection; the row-security
//!   policies key on it.
//! - **Quota** ([`quota`]): the request is counted against the tenant's monthly API-call bound
//!   with a single conditional upsert. Job submission and keyword import meter their own
//!   resources the same way inside the handler.
//!
//! Platform-admin routes under `/admin/api/v1` take a separate path: a shared secret header plus
//! an admin's access credential, and an unbound connection.
//!
//! ### Core Components
//!
//! - [`api`]: HTTP handlers and wire models
//! - [`pipeline`]: The admission middleware and the connection lifecycle types it hands out
//! - [`auth`]: Credentials, identities and password hashing
//! - [`quota`]: Plans, policies, accounting periods and the atomic admission engine
//! - [`db`]: Repositories, models, and the pool with its session-role and reset hooks
//! - [`audit`]: Best-effort record of quota rejections
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use rankgate::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = rankgate::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     rankgate::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Database Setup
//!
//! Migrations run on startup as the login role. They create the `rankgate_app` role that pooled
//! connections switch to, so the login role must be allowed to create roles (or the role must
//! already exist and be granted to it).
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! rankgate::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod openapi;
pub mod pipeline;
pub mod quota;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::time::Duration;

use axum::{
    Json, Router,
    http::{self, HeaderValue},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api::handlers::{auth as auth_handlers, jobs, keywords, me, tenants, usage, users};
use crate::config::CorsOrigin;
use crate::db::pools::{self, LabeledPool, PoolMetricsConfig};
use crate::openapi::ApiDoc;

pub use config::Config;
pub use types::{JobId, KeywordId, TenantId, UserId};

/// Application state shared across all request handlers.
///
/// `db` is the row-secured pool: every connection runs as the session role and starts unbound.
/// Handlers do not use it directly; the admission middleware checks a connection out per request
/// and hands the handler a tenant-bound or platform handle to it.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder().db(pool).config(config).build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
}

/// Get the rankgate database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origins = &config.auth.cors.allowed_origins;
    let allow_origin = if origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut values = Vec::with_capacity(origins.len());
        for origin in origins {
            if let CorsOrigin::Url(url) = origin {
                values.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(values)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::PATCH])
        .allow_headers([
            http::header::AUTHORIZATION,
            http::header::CONTENT_TYPE,
            config.auth.platform_admin.header.parse::<http::HeaderName>()?,
        ])
        .allow_credentials(config.auth.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.auth.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: every route, the API reference and optional Prometheus metrics.
///
/// The admission middleware is not part of the returned router; [`admitted`] wraps it around the
/// whole router so it runs before path matching.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route("/authentication/login", post(auth_handlers::login))
        .route("/authentication/refresh", post(auth_handlers::refresh));

    let tenant_routes = Router::new()
        .route("/me", get(me::get_me))
        .route("/usage", get(usage::get_usage))
        .route("/usage/history", get(usage::get_usage_history))
        .route("/usage/rejections", get(usage::list_quota_rejections))
        .route("/keywords", get(keywords::list_keywords).post(keywords::import_keywords))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/crawl", post(jobs::submit_crawl_job))
        .route("/jobs/serp", post(jobs::submit_serp_job))
        .route("/users", get(users::list_users));

    let admin_routes = Router::new()
        .route("/tenants", get(tenants::list_tenants).post(tenants::create_tenant))
        .route("/tenants/{id}", get(tenants::get_tenant).patch(tenants::update_tenant))
        .route("/tenants/{id}/usage", get(tenants::get_tenant_usage))
        .route("/tenants/{id}/users", post(tenants::create_tenant_user));

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(auth_routes)
        .nest("/api/v1", tenant_routes)
        .nest("/admin/api/v1", admin_routes)
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    if state.config.enable_metrics {
        // Installs the global recorder, so the pipeline and pool counters land here too
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(move || std::future::ready(metric_handle.render())))
            .layer(prometheus_layer);
    }

    Ok(router)
}

/// Wrap `router` in admission, CORS and request tracing.
///
/// Admission is applied around the router rather than as a route layer so that it sees every
/// request, including those no route matches. CORS sits outside it so rejections still carry the
/// CORS headers a browser needs to read them.
fn admitted(router: Router, state: AppState) -> anyhow::Result<Router> {
    let cors = create_cors_layer(&state.config)?;
    let service = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(from_fn_with_state(state, pipeline::admission))
        .service(router);

    Ok(Router::new().fallback_service(service))
}

/// Connect as the login role and bring the schema up to date.
///
/// Migrations create the session role and the row-security policies, so they cannot run on the
/// application pool, whose connections have already switched to that role.
async fn run_migrations(connect_options: PgConnectOptions) -> anyhow::Result<()> {
    let owner = PgPoolOptions::new().max_connections(1).connect_with(connect_options).await?;
    migrator().run(&owner).await?;
    owner.close().await;
    info!("Database migrations applied");
    Ok(())
}

pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    shutdown_token: CancellationToken,
    background_tasks: Vec<JoinHandle<()>>,
}

impl Application {
    /// Create a new application: run migrations, connect the row-secured pool and build the router.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting rankgate with configuration: {:#?}", config);

        let url = config
            .database_url()
            .ok_or_else(|| anyhow::anyhow!("database.url is not configured (set DATABASE_URL)"))?;
        let connect_options: PgConnectOptions = url.parse()?;

        run_migrations(connect_options.clone()).await?;

        let pool = pools::connect(connect_options, &config.database.pool, config.database.session_role.as_deref()).await?;
        if config.database.session_role.is_none() {
            warn!("database.session_role is unset; tenant isolation relies on the login role being subject to row-level security");
        }

        Self::new_with_pool(config, pool)
    }

    /// Build the application on an existing pool. The pool must already carry the session-role
    /// and reset hooks (see [`db::pools::connect`]).
    pub fn new_with_pool(config: Config, pool: PgPool) -> anyhow::Result<Self> {
        let state = AppState::builder().db(pool.clone()).config(config.clone()).build();
        let router = admitted(build_router(&state)?, state)?;

        let shutdown_token = CancellationToken::new();
        let mut background_tasks = Vec::new();
        if config.enable_metrics {
            let pools = vec![LabeledPool {
                name: "main",
                pool: pool.clone(),
            }];
            let sampler_config = PoolMetricsConfig::from(&config.pool_metrics);
            let token = shutdown_token.clone();
            background_tasks.push(tokio::spawn(async move {
                if let Err(e) = pools::run_pool_metrics_sampler(pools, sampler_config, token).await {
                    warn!(error = %e, "Pool metrics sampler stopped");
                }
            }));
        }

        Ok(Self {
            router,
            config,
            pool,
            shutdown_token,
            background_tasks,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "rankgate listening on http://{}, API reference at http://localhost:{}/docs",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.shutdown_token.cancel();
        for handle in self.background_tasks {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task panicked during shutdown");
            }
        }

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
