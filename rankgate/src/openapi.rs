//! OpenAPI document for the whole HTTP surface.
//!
//! Served as JSON at `/api-docs/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Security schemes: the bearer access credential, and the shared secret guarding admin routes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access credential from `POST /authentication/login`:\n\n\
                            ```\nAuthorization: Bearer ACCESS_TOKEN\n```\n\n\
                            Refresh credentials are not accepted here.",
                        ))
                        .build(),
                ),
            );
            components.add_security_scheme(
                "platform_admin_secret",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "X-Platform-Admin-Secret",
                    "Shared secret required on `/admin/api/v1/*` in addition to an admin's access credential. \
                    The header name is configurable with `auth.platform_admin.header`.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "rankgate",
        description = "Multi-tenant SEO workspace API. Every tenant request is authenticated, checked against its tenant's status, scoped to that tenant in the database and metered against its plan."
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::login,
        api::handlers::auth::refresh,
        api::handlers::me::get_me,
        api::handlers::usage::get_usage,
        api::handlers::usage::get_usage_history,
        api::handlers::usage::list_quota_rejections,
        api::handlers::keywords::list_keywords,
        api::handlers::keywords::import_keywords,
        api::handlers::jobs::list_jobs,
        api::handlers::jobs::submit_crawl_job,
        api::handlers::jobs::submit_serp_job,
        api::handlers::users::list_users,
        api::handlers::tenants::list_tenants,
        api::handlers::tenants::get_tenant,
        api::handlers::tenants::create_tenant,
        api::handlers::tenants::update_tenant,
        api::handlers::tenants::get_tenant_usage,
        api::handlers::tenants::create_tenant_user,
    ),
    components(schemas(
        crate::errors::ErrorEnvelope,
        crate::errors::ErrorBody,
        crate::quota::QuotaExceeded,
        crate::quota::ResourceClass,
        crate::quota::QuotaPolicy,
        crate::auth::identity::Role,
        crate::auth::identity::CallerIdentity,
        crate::db::models::tenants::TenantStatus,
        crate::db::models::jobs::JobKind,
        crate::db::models::jobs::JobStatus,
        api::models::auth::LoginRequest,
        api::models::auth::RefreshRequest,
        api::models::auth::TokenResponse,
        api::models::users::UserResponse,
        api::models::users::UserCreate,
        api::models::users::MeResponse,
        api::models::tenants::TenantResponse,
        api::models::tenants::TenantCreate,
        api::models::tenants::TenantUpdate,
        api::models::usage::ResourceUsage,
        api::models::usage::UsageResponse,
        api::models::usage::UsagePeriodResponse,
        api::models::usage::QuotaEventResponse,
        api::models::keywords::KeywordInput,
        api::models::keywords::KeywordImportRequest,
        api::models::keywords::KeywordResponse,
        api::models::keywords::KeywordImportResponse,
        api::models::jobs::JobCreate,
        api::models::jobs::JobResponse,
        api::models::jobs::AdmittedUnits,
        api::models::jobs::JobSubmittedResponse,
    )),
    tags(
        (name = "authentication", description = "Exchanging passwords and refresh credentials for access credentials"),
        (name = "tenant", description = "Tenant-scoped workspace API"),
        (name = "platform-admin", description = "Cross-tenant management"),
    )
)]
pub struct ApiDoc;
