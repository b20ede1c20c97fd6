use axum::Json;

use crate::{
    api::models::users::MeResponse,
    errors::{Error, ErrorEnvelope},
    pipeline::TenantContext,
};

/// The caller, their tenant and the quota policy in force
#[utoipa::path(
    get,
    path = "/api/v1/me",
    tag = "tenant",
    responses(
        (status = 200, description = "Caller context", body = MeResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorEnvelope),
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_me(ctx: TenantContext) -> Result<Json<MeResponse>, Error> {
    Ok(Json(MeResponse {
        identity: ctx.identity,
        tenant: ctx.tenant.into(),
        policy: ctx.policy,
    }))
}
