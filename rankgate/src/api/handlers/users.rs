use axum::Json;

use crate::{
    api::models::users::UserResponse,
    auth::identity::Role,
    db::handlers::Users,
    errors::{Error, ErrorEnvelope},
    pipeline::TenantContext,
};

/// Accounts of the caller's tenant
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "tenant",
    responses(
        (status = 200, description = "Tenant accounts", body = Vec<UserResponse>),
        (status = 403, description = "Caller is an analyst", body = ErrorEnvelope),
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(ctx: TenantContext) -> Result<Json<Vec<UserResponse>>, Error> {
    ctx.require_role(&[Role::Admin, Role::Manager])?;

    let mut conn = ctx.connection.lease().await?;
    let users = Users::new(&mut conn).list().await?;

    Ok(Json(users.into_iter().map(Into::into).collect()))
}
