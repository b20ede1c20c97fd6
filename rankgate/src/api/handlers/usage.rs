use axum::{Json, extract::Query};

use crate::{
    api::models::usage::{QuotaEventResponse, QuotaEventsQuery, UsagePeriodResponse, UsageResponse},
    db::handlers::{Keywords, QuotaEvents, Usage},
    errors::{Error, ErrorEnvelope},
    pipeline::TenantContext,
    quota::{Admission, PeriodKey},
};

/// Current-period usage against the tenant's quota policy
#[utoipa::path(
    get,
    path = "/api/v1/usage",
    tag = "tenant",
    responses(
        (status = 200, description = "Usage for the current period", body = UsageResponse),
        (status = 429, description = "Monthly API call quota exhausted", body = ErrorEnvelope),
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_usage(ctx: TenantContext) -> Result<Json<UsageResponse>, Error> {
    // Report the period this request was admitted in, even across a month boundary
    let period = match ctx.admission {
        Admission::Admitted { period, .. } => period,
        Admission::Unmetered => PeriodKey::current(),
    };

    let mut conn = ctx.connection.lease().await?;
    let usage = Usage::new(&mut conn).get(ctx.tenant.id, period).await?;
    let keywords = Keywords::new(&mut conn).count(ctx.tenant.id).await?;

    Ok(Json(UsageResponse::new(&usage, keywords, &ctx.policy)))
}

/// Counters for every period with recorded usage, newest first
#[utoipa::path(
    get,
    path = "/api/v1/usage/history",
    tag = "tenant",
    responses(
        (status = 200, description = "Usage history", body = Vec<UsagePeriodResponse>),
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_usage_history(ctx: TenantContext) -> Result<Json<Vec<UsagePeriodResponse>>, Error> {
    let mut conn = ctx.connection.lease().await?;
    let history = Usage::new(&mut conn).history().await?;

    Ok(Json(history.into_iter().map(Into::into).collect()))
}

/// Recent quota rejections of the tenant
#[utoipa::path(
    get,
    path = "/api/v1/usage/rejections",
    tag = "tenant",
    params(QuotaEventsQuery),
    responses(
        (status = 200, description = "Recorded rejections, newest first", body = Vec<QuotaEventResponse>),
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_quota_rejections(ctx: TenantContext, Query(query): Query<QuotaEventsQuery>) -> Result<Json<Vec<QuotaEventResponse>>, Error> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let mut conn = ctx.connection.lease().await?;
    let events = QuotaEvents::new(&mut conn).recent(limit).await?;

    Ok(Json(events.into_iter().map(Into::into).collect()))
}
