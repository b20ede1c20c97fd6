use axum::{
    Json,
    extract::Query,
    http::StatusCode,
};
use url::Url;

use crate::{
    api::models::jobs::{AdmittedUnits, JobCreate, JobResponse, JobSubmittedResponse, ListJobsQuery},
    audit,
    db::{
        handlers::Jobs,
        models::jobs::{JobCreateDBRequest, JobKind},
    },
    errors::{Error, ErrorEnvelope},
    pipeline::TenantContext,
    quota,
};

const MAX_TARGET_LEN: usize = 2048;

fn validate_target(kind: JobKind, target: &str) -> Result<String, Error> {
    let target = target.trim();
    if target.is_empty() || target.len() > MAX_TARGET_LEN {
        return Err(Error::BadRequest {
            message: format!("Target must be between 1 and {MAX_TARGET_LEN} characters"),
        });
    }

    if kind == JobKind::Crawl {
        let url = Url::parse(target).map_err(|e| Error::BadRequest {
            message: format!("Crawl target must be a URL: {e}"),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::BadRequest {
                message: "Crawl target must be an http or https URL".to_string(),
            });
        }
        return Ok(url.to_string());
    }

    Ok(target.to_string())
}

/// Admit one unit of the job's monthly counter, then record the job.
///
/// The unit stays consumed even if recording fails afterwards.
async fn submit(ctx: TenantContext, kind: JobKind, request: JobCreate) -> Result<(StatusCode, Json<JobSubmittedResponse>), Error> {
    let target = validate_target(kind, &request.target)?;
    let counter = kind.counter();

    let mut conn = ctx.connection.lease().await?;
    let admission = match quota::admit(&mut conn, ctx.tenant.id, counter, 1, ctx.policy.monthly_limit(counter)).await {
        Ok(admission) => admission,
        Err(e) => return Err(audit::reject(&mut conn, &ctx.identity, e).await),
    };

    let job = Jobs::new(&mut conn)
        .create(&JobCreateDBRequest {
            kind,
            target,
            requested_by: ctx.identity.user_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(JobSubmittedResponse {
            job: job.into(),
            quota: AdmittedUnits::from_admission(admission),
        }),
    ))
}

/// Queue a crawl of a URL, consuming one crawl job from the monthly quota
#[utoipa::path(
    post,
    path = "/api/v1/jobs/crawl",
    tag = "tenant",
    request_body = JobCreate,
    responses(
        (status = 201, description = "Job queued", body = JobSubmittedResponse),
        (status = 400, description = "Invalid target", body = ErrorEnvelope),
        (status = 429, description = "Monthly crawl job quota exhausted", body = ErrorEnvelope),
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn submit_crawl_job(ctx: TenantContext, Json(request): Json<JobCreate>) -> Result<(StatusCode, Json<JobSubmittedResponse>), Error> {
    submit(ctx, JobKind::Crawl, request).await
}

/// Queue a SERP fetch for a query, consuming one SERP job from the monthly quota
#[utoipa::path(
    post,
    path = "/api/v1/jobs/serp",
    tag = "tenant",
    request_body = JobCreate,
    responses(
        (status = 201, description = "Job queued", body = JobSubmittedResponse),
        (status = 400, description = "Invalid target", body = ErrorEnvelope),
        (status = 429, description = "Monthly SERP job quota exhausted", body = ErrorEnvelope),
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn submit_serp_job(ctx: TenantContext, Json(request): Json<JobCreate>) -> Result<(StatusCode, Json<JobSubmittedResponse>), Error> {
    submit(ctx, JobKind::Serp, request).await
}

/// Recent jobs of the tenant
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "tenant",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "Jobs, newest first", body = Vec<JobResponse>),
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_jobs(ctx: TenantContext, Query(query): Query<ListJobsQuery>) -> Result<Json<Vec<JobResponse>>, Error> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let mut conn = ctx.connection.lease().await?;
    let jobs = Jobs::new(&mut conn).list(query.kind, limit).await?;

    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::Role;
    use crate::test_utils::*;
    use serde_json::{Value, json};
    use sqlx::PgPool;

    #[test]
    fn test_validate_target() {
        assert_eq!(validate_target(JobKind::Crawl, " https://example.com ").unwrap(), "https://example.com/");
        assert!(validate_target(JobKind::Crawl, "ftp://example.com").is_err());
        assert!(validate_target(JobKind::Crawl, "not a url").is_err());
        assert_eq!(validate_target(JobKind::Serp, "best running shoes").unwrap(), "best running shoes");
        assert!(validate_target(JobKind::Serp, "   ").is_err());
        assert!(validate_target(JobKind::Serp, &"x".repeat(MAX_TARGET_LEN + 1)).is_err());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_serp_jobs_up_to_quota(pool: PgPool) {
        let tenant = create_tenant_with_settings(&pool, "starter", json!({"quotas": {"serp_jobs_per_month": 2}})).await;
        let user = create_user(&pool, tenant.id, Role::Analyst).await;
        let server = create_test_app(pool).await;
        let auth = bearer(&access_token(&user));

        for used in 1..=2u64 {
            let response = server
                .post("/api/v1/jobs/serp")
                .add_header("authorization", auth.clone())
                .json(&json!({"target": "trail running shoes"}))
                .await;
            response.assert_status(StatusCode::CREATED);
            let body: JobSubmittedResponse = response.json();
            assert_eq!(body.job.kind, JobKind::Serp);
            let quota = body.quota.unwrap();
            assert_eq!((quota.used, quota.limit), (used, 2));
        }

        let response = server
            .post("/api/v1/jobs/serp")
            .add_header("authorization", auth.clone())
            .json(&json!({"target": "trail running shoes"}))
            .await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        let body: Value = response.json();
        assert_eq!(body["quota"]["kind"], "serp_jobs");
        assert_eq!(body["quota"]["current"], 2);

        // Crawl jobs have their own counter
        server
            .post("/api/v1/jobs/crawl")
            .add_header("authorization", auth.clone())
            .json(&json!({"target": "https://example.com/"}))
            .await
            .assert_status(StatusCode::CREATED);

        let jobs: Vec<JobResponse> = server.get("/api/v1/jobs?kind=serp").add_header("authorization", auth).await.json();
        assert_eq!(jobs.len(), 2);
    }
}
