use axum::{Json, extract::Query, http::StatusCode};

use crate::{
    api::models::{
        keywords::{KeywordImportRequest, KeywordImportResponse, KeywordResponse},
        pagination::Pagination,
    },
    audit,
    db::handlers::Keywords,
    errors::{Error, ErrorEnvelope},
    pipeline::TenantContext,
    quota::engine,
};

/// Keywords tracked by the tenant
#[utoipa::path(
    get,
    path = "/api/v1/keywords",
    tag = "tenant",
    params(Pagination),
    responses(
        (status = 200, description = "Tracked keywords", body = Vec<KeywordResponse>),
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_keywords(ctx: TenantContext, Query(pagination): Query<Pagination>) -> Result<Json<Vec<KeywordResponse>>, Error> {
    let (skip, limit) = pagination.params();
    let mut conn = ctx.connection.lease().await?;
    let keywords = Keywords::new(&mut conn).list(skip, limit).await?;

    Ok(Json(keywords.into_iter().map(Into::into).collect()))
}

/// Start tracking a batch of keywords
///
/// The whole batch is checked against the keyword capacity before anything is inserted: either
/// every keyword fits or none is added. Keywords already tracked count towards the request.
#[utoipa::path(
    post,
    path = "/api/v1/keywords",
    tag = "tenant",
    request_body = KeywordImportRequest,
    responses(
        (status = 201, description = "Batch imported", body = KeywordImportResponse),
        (status = 400, description = "Empty, oversized or blank batch", body = ErrorEnvelope),
        (status = 429, description = "Batch exceeds remaining keyword capacity", body = ErrorEnvelope),
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn import_keywords(
    ctx: TenantContext,
    Json(request): Json<KeywordImportRequest>,
) -> Result<(StatusCode, Json<KeywordImportResponse>), Error> {
    let keywords = request.normalize()?;

    let mut conn = ctx.connection.lease().await?;
    let inserted = match engine::import_keywords(&mut conn, ctx.tenant.id, &keywords, ctx.policy.keywords_max).await {
        Ok(inserted) => inserted,
        Err(e) => return Err(audit::reject(&mut conn, &ctx.identity, e).await),
    };

    Ok((
        StatusCode::CREATED,
        Json(KeywordImportResponse {
            requested: keywords.len(),
            skipped: keywords.len() - inserted.len(),
            inserted: inserted.into_iter().map(Into::into).collect(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use crate::api::models::keywords::{KeywordImportResponse, KeywordResponse};
    use crate::auth::identity::Role;
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use sqlx::PgPool;

    fn batch(prefix: &str, n: usize) -> Value {
        let keywords: Vec<Value> = (0..n).map(|i| json!({"keyword": format!("{prefix} {i}")})).collect();
        json!({ "keywords": keywords })
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_import_then_list(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let user = create_user(&pool, tenant.id, Role::Manager).await;
        let server = create_test_app(pool).await;
        let auth = bearer(&access_token(&user));

        let response = server
            .post("/api/v1/keywords")
            .add_header("authorization", auth.clone())
            .json(&batch("running shoes", 3))
            .await;
        response.assert_status(StatusCode::CREATED);
        let imported: KeywordImportResponse = response.json();
        assert_eq!(imported.requested, 3);
        assert_eq!(imported.inserted.len(), 3);
        assert_eq!(imported.skipped, 0);

        // Re-importing skips what is already tracked
        let response = server
            .post("/api/v1/keywords")
            .add_header("authorization", auth.clone())
            .json(&batch("running shoes", 4))
            .await;
        response.assert_status(StatusCode::CREATED);
        let imported: KeywordImportResponse = response.json();
        assert_eq!(imported.inserted.len(), 1);
        assert_eq!(imported.skipped, 3);

        let listed: Vec<KeywordResponse> = server.get("/api/v1/keywords").add_header("authorization", auth).await.json();
        assert_eq!(listed.len(), 4);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_import_over_capacity_inserts_nothing(pool: PgPool) {
        let tenant = create_tenant_with_settings(&pool, "starter", json!({"quotas": {"keywords_max": 50}})).await;
        let user = create_user(&pool, tenant.id, Role::Manager).await;
        let server = create_test_app(pool).await;
        let auth = bearer(&access_token(&user));

        server
            .post("/api/v1/keywords")
            .add_header("authorization", auth.clone())
            .json(&batch("seed", 40))
            .await
            .assert_status(StatusCode::CREATED);

        // 10 slots remain; 50 requested
        let response = server
            .post("/api/v1/keywords")
            .add_header("authorization", auth.clone())
            .json(&batch("bulk", 50))
            .await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        let body: Value = response.json();
        assert_eq!(body["quota"], json!({"kind": "keywords", "limit": 50, "current": 40, "requested": 50}));

        let listed: Vec<KeywordResponse> = server
            .get("/api/v1/keywords?limit=500")
            .add_header("authorization", auth.clone())
            .await
            .json();
        assert_eq!(listed.len(), 40);

        let rejections: Vec<Value> = server
            .get("/api/v1/usage/rejections")
            .add_header("authorization", auth)
            .await
            .json();
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0]["resource"], "keywords");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reimport_at_capacity_is_accepted(pool: PgPool) {
        let tenant = create_tenant_with_settings(&pool, "starter", json!({"quotas": {"keywords_max": 5}})).await;
        let user = create_user(&pool, tenant.id, Role::Manager).await;
        let server = create_test_app(pool).await;
        let auth = bearer(&access_token(&user));

        for _ in 0..2 {
            server
                .post("/api/v1/keywords")
                .add_header("authorization", auth.clone())
                .json(&batch("seed", 5))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let rejections: Vec<Value> = server
            .get("/api/v1/usage/rejections")
            .add_header("authorization", auth)
            .await
            .json();
        assert!(rejections.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_keywords_are_isolated_between_tenants(pool: PgPool) {
        let a = create_tenant(&pool, "starter").await;
        let b = create_tenant(&pool, "starter").await;
        let user_a = create_user(&pool, a.id, Role::Manager).await;
        let user_b = create_user(&pool, b.id, Role::Manager).await;
        let server = create_test_app(pool).await;

        server
            .post("/api/v1/keywords")
            .add_header("authorization", bearer(&access_token(&user_a)))
            .json(&batch("tenant a", 2))
            .await
            .assert_status(StatusCode::CREATED);

        let listed: Vec<KeywordResponse> = server
            .get("/api/v1/keywords")
            .add_header("authorization", bearer(&access_token(&user_b)))
            .await
            .json();
        assert!(listed.is_empty());
    }
}
