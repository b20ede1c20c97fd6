use std::time::Duration;

use axum::{Json, extract::State};
use tracing::debug;

use crate::{
    AppState,
    api::models::auth::{LoginRequest, RefreshRequest, TokenResponse},
    auth::{
        identity::CallerIdentity,
        password,
        tokens::{self, CredentialKind},
    },
    config::Config,
    db::{errors::DbError, handlers::Users},
    errors::{Error, ErrorEnvelope},
};

fn invalid_login() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    }
}

fn secret<'a>(secret: &'a Option<String>, kind: &str) -> Result<&'a str, Error> {
    secret.as_deref().ok_or_else(|| Error::Internal {
        operation: format!("issue credential: {kind} secret not configured"),
    })
}

fn issue_pair(config: &Config, identity: &CallerIdentity) -> Result<TokenResponse, Error> {
    let access_ttl: Duration = config.auth.access_expiry();
    let access_token = tokens::issue(
        identity,
        CredentialKind::Access,
        secret(&config.auth.access.secret, "access")?,
        access_ttl,
    )?;
    let refresh_token = tokens::issue(
        identity,
        CredentialKind::Refresh,
        secret(&config.auth.refresh.secret, "refresh")?,
        config.auth.refresh_expiry(),
    )?;

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: access_ttl.as_secs(),
    })
}

/// Exchange email and password for a credential pair
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Logged in", body = TokenResponse),
        (status = 401, description = "Invalid email or password", body = ErrorEnvelope),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<Json<TokenResponse>, Error> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let user = Users::new(&mut conn).find_for_login(request.email.trim()).await?;
    drop(conn);

    let Some(user) = user else {
        debug!("Login for unknown email");
        return Err(invalid_login());
    };
    let Some(hash) = user.password_hash.clone() else {
        return Err(invalid_login());
    };
    if !password::verify_password(request.password, hash).await? {
        return Err(invalid_login());
    }

    Ok(Json(issue_pair(&state.config, &CallerIdentity::from(&user))?))
}

/// Exchange a refresh credential for a new pair
///
/// The account is reloaded, so role and verification changes take effect on refresh.
#[utoipa::path(
    post,
    path = "/authentication/refresh",
    request_body = RefreshRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "New credential pair", body = TokenResponse),
        (status = 401, description = "Invalid or expired refresh credential", body = ErrorEnvelope),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn refresh(State(state): State<AppState>, Json(request): Json<RefreshRequest>) -> Result<Json<TokenResponse>, Error> {
    let presented = tokens::verify_token(
        &request.refresh_token,
        secret(&state.config.auth.refresh.secret, "refresh")?,
        CredentialKind::Refresh,
    )?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let user = Users::new(&mut conn)
        .find_for_refresh(presented.user_id)
        .await?
        .ok_or(Error::Unauthenticated {
            message: Some("Account no longer exists".to_string()),
        })?;
    drop(conn);

    Ok(Json(issue_pair(&state.config, &CallerIdentity::from(&user))?))
}

#[cfg(test)]
mod tests {
    use crate::api::models::auth::TokenResponse;
    use crate::auth::identity::Role;
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_login_and_use_access_token(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let user = create_user(&pool, tenant.id, Role::Manager).await;
        let server = create_test_app(pool).await;

        let response = server
            .post("/authentication/login")
            .json(&json!({"email": user.email.to_uppercase(), "password": TEST_PASSWORD}))
            .await;
        response.assert_status_ok();
        let tokens: TokenResponse = response.json();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 15 * 60);

        let me = server
            .get("/api/v1/me")
            .add_header("authorization", bearer(&tokens.access_token))
            .await;
        me.assert_status_ok();
        let body: serde_json::Value = me.json();
        assert_eq!(body["identity"]["user_id"], user.id.to_string());
        assert_eq!(body["identity"]["role"], "manager");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_login_rejects_bad_credentials(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let user = create_user(&pool, tenant.id, Role::Analyst).await;
        let server = create_test_app(pool).await;

        server
            .post("/authentication/login")
            .json(&json!({"email": user.email, "password": "wrong-password"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/authentication/login")
            .json(&json!({"email": "nobody@example.com", "password": TEST_PASSWORD}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refresh(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let user = create_user(&pool, tenant.id, Role::Analyst).await;
        let server = create_test_app(pool).await;

        let response = server
            .post("/authentication/refresh")
            .json(&json!({"refresh_token": refresh_token(&user)}))
            .await;
        response.assert_status_ok();
        let tokens: TokenResponse = response.json();
        server
            .get("/api/v1/me")
            .add_header("authorization", bearer(&tokens.access_token))
            .await
            .assert_status_ok();

        // An access token is not a refresh token
        server
            .post("/authentication/refresh")
            .json(&json!({"refresh_token": access_token(&user)}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
