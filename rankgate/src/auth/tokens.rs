//! Bearer credential issuance and verification.
//!
//! Two credential kinds exist: a short-lived access credential presented on every API request,
//! and a longer-lived refresh credential accepted only by `/authentication/refresh`. They are
//! signed with distinct secrets and additionally carry a `typ` claim, so neither can be used in
//! place of the other even if an operator configures the same secret twice.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::{
    auth::identity::{CallerIdentity, Role},
    errors::Error,
    types::{TenantId, UserId},
};

/// Which credential a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Access,
    Refresh,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization: Bearer ...` header
    #[error("Missing bearer credential")]
    Missing,
    /// Bad signature, expired, malformed, or the wrong credential kind
    #[error("Invalid or expired credential")]
    Invalid,
    /// The credential verified but names a role outside admin/manager/analyst
    #[error("Credential carries an unknown role '{0}'")]
    MalformedRole(String),
}

/// JWT claims for both credential kinds
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,            // Subject (user ID)
    pub email: String,          // User email
    pub tenant_id: TenantId,    // Owning tenant
    pub role: String,           // Parsed into Role after signature verification
    pub email_verified: bool,   // Whether the email address has been confirmed
    pub typ: CredentialKind,    // Access or refresh
    pub exp: i64,               // Expiration time
    pub iat: i64,               // Issued at
}

impl Claims {
    pub fn new(identity: &CallerIdentity, kind: CredentialKind, ttl: Duration) -> Self {
        let now = Utc::now();
        let exp = now + ttl;

        Self {
            sub: identity.user_id,
            email: identity.email.clone(),
            tenant_id: identity.tenant_id,
            role: identity.role.as_str().to_string(),
            email_verified: identity.email_verified,
            typ: kind,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }
}

impl TryFrom<Claims> for CallerIdentity {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let role = claims.role.parse::<Role>().map_err(AuthError::MalformedRole)?;
        Ok(Self {
            user_id: claims.sub,
            email: claims.email,
            tenant_id: claims.tenant_id,
            role,
            email_verified: claims.email_verified,
        })
    }
}

/// Sign a credential of the given kind for `identity`
pub fn issue(identity: &CallerIdentity, kind: CredentialKind, secret: &str, ttl: Duration) -> Result<String, Error> {
    let claims = Claims::new(identity, kind, ttl);
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Extract the token from an `Authorization` header value.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let header = authorization.ok_or(AuthError::Missing)?;
    let token = header.strip_prefix("Bearer ").ok_or(AuthError::Missing)?.trim();
    if token.is_empty() {
        return Err(AuthError::Missing);
    }
    Ok(token)
}

/// Verify the bearer credential in an `Authorization` header.
///
/// Pure decode + signature check; no I/O.
pub fn verify(authorization: Option<&str>, secret: &str, kind: CredentialKind) -> Result<CallerIdentity, AuthError> {
    verify_token(bearer_token(authorization)?, secret, kind)
}

/// Verify a raw token (e.g. a refresh token posted in a request body).
pub fn verify_token(token: &str, secret: &str, kind: CredentialKind) -> Result<CallerIdentity, AuthError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| {
        match e.kind() {
            // Client errors - malformed tokens, invalid claims, expired tokens
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::ExpiredSignature
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::ImmatureSignature
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::InvalidAlgorithm => {}
            // Key or library problems are ours, not the caller's; still reject the credential
            _ => error!("JWT verification failed with a server-side error: {e}"),
        }
        AuthError::Invalid
    })?;

    if token_data.claims.typ != kind {
        return Err(AuthError::Invalid);
    }

    CallerIdentity::try_from(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const ACCESS_SECRET: &str = "access-secret-for-tests";
    const REFRESH_SECRET: &str = "refresh-secret-for-tests";

    fn identity() -> CallerIdentity {
        CallerIdentity {
            user_id: Uuid::new_v4(),
            email: "analyst@example.com".to_string(),
            tenant_id: Uuid::new_v4(),
            role: Role::Analyst,
            email_verified: true,
        }
    }

    fn sign_raw(claims: &Claims, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let identity = identity();
        let token = issue(&identity, CredentialKind::Access, ACCESS_SECRET, Duration::from_secs(900)).unwrap();

        let header = format!("Bearer {token}");
        let verified = verify(Some(&header), ACCESS_SECRET, CredentialKind::Access).unwrap();
        assert_eq!(verified, identity);
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(verify(None, ACCESS_SECRET, CredentialKind::Access), Err(AuthError::Missing));
        assert_eq!(
            verify(Some("Basic dXNlcjpwYXNz"), ACCESS_SECRET, CredentialKind::Access),
            Err(AuthError::Missing)
        );
        assert_eq!(verify(Some("Bearer "), ACCESS_SECRET, CredentialKind::Access), Err(AuthError::Missing));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = issue(&identity(), CredentialKind::Access, ACCESS_SECRET, Duration::from_secs(900)).unwrap();
        assert_eq!(
            verify_token(&token, "some-other-secret", CredentialKind::Access),
            Err(AuthError::Invalid)
        );
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let identity = identity();
        let mut claims = Claims::new(&identity, CredentialKind::Access, Duration::from_secs(900));
        let now = Utc::now();
        claims.exp = (now - chrono::Duration::seconds(3600)).timestamp();
        claims.iat = (now - chrono::Duration::seconds(7200)).timestamp();

        let token = sign_raw(&claims, ACCESS_SECRET);
        assert_eq!(verify_token(&token, ACCESS_SECRET, CredentialKind::Access), Err(AuthError::Invalid));
    }

    #[test]
    fn test_malformed_tokens_are_invalid() {
        for token in ["not.a.token", "invalid", "too.many.parts.in.this.token"] {
            assert_eq!(
                verify_token(token, ACCESS_SECRET, CredentialKind::Access),
                Err(AuthError::Invalid),
                "token: {token}"
            );
        }
    }

    #[test]
    fn test_unknown_role_is_malformed_role() {
        let identity = identity();
        let mut claims = Claims::new(&identity, CredentialKind::Access, Duration::from_secs(900));
        claims.role = "superuser".to_string();

        let token = sign_raw(&claims, ACCESS_SECRET);
        assert_eq!(
            verify_token(&token, ACCESS_SECRET, CredentialKind::Access),
            Err(AuthError::MalformedRole("superuser".to_string()))
        );
    }

    #[test]
    fn test_refresh_token_rejected_as_access_token() {
        let identity = identity();
        let refresh = issue(&identity, CredentialKind::Refresh, REFRESH_SECRET, Duration::from_secs(86400)).unwrap();

        // Wrong secret for the slot
        assert_eq!(verify_token(&refresh, ACCESS_SECRET, CredentialKind::Access), Err(AuthError::Invalid));
        // Right secret but wrong kind
        assert_eq!(verify_token(&refresh, REFRESH_SECRET, CredentialKind::Access), Err(AuthError::Invalid));
        // Accepted only where a refresh credential is expected
        assert!(verify_token(&refresh, REFRESH_SECRET, CredentialKind::Refresh).is_ok());
    }

    #[test]
    fn test_access_token_rejected_as_refresh_token_even_with_shared_secret() {
        let identity = identity();
        let access = issue(&identity, CredentialKind::Access, ACCESS_SECRET, Duration::from_secs(900)).unwrap();
        assert_eq!(verify_token(&access, ACCESS_SECRET, CredentialKind::Refresh), Err(AuthError::Invalid));
    }
}
