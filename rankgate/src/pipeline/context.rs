//! Per-request contexts handed from the admission middleware to handlers.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use crate::auth::identity::{CallerIdentity, Role};
use crate::db::models::tenants::TenantDBResponse;
use crate::errors::{Error, Result};
use crate::quota::{Admission, QuotaPolicy};
use crate::AppState;

use super::guard::{PlatformConnection, TenantConnection};

/// Everything a tenant-scoped handler may rely on: the caller, their active tenant, the resolved
/// quota policy, the API call just admitted, and the connection bound to the tenant.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub identity: CallerIdentity,
    pub tenant: TenantDBResponse,
    pub policy: QuotaPolicy,
    pub admission: Admission,
    pub connection: TenantConnection,
}

impl TenantContext {
    /// Require one of `roles`, otherwise 403.
    pub fn require_role(&self, roles: &[Role]) -> Result<()> {
        if roles.contains(&self.identity.role) {
            Ok(())
        } else {
            Err(Error::Forbidden {
                reason: format!("Role {} may not perform this operation", self.identity.role),
            })
        }
    }
}

/// Context for platform-admin handlers. The connection is not bound to any tenant.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub identity: CallerIdentity,
    pub connection: PlatformConnection,
}

// Both extractors only read what the admission middleware stored. A handler mounted where the
// middleware did not run gets a 401 rather than an unscoped connection.

impl FromRequestParts<AppState> for TenantContext {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self> {
        parts.extensions.get::<TenantContext>().cloned().ok_or_else(|| {
            warn!(path = %parts.uri.path(), "Tenant handler reached without admission");
            Error::Unauthenticated { message: None }
        })
    }
}

impl FromRequestParts<AppState> for AdminContext {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self> {
        parts.extensions.get::<AdminContext>().cloned().ok_or_else(|| {
            warn!(path = %parts.uri.path(), "Admin handler reached without admission");
            Error::Unauthenticated { message: None }
        })
    }
}
