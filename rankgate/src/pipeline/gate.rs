//! Tenant status check, run on the unscoped connection before any tenant is bound.

use thiserror::Error;
use tracing::{debug, instrument};

use crate::db::{
    errors::DbError,
    handlers::{Repository, Tenants},
    models::tenants::{TenantDBResponse, TenantStatus},
};
use crate::types::{TenantId, abbrev_uuid};

use super::guard::UnboundConnection;

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Tenant {0} not found")]
    NotFound(TenantId),

    #[error("Tenant is {status}")]
    Disabled { id: TenantId, status: TenantStatus },

    #[error(transparent)]
    Storage(#[from] DbError),
}

/// Load the caller's tenant and require it to be active.
///
/// `tenants` is the one table readable without a tenant binding, and this lookup by primary key
/// is the only statement the pipeline issues on an unbound connection.
#[instrument(skip(conn), fields(tenant_id = %abbrev_uuid(&tenant_id)), err)]
pub async fn check_tenant_active(conn: &UnboundConnection, tenant_id: TenantId) -> Result<TenantDBResponse, TenantError> {
    let mut lease = conn.lease().await?;
    let tenant = Tenants::new(&mut lease)
        .get_by_id(tenant_id)
        .await?
        .ok_or(TenantError::NotFound(tenant_id))?;

    if !tenant.is_active() {
        debug!(status = %tenant.status, "Tenant not active");
        return Err(TenantError::Disabled {
            id: tenant_id,
            status: tenant.status,
        });
    }

    Ok(tenant)
}
