//! Binding a checked-out connection to the caller's tenant.

use tracing::{instrument, trace};

use crate::auth::identity::CallerIdentity;
use crate::db::errors::DbError;
use crate::types::abbrev_uuid;

use super::guard::{TenantConnection, UnboundConnection};

/// Session-local settings read by the row-security policies and `app_current_tenant()`.
const BIND_SESSION: &str =
    "SELECT set_config('app.tenant_id', $1, false), set_config('app.user_id', $2, false), set_config('app.role', $3, false)";

/// Scope `conn` to the caller's tenant.
///
/// Consumes the unbound handle, so a connection is bound at most once per checkout. The settings
/// stay in force until the pool's release hook clears them.
#[instrument(skip_all, fields(tenant_id = %abbrev_uuid(&identity.tenant_id), user_id = %abbrev_uuid(&identity.user_id)), err)]
pub async fn bind(conn: UnboundConnection, identity: &CallerIdentity) -> Result<TenantConnection, DbError> {
    {
        let mut lease = conn.lease().await?;
        sqlx::query(BIND_SESSION)
            .bind(identity.tenant_id.to_string())
            .bind(identity.user_id.to_string())
            .bind(identity.role.as_str())
            .execute(&mut *lease)
            .await?;
    }

    trace!("Bound connection to tenant");
    Ok(conn.into_bound(identity.tenant_id))
}
