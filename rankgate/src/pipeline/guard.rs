//! Connection checkout with exactly-once release.
//!
//! A request checks out one pooled connection and every later stage works on it. The
//! [`ConnectionGuard`] owns the right to return it: [`ConnectionGuard::release`] hands the
//! connection back to the pool the first time it is called and is a no-op afterwards, and
//! dropping the guard calls it. Early returns via `?`, panics unwinding through the middleware,
//! and request futures dropped on client disconnect therefore all release the connection once.
//!
//! The connection itself is reached through typed handles that share the guard's slot:
//!
//! - [`UnboundConnection`]: fresh from the pool, no tenant context. Consumed by
//!   [`bind`](super::binder::bind) (giving a [`TenantConnection`]) or by
//!   [`UnboundConnection::into_platform`] on platform-admin routes.
//! - [`TenantConnection`]: bound to exactly one tenant for the rest of the request.
//! - [`PlatformConnection`]: unbound, for platform-admin handlers.
//!
//! After release every handle refuses to lease the connection.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use metrics::counter;
use sqlx::{PgConnection, PgPool, Postgres, pool::PoolConnection};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{trace, warn};

use crate::db::errors::DbError;
use crate::types::TenantId;

/// A leased connection; derefs to [`PgConnection`].
pub type Lease<'a> = MappedMutexGuard<'a, PgConnection>;

#[derive(Debug)]
struct Slot {
    conn: Mutex<Option<PoolConnection<Postgres>>>,
    released: AtomicBool,
}

impl Slot {
    async fn lease(&self) -> Result<Lease<'_>, DbError> {
        if self.released.load(Ordering::Acquire) {
            return Err(released());
        }
        let guard = self.conn.lock().await;
        MutexGuard::try_map(guard, |conn| conn.as_mut().map(|c| &mut **c)).map_err(|_| released())
    }
}

fn released() -> DbError {
    DbError::Other(anyhow::anyhow!("connection already returned to the pool"))
}

/// Owner of a request's connection checkout.
#[derive(Debug)]
pub struct ConnectionGuard {
    slot: Arc<Slot>,
}

impl ConnectionGuard {
    /// Check out one connection from the pool.
    ///
    /// Fails with [`DbError::PoolUnavailable`] when the pool cannot supply a connection within its
    /// acquire timeout; no state is left behind in that case.
    pub async fn checkout(pool: &PgPool) -> Result<(ConnectionGuard, UnboundConnection), DbError> {
        let conn = pool.acquire().await.map_err(|e| {
            counter!("rankgate_db_checkout_failures_total").increment(1);
            DbError::from(e)
        })?;
        counter!("rankgate_db_connections_checked_out_total").increment(1);
        trace!("Checked out connection");

        let slot = Arc::new(Slot {
            conn: Mutex::new(Some(conn)),
            released: AtomicBool::new(false),
        });

        Ok((ConnectionGuard { slot: slot.clone() }, UnboundConnection { slot }))
    }

    /// Return the connection to the pool.
    ///
    /// Returns `true` for the call that released it and `false` for every later call.
    pub fn release(&self) -> bool {
        if self.slot.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        match self.slot.conn.try_lock() {
            Ok(mut conn) => drop(conn.take()),
            // Still leased by a handle that outlived the handler; the pool gets it back when the
            // last handle drops. Further leases are refused either way.
            Err(_) => warn!("Connection released while leased"),
        }

        counter!("rankgate_db_connections_released_total").increment(1);
        trace!("Released connection");
        true
    }

    pub fn is_released(&self) -> bool {
        self.slot.released.load(Ordering::Acquire)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// A checked-out connection with no tenant context.
///
/// Not `Clone`: it is consumed exactly once, by binding it to a tenant or by handing it to a
/// platform-admin handler.
#[derive(Debug)]
pub struct UnboundConnection {
    slot: Arc<Slot>,
}

impl UnboundConnection {
    pub async fn lease(&self) -> Result<Lease<'_>, DbError> {
        self.slot.lease().await
    }

    /// Hand the connection to platform-admin handlers without binding a tenant.
    pub fn into_platform(self) -> PlatformConnection {
        PlatformConnection { slot: self.slot }
    }

    /// Only the binder may produce a tenant-scoped handle.
    pub(super) fn into_bound(self, tenant_id: TenantId) -> TenantConnection {
        TenantConnection {
            slot: self.slot,
            tenant_id,
        }
    }
}

/// A connection bound to one tenant; every row-secured table is scoped to it.
#[derive(Debug, Clone)]
pub struct TenantConnection {
    slot: Arc<Slot>,
    tenant_id: TenantId,
}

impl TenantConnection {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub async fn lease(&self) -> Result<Lease<'_>, DbError> {
        self.slot.lease().await
    }
}

/// An unbound connection handed to platform-admin handlers.
#[derive(Debug, Clone)]
pub struct PlatformConnection {
    slot: Arc<Slot>,
}

impl PlatformConnection {
    pub async fn lease(&self) -> Result<Lease<'_>, DbError> {
        self.slot.lease().await
    }
}
