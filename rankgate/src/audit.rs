//! Best-effort audit trail of quota rejections.
//!
//! Recording is lossy on purpose: a failed audit write is logged and dropped, and the caller still
//! returns the rejection it was about to return.

use metrics::counter;
use sqlx::PgConnection;
use tracing::{debug, warn};

use crate::auth::identity::CallerIdentity;
use crate::db::{handlers::QuotaEvents, models::quota_events::QuotaEventCreateDBRequest};
use crate::errors::Error;
use crate::quota::{QuotaError, QuotaExceeded};
use crate::types::abbrev_uuid;

/// Record `exceeded` for the tenant bound to `conn`.
pub async fn record_quota_rejection(conn: &mut PgConnection, identity: &CallerIdentity, exceeded: &QuotaExceeded) {
    let request = QuotaEventCreateDBRequest {
        user_id: Some(identity.user_id),
        exceeded: exceeded.clone(),
    };

    match QuotaEvents::new(conn).create(&request).await {
        Ok(id) => debug!(event_id = id, resource = %exceeded.kind, "Recorded quota rejection"),
        Err(e) => {
            counter!("rankgate_audit_write_failures_total").increment(1);
            warn!(
                error = %e,
                tenant_id = %abbrev_uuid(&identity.tenant_id),
                resource = %exceeded.kind,
                "Failed to record quota rejection"
            );
        }
    }
}

/// Turn a failed admission into the error to return, recording it first if it was a rejection.
pub async fn reject(conn: &mut PgConnection, identity: &CallerIdentity, err: QuotaError) -> Error {
    if let QuotaError::Exceeded(exceeded) = &err {
        record_quota_rejection(conn, identity, exceeded).await;
    }
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::Role;
    use crate::quota::{PeriodKey, ResourceClass};
    use crate::test_utils::{bind_session, create_tenant};
    use sqlx::PgPool;
    use uuid::Uuid;

    fn exceeded() -> QuotaExceeded {
        QuotaExceeded {
            kind: ResourceClass::SerpJobs,
            period: PeriodKey::from_ym(2024, 3),
            limit: 200,
            current: 200,
            requested: 1,
        }
    }

    fn identity(tenant_id: Uuid) -> CallerIdentity {
        CallerIdentity {
            user_id: Uuid::new_v4(),
            email: "manager@example.com".to_string(),
            tenant_id,
            role: Role::Manager,
            email_verified: true,
        }
    }

    #[sqlx::test]
    async fn test_rejection_is_recorded_for_bound_tenant(pool: PgPool) {
        let tenant = create_tenant(&pool, "starter").await;
        let mut conn = pool.acquire().await.unwrap();
        bind_session(&mut conn, tenant.id).await;

        record_quota_rejection(&mut conn, &identity(tenant.id), &exceeded()).await;

        let events = QuotaEvents::new(&mut conn).recent(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tenant_id, tenant.id);
        assert_eq!(events[0].resource, "serp_jobs");
        assert_eq!(events[0].period.as_deref(), Some("2024-03"));
        assert_eq!((events[0].limit, events[0].current, events[0].requested), (200, 200, 1));
    }

    #[sqlx::test]
    async fn test_failed_write_is_swallowed(pool: PgPool) {
        // No tenant bound: the insert has no tenant_id and fails
        let mut conn = pool.acquire().await.unwrap();
        record_quota_rejection(&mut conn, &identity(Uuid::new_v4()), &exceeded()).await;

        // The connection is still usable afterwards
        let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&mut *conn).await.unwrap();
        assert_eq!(one, 1);
    }
}
