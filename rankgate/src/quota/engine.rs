//! Atomic admission against monthly counters and keyword capacity preflight.

use metrics::counter;
use sqlx::{Connection, PgConnection};
use tracing::{debug, instrument};

use crate::db::{
    handlers::{Keywords, Usage},
    models::keywords::{KeywordCreateDBRequest, KeywordDBResponse},
};
use crate::types::{TenantId, abbrev_uuid};

use super::{Counter, Limit, PeriodKey, QuotaError, QuotaExceeded, ResourceClass};

/// Outcome of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The counter was advanced; `used` is its value after the increment.
    Admitted {
        period: PeriodKey,
        used: u64,
        limit: u64,
    },
    /// No bound applies; storage was not touched.
    Unmetered,
}

/// Outcome of a successful capacity preflight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// `requested` more items fit; `used` were present when checked.
    Available { used: u64, limit: u64 },
    Unbounded,
}

fn record(counter: Counter, outcome: &'static str) {
    counter!(
        "rankgate_quota_admissions_total",
        "resource" => counter.resource().as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Admit `requested` units of `counter` in the current period.
pub async fn admit(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    counter: Counter,
    requested: u64,
    limit: Limit,
) -> Result<Admission, QuotaError> {
    admit_in_period(conn, tenant_id, counter, requested, limit, PeriodKey::current()).await
}

/// Admit `requested` units of `counter` in `period`.
///
/// Either the counter advances by exactly `requested` and stays within `limit`, or nothing is
/// written and [`QuotaError::Exceeded`] reports the value observed at rejection time. Storage
/// failures surface as [`QuotaError::Storage`], never as a rejection.
#[instrument(skip(conn), fields(tenant_id = %abbrev_uuid(&tenant_id), period = %period), err)]
pub async fn admit_in_period(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    counter: Counter,
    requested: u64,
    limit: Limit,
    period: PeriodKey,
) -> Result<Admission, QuotaError> {
    let Limit::Bounded(bound) = limit else {
        record(counter, "unmetered");
        return Ok(Admission::Unmetered);
    };

    let mut usage = Usage::new(conn);

    if requested == 0 {
        let used = usage.current(tenant_id, period, counter).await?;
        return Ok(Admission::Admitted { period, used, limit: bound });
    }

    let exceeded = |current: u64| {
        QuotaError::Exceeded(QuotaExceeded {
            kind: counter.resource(),
            period: Some(period),
            limit: bound,
            current,
            requested,
        })
    };

    // A single request larger than the whole bound can never fit
    if requested > bound {
        let current = usage.current(tenant_id, period, counter).await?;
        record(counter, "rejected");
        return Err(exceeded(current));
    }

    match usage.try_increment(tenant_id, period, counter, requested, bound).await? {
        Some(used) => {
            debug!(used, limit = bound, "Admitted");
            record(counter, "admitted");
            Ok(Admission::Admitted { period, used, limit: bound })
        }
        None => {
            let current = usage.current(tenant_id, period, counter).await?;
            record(counter, "rejected");
            Err(exceeded(current))
        }
    }
}

/// Check that `requested` more keywords fit within `limit`.
///
/// Read-only. To make the check and the insert one unit, use [`import_keywords`].
#[instrument(skip(conn), fields(tenant_id = %abbrev_uuid(&tenant_id)), err)]
pub async fn assert_capacity(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    requested: u64,
    limit: Limit,
) -> Result<Capacity, QuotaError> {
    let Limit::Bounded(bound) = limit else {
        return Ok(Capacity::Unbounded);
    };

    let used = Keywords::new(conn).count(tenant_id).await?;
    if used.saturating_add(requested) > bound {
        return Err(QuotaError::Exceeded(QuotaExceeded {
            kind: ResourceClass::Keywords,
            period: None,
            limit: bound,
            current: used,
            requested,
        }));
    }

    Ok(Capacity::Available { used, limit: bound })
}

/// Insert keywords for the tenant bound to `conn`, all or nothing.
///
/// The capacity check and the insert share one transaction holding a per-tenant advisory lock,
/// so two concurrent imports cannot both pass the check and jointly overshoot the bound.
/// Keywords already tracked are skipped by the insert and take no capacity, so re-importing
/// them at the bound succeeds and inserts nothing.
#[instrument(skip(conn, keywords), fields(tenant_id = %abbrev_uuid(&tenant_id), count = keywords.len()), err)]
pub async fn import_keywords(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    keywords: &[KeywordCreateDBRequest],
    limit: Limit,
) -> Result<Vec<KeywordDBResponse>, QuotaError> {
    let mut tx = conn.begin().await?;

    let mut repo = Keywords::new(&mut tx);
    repo.lock_for_import(tenant_id).await?;
    let tracked = repo.count_tracked(tenant_id, keywords).await?;
    let requested = (keywords.len() as u64).saturating_sub(tracked);

    let checked = assert_capacity(&mut tx, tenant_id, requested, limit).await;
    if let Err(QuotaError::Exceeded(_)) = &checked {
        counter!("rankgate_quota_admissions_total", "resource" => "keywords", "outcome" => "rejected").increment(1);
    }
    checked?;

    let inserted = Keywords::new(&mut tx).insert_many(keywords).await?;
    tx.commit().await?;

    counter!("rankgate_quota_admissions_total", "resource" => "keywords", "outcome" => "admitted").increment(1);
    Ok(inserted)
}
