//! Connection pool construction.
//!
//! Every connection handed out by the pool is in the same state: switched to the row-secured
//! session role and carrying no tenant binding. Two hooks maintain that:
//!
//! - `after_connect` runs `SET ROLE <session_role>` once per physical connection, so the
//!   application never executes statements as the table owner.
//! - `after_release` clears `app.tenant_id`, `app.user_id` and `app.role` whenever a connection
//!   goes back to the pool. A connection whose reset fails is closed instead of reused.
//!
//! ```text
//!   connect ──► SET ROLE rankgate_app ──► idle ◄──────────────┐
//!                                          │                   │
//!                                   checkout (unbound)   reset GUCs
//!                                          │                   │
//!                                   bind tenant ──► handler ──► release
//! ```

pub mod metrics;

use std::{sync::Arc, time::Duration};

use sqlx::{
    Executor, PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::{info, warn};

use crate::config::PoolSettings;

pub use metrics::{LabeledPool, PoolMetricsConfig, run_pool_metrics_sampler};

/// Statement restoring a released connection to the unbound state
pub(crate) const RESET_SESSION_CONTEXT: &str =
    "SELECT set_config('app.tenant_id', '', false), set_config('app.user_id', '', false), set_config('app.role', '', false)";

/// Pool options with the session-role and reset hooks installed.
pub fn pool_options(settings: &PoolSettings, session_role: Option<&str>) -> PgPoolOptions {
    let mut options = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs));

    if settings.idle_timeout_secs > 0 {
        options = options.idle_timeout(Duration::from_secs(settings.idle_timeout_secs));
    }
    if settings.max_lifetime_secs > 0 {
        options = options.max_lifetime(Duration::from_secs(settings.max_lifetime_secs));
    }

    let set_role: Option<Arc<str>> = session_role.map(|role| Arc::from(format!("SET ROLE {role}")));

    options
        .after_connect(move |conn, _meta| {
            let set_role = set_role.clone();
            Box::pin(async move {
                if let Some(statement) = set_role {
                    conn.execute(&*statement).await?;
                }
                Ok(())
            })
        })
        .after_release(|conn, _meta| {
            Box::pin(async move {
                match conn.execute(RESET_SESSION_CONTEXT).await {
                    Ok(_) => Ok(true),
                    Err(e) => {
                        // Never hand a connection with unknown session state to the next request
                        warn!(error = %e, "Failed to reset session context, closing connection");
                        Ok(false)
                    }
                }
            })
        })
}

/// Connect the main application pool.
pub async fn connect(
    connect_options: PgConnectOptions,
    settings: &PoolSettings,
    session_role: Option<&str>,
) -> Result<PgPool, sqlx::Error> {
    info!(
        max_connections = settings.max_connections,
        session_role = session_role.unwrap_or("<login role>"),
        "Connecting database pool"
    );
    pool_options(settings, session_role).connect_with(connect_options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    fn settings() -> PoolSettings {
        PoolSettings {
            max_connections: 1,
            ..PoolSettings::default()
        }
    }

    #[sqlx::test]
    async fn test_connections_run_as_session_role(pool: PgPool) {
        let app_pool = connect((*pool.connect_options()).clone(), &settings(), Some("rankgate_app"))
            .await
            .unwrap();

        let role: String = sqlx::query_scalar("SELECT current_user::text").fetch_one(&app_pool).await.unwrap();
        assert_eq!(role, "rankgate_app");
    }

    #[sqlx::test]
    async fn test_released_connection_is_unbound(pool: PgPool) {
        let app_pool = connect((*pool.connect_options()).clone(), &settings(), Some("rankgate_app"))
            .await
            .unwrap();

        {
            let mut conn = app_pool.acquire().await.unwrap();
            sqlx::query("SELECT set_config('app.tenant_id', $1, false)")
                .bind(uuid::Uuid::new_v4().to_string())
                .execute(&mut *conn)
                .await
                .unwrap();
        }

        // Single-connection pool: the next checkout is the same physical connection
        let mut conn = app_pool.acquire().await.unwrap();
        let row = sqlx::query("SELECT current_setting('app.tenant_id', true) AS tenant")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        let tenant: Option<String> = row.get("tenant");
        assert_eq!(tenant.as_deref().unwrap_or(""), "");
    }
}
