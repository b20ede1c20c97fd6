//! Database pool metrics sampling.
//!
//! The admission pipeline holds one pooled connection per in-flight request, so pool occupancy
//! is the first signal of saturation (and of 503s from checkout timeouts).

use std::time::Duration;

use metrics::gauge;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PoolMetricsSamplerConfig;

/// Configuration for pool metrics sampling
#[derive(Debug, Clone)]
pub struct PoolMetricsConfig {
    /// How often to sample pool metrics
    pub sample_interval: Duration,
}

impl Default for PoolMetricsConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(5),
        }
    }
}

impl From<&PoolMetricsSamplerConfig> for PoolMetricsConfig {
    fn from(config: &PoolMetricsSamplerConfig) -> Self {
        Self {
            sample_interval: config.sample_interval,
        }
    }
}

/// A named pool for metrics labeling
pub struct LabeledPool {
    pub name: &'static str,
    pub pool: PgPool,
}

/// One observation of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PoolSample {
    size: u32,
    idle: usize,
    max: u32,
}

impl PoolSample {
    fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
            max: pool.options().get_max_connections(),
        }
    }

    fn in_use(&self) -> usize {
        (self.size as usize).saturating_sub(self.idle)
    }

    /// Every connection that can exist is checked out; new requests wait for the acquire timeout
    fn saturated(&self) -> bool {
        self.size >= self.max && self.idle == 0
    }
}

/// Start the pool metrics sampler background task.
///
/// This task periodically samples the pool state and records:
/// - `rankgate_db_pool_connections_total` - Total connections in the pool
/// - `rankgate_db_pool_connections_idle` - Idle connections available
/// - `rankgate_db_pool_connections_in_use` - Connections currently in use
/// - `rankgate_db_pool_connections_max` - Maximum configured connections
///
/// All metrics are labeled with `pool`. A warning is logged when a pool becomes saturated.
pub async fn run_pool_metrics_sampler(
    pools: Vec<LabeledPool>,
    config: PoolMetricsConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(
        "Starting pool metrics sampler for {} pools with {:?} interval",
        pools.len(),
        config.sample_interval
    );

    for labeled in &pools {
        let max = labeled.pool.options().get_max_connections();
        gauge!("rankgate_db_pool_connections_max", "pool" => labeled.name).set(max as f64);
    }

    let mut interval = tokio::time::interval(config.sample_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut was_saturated = vec![false; pools.len()];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Pool metrics sampler shutting down");
                break;
            }
            _ = interval.tick() => {
                for (labeled, was_saturated) in pools.iter().zip(was_saturated.iter_mut()) {
                    let sample = PoolSample::of(&labeled.pool);

                    gauge!("rankgate_db_pool_connections_total", "pool" => labeled.name).set(sample.size as f64);
                    gauge!("rankgate_db_pool_connections_idle", "pool" => labeled.name).set(sample.idle as f64);
                    gauge!("rankgate_db_pool_connections_in_use", "pool" => labeled.name).set(sample.in_use() as f64);

                    let saturated = sample.saturated();
                    if saturated && !*was_saturated {
                        warn!(pool = labeled.name, max = sample.max, "Database pool saturated, checkouts are queueing");
                    }
                    *was_saturated = saturated;

                    debug!(
                        pool = labeled.name,
                        size = sample.size,
                        idle = sample.idle,
                        in_use = sample.in_use(),
                        "Sampled pool metrics"
                    );
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn test_pool_metrics_sampler_runs_and_shuts_down(pool: PgPool) {
        let shutdown = CancellationToken::new();

        let pools = vec![LabeledPool { name: "test", pool }];
        let config = PoolMetricsConfig {
            sample_interval: Duration::from_millis(10),
        };

        let handle = tokio::spawn(run_pool_metrics_sampler(pools, config, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished(), "Sampler should still be running");

        shutdown.cancel();
        let result = handle.await.unwrap();
        assert!(result.is_ok(), "Sampler should exit cleanly");
    }

    #[test]
    fn test_saturation() {
        let busy = PoolSample { size: 4, idle: 0, max: 4 };
        assert!(busy.saturated());
        assert_eq!(busy.in_use(), 4);

        let growing = PoolSample { size: 2, idle: 0, max: 4 };
        assert!(!growing.saturated());

        let idle = PoolSample { size: 4, idle: 3, max: 4 };
        assert!(!idle.saturated());
        assert_eq!(idle.in_use(), 1);
    }

    #[test]
    fn test_config_from_sampler_settings() {
        let settings = PoolMetricsSamplerConfig {
            sample_interval: Duration::from_secs(30),
        };
        assert_eq!(PoolMetricsConfig::from(&settings).sample_interval, Duration::from_secs(30));
    }
}
