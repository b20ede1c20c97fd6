//! Database models for monthly usage counters.

use chrono::{DateTime, Utc};

use crate::quota::{Counter, PeriodKey};
use crate::types::TenantId;

/// One `usage_counters` row: a tenant's consumption in one period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageDBResponse {
    pub tenant_id: TenantId,
    pub period: PeriodKey,
    pub api_calls: u64,
    pub serp_jobs: u64,
    pub crawl_jobs: u64,
    pub updated_at: DateTime<Utc>,
}

impl UsageDBResponse {
    /// An empty period for which no row exists yet
    pub fn empty(tenant_id: TenantId, period: PeriodKey) -> Self {
        Self {
            tenant_id,
            period,
            api_calls: 0,
            serp_jobs: 0,
            crawl_jobs: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::ApiCalls => self.api_calls,
            Counter::SerpJobs => self.serp_jobs,
            Counter::CrawlJobs => self.crawl_jobs,
        }
    }
}
