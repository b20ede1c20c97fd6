//! API models for usage counters and quota rejections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::{quota_events::QuotaEventDBResponse, usage::UsageDBResponse};
use crate::quota::{Counter, Limit, PeriodKey, QuotaPolicy};
use crate::types::UserId;

/// One resource's consumption against its bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct ResourceUsage {
    pub used: u64,
    /// `null` when unbounded
    #[schema(value_type = Option<u64>)]
    pub limit: Limit,
    /// `null` when unbounded
    pub remaining: Option<u64>,
}

impl ResourceUsage {
    pub fn new(used: u64, limit: Limit) -> Self {
        Self {
            used,
            limit,
            remaining: limit.bound().map(|bound| bound.saturating_sub(used)),
        }
    }
}

/// Current-period usage of the caller's tenant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UsageResponse {
    #[schema(value_type = String, example = "2024-01")]
    pub period: PeriodKey,
    pub api_calls: ResourceUsage,
    pub serp_jobs: ResourceUsage,
    pub crawl_jobs: ResourceUsage,
    /// Tracked keywords against the keyword capacity; not period-scoped
    pub keywords: ResourceUsage,
}

impl UsageResponse {
    pub fn new(usage: &UsageDBResponse, keywords: u64, policy: &QuotaPolicy) -> Self {
        let monthly = |counter| ResourceUsage::new(usage.get(counter), policy.monthly_limit(counter));
        Self {
            period: usage.period,
            api_calls: monthly(Counter::ApiCalls),
            serp_jobs: monthly(Counter::SerpJobs),
            crawl_jobs: monthly(Counter::CrawlJobs),
            keywords: ResourceUsage::new(keywords, policy.keywords_max),
        }
    }
}

/// Raw counters of one period.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UsagePeriodResponse {
    #[schema(value_type = String, example = "2024-01")]
    pub period: PeriodKey,
    pub api_calls: u64,
    pub serp_jobs: u64,
    pub crawl_jobs: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<UsageDBResponse> for UsagePeriodResponse {
    fn from(usage: UsageDBResponse) -> Self {
        Self {
            period: usage.period,
            api_calls: usage.api_calls,
            serp_jobs: usage.serp_jobs,
            crawl_jobs: usage.crawl_jobs,
            updated_at: usage.updated_at,
        }
    }
}

/// A recorded quota rejection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuotaEventResponse {
    pub id: i64,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
    pub resource: String,
    pub period: Option<String>,
    pub limit: u64,
    pub current: u64,
    pub requested: u64,
    pub created_at: DateTime<Utc>,
}

impl From<QuotaEventDBResponse> for QuotaEventResponse {
    fn from(event: QuotaEventDBResponse) -> Self {
        Self {
            id: event.id,
            user_id: event.user_id,
            resource: event.resource,
            period: event.period,
            limit: event.limit,
            current: event.current,
            requested: event.requested,
            created_at: event.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct QuotaEventsQuery {
    /// Maximum number of events to return (default: 50, max: 500)
    pub limit: Option<i64>,
}
