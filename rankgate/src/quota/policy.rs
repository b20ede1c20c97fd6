//! Quota policy: plan defaults plus tenant overrides.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use utoipa::ToSchema;

use crate::config::QuotasConfig;

use super::{Counter, Limit, ResourceClass};

/// The bounds that apply to one tenant. Recomputed per request, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct QuotaPolicy {
    #[schema(value_type = Option<u64>)]
    pub keywords_max: Limit,
    #[schema(value_type = Option<u64>)]
    pub api_calls_per_month: Limit,
    #[schema(value_type = Option<u64>)]
    pub serp_jobs_per_month: Limit,
    #[schema(value_type = Option<u64>)]
    pub crawl_jobs_per_month: Limit,
}

impl QuotaPolicy {
    /// Used only if the configured plan table lacks even the default plan.
    const FALLBACK: QuotaPolicy = QuotaPolicy {
        keywords_max: Limit::Bounded(100),
        api_calls_per_month: Limit::Bounded(1_000),
        serp_jobs_per_month: Limit::Bounded(50),
        crawl_jobs_per_month: Limit::Bounded(10),
    };

    /// Compute the policy for a tenant from its plan and settings.
    ///
    /// An unknown plan falls back to `quotas.default_plan`. Single bounds may be overridden under
    /// `settings.quotas.<field>`; a positive integer sets the bound, `null` or `"unlimited"` lifts
    /// it, anything else is ignored.
    pub fn resolve(plan: &str, settings: &Value, quotas: &QuotasConfig) -> QuotaPolicy {
        let mut policy = match quotas.plans.get(plan) {
            Some(policy) => *policy,
            None => {
                warn!(plan, default_plan = %quotas.default_plan, "Unknown plan, using default plan quotas");
                quotas.plans.get(&quotas.default_plan).copied().unwrap_or(Self::FALLBACK)
            }
        };

        let Some(overrides) = settings.get("quotas").and_then(Value::as_object) else {
            return policy;
        };

        for (field, value) in overrides {
            let slot = match field.as_str() {
                "keywords_max" => &mut policy.keywords_max,
                "api_calls_per_month" => &mut policy.api_calls_per_month,
                "serp_jobs_per_month" => &mut policy.serp_jobs_per_month,
                "crawl_jobs_per_month" => &mut policy.crawl_jobs_per_month,
                other => {
                    warn!(field = other, "Ignoring unknown quota override");
                    continue;
                }
            };
            match Limit::from_json(value) {
                Some(limit) => *slot = limit,
                None => warn!(field = field.as_str(), %value, "Ignoring invalid quota override"),
            }
        }

        policy
    }

    pub fn limit_for(&self, resource: ResourceClass) -> Limit {
        match resource {
            ResourceClass::Keywords => self.keywords_max,
            ResourceClass::ApiCalls => self.api_calls_per_month,
            ResourceClass::SerpJobs => self.serp_jobs_per_month,
            ResourceClass::CrawlJobs => self.crawl_jobs_per_month,
        }
    }

    pub fn monthly_limit(&self, counter: Counter) -> Limit {
        self.limit_for(counter.resource())
    }
}
