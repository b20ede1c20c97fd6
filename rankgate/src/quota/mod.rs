//! Per-tenant quota enforcement.
//!
//! A tenant's plan (plus optional overrides in its settings) yields a [`QuotaPolicy`]: a bound on
//! tracked keywords and monthly bounds on API calls, SERP jobs and crawl jobs. Monthly usage lives
//! in `usage_counters`, one row per tenant and [`PeriodKey`], and is advanced by a single
//! conditional upsert so concurrent admissions for one tenant can never overshoot a bound.
//! Keyword capacity is a count of `tenant_keywords` rows checked before a bulk insert.
//!
//! # Modules
//!
//! - [`period`]: `YYYY-MM` accounting periods in UTC
//! - [`policy`]: Plan defaults and per-tenant overrides
//! - [`engine`]: Atomic admission and capacity preflight

pub mod engine;
pub mod period;
pub mod policy;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use utoipa::ToSchema;

use crate::db::errors::DbError;

pub use engine::{Admission, Capacity, admit, admit_in_period, assert_capacity};
pub use period::PeriodKey;
pub use policy::QuotaPolicy;

/// A kind of quota-limited resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Keywords,
    ApiCalls,
    SerpJobs,
    CrawlJobs,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Keywords => "keywords",
            ResourceClass::ApiCalls => "api_calls",
            ResourceClass::SerpJobs => "serp_jobs",
            ResourceClass::CrawlJobs => "crawl_jobs",
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            ResourceClass::Keywords => "Keyword",
            ResourceClass::ApiCalls => "API call",
            ResourceClass::SerpJobs => "SERP job",
            ResourceClass::CrawlJobs => "Crawl job",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resources metered per month in `usage_counters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    ApiCalls,
    SerpJobs,
    CrawlJobs,
}

impl Counter {
    /// Column of `usage_counters` holding this counter. Static, never caller-provided.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Counter::ApiCalls => "api_calls",
            Counter::SerpJobs => "serp_jobs",
            Counter::CrawlJobs => "crawl_jobs",
        }
    }

    pub fn resource(&self) -> ResourceClass {
        match self {
            Counter::ApiCalls => ResourceClass::ApiCalls,
            Counter::SerpJobs => ResourceClass::SerpJobs,
            Counter::CrawlJobs => ResourceClass::CrawlJobs,
        }
    }
}

/// A quota bound.
///
/// Serialized as a number, or `null` when unbounded. Deserialization additionally accepts the
/// string `"unlimited"` so configuration files and tenant settings can say so explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limit {
    Bounded(u64),
    Unbounded,
}

impl Limit {
    pub fn bound(&self) -> Option<u64> {
        match self {
            Limit::Bounded(n) => Some(*n),
            Limit::Unbounded => None,
        }
    }

    /// Interpret a JSON value as a limit. `None` means the value is not a valid limit.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Limit::Unbounded),
            serde_json::Value::String(s) if s == "unlimited" => Some(Limit::Unbounded),
            serde_json::Value::Number(n) => n.as_u64().filter(|n| *n > 0).map(Limit::Bounded),
            _ => None,
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Bounded(n) => serializer.serialize_u64(*n),
            Limit::Unbounded => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(Limit::Unbounded),
            Some(Raw::Text(s)) if s == "unlimited" => Ok(Limit::Unbounded),
            Some(Raw::Text(s)) => Err(serde::de::Error::custom(format!(
                "invalid limit '{s}', expected a positive integer or 'unlimited'"
            ))),
            Some(Raw::Number(n)) => Ok(Limit::Bounded(n)),
        }
    }
}

/// Details of a rejected admission, returned to the client in the `quota` block of a 429.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuotaExceeded {
    pub kind: ResourceClass,
    /// Accounting period for monthly counters; absent for keyword capacity
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "2024-01")]
    pub period: Option<PeriodKey>,
    pub limit: u64,
    pub current: u64,
    pub requested: u64,
}

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} quota exceeded", self.kind.noun())?;
        if let Some(period) = &self.period {
            write!(f, " for {period}")?;
        }
        write!(
            f,
            ": {} of {} used, {} requested",
            self.current, self.limit, self.requested
        )
    }
}

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("{0}")]
    Exceeded(QuotaExceeded),

    /// The counter could not be read or written. Never reported as a quota rejection.
    #[error("quota storage failure: {0}")]
    Storage(#[from] DbError),
}

impl From<sqlx::Error> for QuotaError {
    fn from(err: sqlx::Error) -> Self {
        QuotaError::Storage(DbError::from(err))
    }
}
