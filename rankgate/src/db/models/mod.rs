//! Database record models matching table schemas.
//!
//! These structs are what repositories in [`crate::db::handlers`] accept and return. Database
//! models are distinct from API models so the storage and wire representations can evolve
//! independently.
//!
//! # Models
//!
//! - [`tenants`]: Tenants and their lifecycle status (not row-secured)
//! - [`users`]: User accounts belonging to a tenant
//! - [`usage`]: Monthly usage counters per tenant and period
//! - [`keywords`]: Tracked keywords, counted against the keyword capacity
//! - [`jobs`]: Crawl and SERP jobs, counted against monthly quotas
//! - [`quota_events`]: Recorded quota rejections

pub mod jobs;
pub mod keywords;
pub mod quota_events;
pub mod tenants;
pub mod usage;
pub mod users;
