//! Common type definitions.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`TenantId`]: Tenant (unit of billing and data isolation)
//! - [`UserId`]: User account identifier
//! - [`KeywordId`]: Keyword-ownership row identifier
//! - [`JobId`]: Crawl/SERP job identifier
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use uuid::Uuid;

// Type aliases for IDs
pub type TenantId = Uuid;
pub type UserId = Uuid;
pub type KeywordId = Uuid;
pub type JobId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
