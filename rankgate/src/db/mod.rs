//! Database layer for data persistence and access.
//!
//! SQLx over PostgreSQL, following the Repository pattern:
//!
//! ```text
//! ┌──────────────────┐
//! │  API handlers    │  (hold a tenant-bound connection from the pipeline)
//! └────────┬─────────┘
//!          ↓
//! ┌──────────────────┐
//! │  Repositories    │  (db::handlers - queries)
//! └────────┬─────────┘
//!          ↓
//! ┌──────────────────┐
//! │  Models          │  (db::models - database records)
//! └────────┬─────────┘
//!          ↓
//! ┌──────────────────┐
//! │  PostgreSQL      │  (row-level security keyed on app.tenant_id)
//! └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//! - [`pools`]: Pool construction (session role, context reset) and pool metrics
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and are embedded via [`crate::migrator`]. Besides the tables
//! they create the `rankgate_app` role, the row-level security policies and the
//! `SECURITY DEFINER` functions used before a tenant is bound.

pub mod errors;
pub mod handlers;
pub mod models;
pub mod pools;
