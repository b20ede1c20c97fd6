//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection` (a pooled connection or a transaction) and
//! returns models from [`crate::db::models`].
//!
//! # Tenant scoping
//!
//! Repositories over row-secured tables ([`Users`], [`Usage`], [`Keywords`], [`Jobs`],
//! [`QuotaEvents`]) must be handed a connection bound to a tenant by the request pipeline. On an
//! unbound connection they see no rows and cannot write any. [`Tenants`] is the exception: the table is not row-secured.
//!
//! ```ignore
//! use rankgate::db::handlers::Keywords;
//!
//! async fn example(ctx: &rankgate::pipeline::TenantContext) -> rankgate::errors::Result<()> {
//!     let mut conn = ctx.connection.lease().await?;
//!     let keywords = Keywords::new(&mut conn).list(0, 100).await?;
//!     Ok(())
//! }
//! ```
//!
//! # The Repository Trait
//!
//! The [`Repository`] trait defines the CRUD surface for entities managed as a whole (tenants):
//!
//! - `create()`: Insert a new record
//! - `get_by_id()`: Fetch a record by ID
//! - `list()`: List records with filtering and pagination
//! - `update()`: Modify a record by ID

pub mod jobs;
pub mod keywords;
pub mod quota_events;
pub mod repository;
pub mod tenants;
pub mod usage;
pub mod users;

pub use jobs::Jobs;
pub use keywords::Keywords;
pub use quota_events::QuotaEvents;
pub use repository::Repository;
pub use tenants::Tenants;
pub use usage::Usage;
pub use users::Users;

/// Counters are `u64` in Rust and `BIGINT` in PostgreSQL; saturate rather than wrap.
pub(crate) fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
