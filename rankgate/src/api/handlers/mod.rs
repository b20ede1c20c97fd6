//! Route handlers.
//!
//! - [`auth`]: pre-authentication token routes (`/authentication/*`)
//! - [`me`], [`usage`], [`keywords`], [`jobs`], [`users`]: tenant routes (`/api/v1/*`), served on a
//!   connection bound to the caller's tenant
//! - [`tenants`]: platform-admin routes (`/admin/api/v1/*`)

pub mod auth;
pub mod jobs;
pub mod keywords;
pub mod me;
pub mod tenants;
pub mod usage;
pub mod users;
