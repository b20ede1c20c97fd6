//! Per-request admission: connection checkout, credential verification, tenant gating, session
//! binding and API-call quota admission, in that order.
//!
//! Handlers never see a connection directly. Tenant handlers extract a [`TenantContext`] whose
//! connection is bound to the caller's tenant, so row-level security confines every query they
//! run; platform-admin handlers extract an [`AdminContext`] whose connection is never bound.

pub mod binder;
pub mod context;
pub mod gate;
pub mod guard;
pub mod middleware;

pub use context::{AdminContext, TenantContext};
pub use gate::TenantError;
pub use guard::{ConnectionGuard, PlatformConnection, TenantConnection, UnboundConnection};
pub use middleware::{RouteClass, admission};
