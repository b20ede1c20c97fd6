//! HTTP surface: route handlers and their request/response models.
//!
//! - **[`handlers`]**: Axum handlers, one module per resource
//! - **[`models`]**: Request and response bodies, with their OpenAPI schemas
//!
//! # API Structure
//!
//! - **Authentication** (`/authentication/*`): Exchanging a password or refresh credential for an
//!   access credential. Public.
//! - **Tenant API** (`/api/v1/*`): Everything a tenant's users do. Every request is admitted by
//!   [`crate::pipeline::admission`] and handlers receive a [`crate::pipeline::TenantContext`].
//! - **Platform admin** (`/admin/api/v1/*`): Cross-tenant management, behind the shared admin
//!   secret and the admin role. Handlers receive a [`crate::pipeline::AdminContext`].
//!
//! # OpenAPI Documentation
//!
//! Endpoints are annotated with `utoipa`; see [`crate::openapi`]. The rendered reference is served
//! at `/docs` and the raw document at `/api-docs/openapi.json`.

pub mod handlers;
pub mod models;
