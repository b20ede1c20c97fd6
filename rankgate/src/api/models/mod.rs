//! API request/response models.
//!
//! These types define the JSON wire format and carry `utoipa` schemas for the OpenAPI document.
//! They are kept separate from the database models in [`crate::db::models`] so the storage
//! schema can change without breaking clients; handlers convert between the two.

pub mod auth;
pub mod jobs;
pub mod keywords;
pub mod pagination;
pub mod tenants;
pub mod usage;
pub mod users;
