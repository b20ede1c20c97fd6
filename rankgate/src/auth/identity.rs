//! Caller identity derived from a verified access credential.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

use crate::types::{TenantId, UserId};

/// Role of a caller within its tenant.
///
/// Stored in the `users.role` column (`user_role` enum) and carried as a plain string in token
/// claims, so that an unknown role in a credential is reported as a malformed role rather than a
/// generic decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Analyst,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Analyst => "analyst",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "analyst" => Ok(Role::Analyst),
            other => Err(other.to_string()),
        }
    }
}

/// The authenticated caller. Immutable for the lifetime of the request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CallerIdentity {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub email: String,
    #[schema(value_type = String, format = "uuid")]
    pub tenant_id: TenantId,
    pub role: Role,
    pub email_verified: bool,
}
