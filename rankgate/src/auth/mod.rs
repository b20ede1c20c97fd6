//! Caller authentication.
//!
//! Every tenant request carries `Authorization: Bearer <access token>`. The token is an HS256 JWT
//! whose claims name the user, the owning tenant, the user's role within that tenant and whether
//! the email address has been verified. Verification is a pure function of the token and the
//! configured secret; it never touches the database.
//!
//! Tokens are minted by the pre-auth routes under `/authentication/*` after an email/password
//! check against the argon2 hash stored in `users.password_hash`.
//!
//! # Modules
//!
//! - [`identity`]: [`Role`](identity::Role) and [`CallerIdentity`](identity::CallerIdentity)
//! - [`tokens`]: Issuing and verifying access and refresh credentials
//! - [`password`]: Password hashing and verification using Argon2

pub mod identity;
pub mod password;
pub mod tokens;
