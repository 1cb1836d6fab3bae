//! # Auth Primitives
//!
//! Password hashing and access-token (JWT) issuance/verification. The
//! request extractor that turns a bearer token into a resolved principal
//! lives in `control_plane::api::extractors`, since it needs the user
//! repository and the session/blacklist store -- both outside this crate's
//! scope.

pub mod jwt;
pub mod password;

pub use jwt::{Claims, JwtService};
pub use password::PasswordHasher;
