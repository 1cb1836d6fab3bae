//! # Repository Layer
//!
//! One file per aggregate. Every method takes `&PgPool` (or, for the few
//! cross-aggregate writes that must be atomic -- invite redemption, refresh
//! rotation -- a `&mut Transaction`) and returns `shared::ApiResult<T>`.
//! `sqlx::Error::RowNotFound` and `rows_affected() == 0` are mapped to
//! `ApiError::NotFound` here so services never see a bare DB error for the
//! common "no such row" case.

pub mod audit_repository;
pub mod email_repository;
pub mod invite_repository;
pub mod oauth_repository;
pub mod session_repository;
pub mod share_repository;
pub mod token_repository;
pub mod user_repository;
pub mod webhook_repository;

pub use audit_repository::AuditRepository;
pub use email_repository::EmailRepository;
pub use invite_repository::InviteRepository;
pub use oauth_repository::OAuthRepository;
pub use session_repository::SessionRepository;
pub use share_repository::ShareRepository;
pub use token_repository::TokenRepository;
pub use user_repository::UserRepository;
pub use webhook_repository::WebhookRepository;
