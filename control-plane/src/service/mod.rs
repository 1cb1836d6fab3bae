//! # Service Layer
//!
//! Business logic. Each service owns the repositories (and, where relevant,
//! other services) it needs and exposes operations that return
//! `shared::ApiResult<T>`; HTTP concerns stop at the `api` layer.

pub mod audit_service;
pub mod authz_service;
pub mod crypto;
pub mod identity_service;
pub mod invite_service;
pub mod notification_service;
pub mod oauth_service;
pub mod rate_limiter;
pub mod relay_service;
pub mod session_service;
pub mod share_service;
pub mod totp;
pub mod webhook_service;
