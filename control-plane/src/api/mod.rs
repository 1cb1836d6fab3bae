//! # HTTP API
//!
//! One handler module per resource family, a shared `dto`/`extractors` layer,
//! and `routes` wiring it all into an `actix_web::Scope`.

pub mod admin;
pub mod auth;
pub mod dto;
pub mod extractors;
pub mod oauth;
pub mod relay;
pub mod routes;
pub mod shares;
pub mod web_publish;
pub mod webhooks;
