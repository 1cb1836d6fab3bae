//! # API Error Taxonomy
//!
//! A single [`ApiError`] enum used across the repository, service, and API
//! layers. Each variant knows its own HTTP status code and machine-readable
//! `code`; the [`actix_web::ResponseError`] impl is the only place that turns
//! one into bytes on the wire, so the mapping in this file is authoritative.
//!
//! ## Response shape
//!
//! ```json
//! {
//!   "error": {
//!     "code": 404,
//!     "message": "share not found",
//!     "request_id": "7f3c1e2a-...",
//!     "details": { "field": "path" }
//!   }
//! }
//! ```
//!
//! Never put anything sensitive (password hashes, tokens, private key bytes,
//! raw SQL) into `message` or `details` -- both are returned to the client.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("validation failed")]
    ValidationDetailed { message: String, details: Value },

    #[error("authentication required")]
    Unauthorized(String),

    #[error("two-factor authentication required")]
    TwoFactorRequired,

    #[error("forbidden")]
    Forbidden(String),

    #[error("not found")]
    NotFound(String),

    #[error("conflict")]
    Conflict(String),

    #[error("gone")]
    Gone(String),

    #[error("payload too large")]
    PayloadTooLarge(String),

    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("upstream dependency failure")]
    BadGateway(String),

    #[error("service unavailable")]
    ServiceUnavailable(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    /// Machine-readable error code (stable, used by API clients for branching).
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) | ApiError::ValidationDetailed { .. } => "validation_error",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::TwoFactorRequired => "two_factor_required",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Gone(_) => "gone",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::BadGateway(_) => "bad_gateway",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
            ApiError::Database(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::ValidationDetailed { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::TwoFactorRequired => StatusCode::FORBIDDEN,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Database(ref e) => classify_db_error(e),
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().as_u16() >= 500
    }

    /// User-facing message. Deliberately generic for auth failures so the
    /// response never differs based on whether an account exists.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(m) => m.clone(),
            ApiError::ValidationDetailed { message, .. } => message.clone(),
            ApiError::Unauthorized(m) => m.clone(),
            ApiError::TwoFactorRequired => "two-factor authentication required".to_string(),
            ApiError::Forbidden(m) => m.clone(),
            ApiError::NotFound(m) => m.clone(),
            ApiError::Conflict(m) => m.clone(),
            ApiError::Gone(m) => m.clone(),
            ApiError::PayloadTooLarge(m) => m.clone(),
            ApiError::RateLimited { .. } => "too many requests".to_string(),
            ApiError::BadGateway(m) => m.clone(),
            ApiError::ServiceUnavailable(m) => m.clone(),
            ApiError::Internal(_) | ApiError::Database(_) => "internal server error".to_string(),
        }
    }
}

/// Classifies a `sqlx::Error` into the taxonomy at the repository boundary.
/// Constraint violations become 409s with a generic message; everything else
/// not already handled explicitly is an operational 503.
fn classify_db_error(err: &sqlx::Error) -> StatusCode {
    match err {
        sqlx::Error::RowNotFound => StatusCode::NOT_FOUND,
        sqlx::Error::Database(db_err) if db_err.constraint().is_some() => StatusCode::CONFLICT,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorResponse,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        ApiError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.error_code(), "request rejected");
        }

        let request_id = Uuid::new_v4().to_string();
        let details = match self {
            ApiError::ValidationDetailed { details, .. } => Some(details.clone()),
            _ => None,
        };

        let mut builder = HttpResponse::build(self.status_code());
        if matches!(self, ApiError::TwoFactorRequired) {
            builder.insert_header(("X-2FA-Required", "true"));
        }
        if let ApiError::RateLimited { retry_after_secs } = self {
            builder.insert_header(("Retry-After", retry_after_secs.to_string()));
        }

        builder.json(ErrorBody {
            error: ErrorResponse {
                code: self.status_code().as_u16(),
                message: self.public_message(),
                request_id,
                details,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let err = ApiError::Validation("bad path".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "validation_error");
    }

    #[test]
    fn two_factor_required_is_403() {
        let err = ApiError::TwoFactorRequired;
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn gone_maps_to_410() {
        let err = ApiError::Gone("invite expired".into());
        assert_eq!(err.status_code(), StatusCode::GONE);
    }

    #[test]
    fn payload_too_large_maps_to_413() {
        let err = ApiError::PayloadTooLarge("asset exceeds 5 MiB".into());
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = ApiError::RateLimited { retry_after_secs: 60 };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn internal_errors_never_leak_message() {
        let err = ApiError::Internal(anyhow::anyhow!("leaked connection string"));
        assert_eq!(err.public_message(), "internal server error");
    }
}
