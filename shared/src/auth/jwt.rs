//! # Access Tokens (JWT)
//!
//! Per §4.3, only the *access* token is a JWT; refresh tokens are opaque
//! random strings managed entirely by the session repository (see
//! `control_plane::service::session_service`) and never touch this module.
//!
//! Claims are intentionally small: `sub` (user id), `session_id` (the
//! `UserSession` row this access token was minted alongside -- used by
//! `list_sessions` to mark the caller's own session as current), `iat`,
//! `exp`. `session_id` is tolerated as absent on decode so that a token
//! minted by an older deployment does not fail closed.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_ttl_minutes: i64,
}

impl JwtService {
    pub fn new(secret: &str, issuer: impl Into<String>, access_token_ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            access_token_ttl_minutes,
        }
    }

    pub fn generate_access_token(&self, user_id: &str, session_id: &str) -> Result<String, ApiError> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            session_id: Some(session_id.to_string()),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::minutes(self.access_token_ttl_minutes)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("token encode failed: {e}")))
    }

    pub fn decode_access_token(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| ApiError::Unauthorized("invalid or expired access token".into()))?;
        Ok(data.claims)
    }

    /// Short-lived token used only inside an invite-redemption response body
    /// when redemption creates a brand-new user (§4.6): same shape as an
    /// ordinary access token, minted against the session created for that
    /// user in the same transaction.
    pub fn generate_for_new_session(&self, user_id: &str, session_id: &str) -> Result<String, ApiError> {
        self.generate_access_token(user_id, session_id)
    }
}

/// Extracts the bearer token from an `Authorization` header value.
pub fn extract_bearer(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new("test-secret-key", "relay-control-plane", 60)
    }

    #[test]
    fn generates_and_decodes_round_trip() {
        let svc = service();
        let token = svc.generate_access_token("user-1", "session-1").unwrap();
        let claims = svc.decode_access_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.session_id.as_deref(), Some("session-1"));
    }

    #[test]
    fn rejects_token_signed_with_different_secret() {
        let svc_a = service();
        let svc_b = JwtService::new("different-secret", "relay-control-plane", 60);
        let token = svc_a.generate_access_token("user-1", "session-1").unwrap();
        assert!(svc_b.decode_access_token(&token).is_err());
    }

    #[test]
    fn rejects_token_with_wrong_issuer() {
        let svc_a = JwtService::new("test-secret-key", "issuer-a", 60);
        let svc_b = JwtService::new("test-secret-key", "issuer-b", 60);
        let token = svc_a.generate_access_token("user-1", "session-1").unwrap();
        assert!(svc_b.decode_access_token(&token).is_err());
    }

    #[test]
    fn extract_bearer_strips_prefix() {
        assert_eq!(extract_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(extract_bearer("Basic abc"), None);
    }
}
