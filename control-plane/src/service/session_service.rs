//! # Session Manager (C3)
//!
//! Opaque refresh-token issuance, single-use rotation, per-device listing,
//! revoke-one / revoke-all (§4.2). Wraps `SessionRepository`; access-token
//! minting (C4) is layered on top by `identity_service`, which is the only
//! caller that needs both.

use chrono::{Duration, Utc};
use shared::ApiResult;
use uuid::Uuid;

use crate::domain::entities::{NewSession, UserSession};
use crate::domain::events::{SessionCreated, SessionRevoked};
use crate::repository::SessionRepository;
use crate::service::crypto;
use crate::service::notification_service::NotificationService;

pub struct IssuedSession {
    pub session: UserSession,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct SessionService {
    repo: SessionRepository,
    notifications: NotificationService,
    refresh_token_ttl_days: i64,
}

pub struct NewSessionRequest {
    pub user_id: Uuid,
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl SessionService {
    pub fn new(repo: SessionRepository, notifications: NotificationService, refresh_token_ttl_days: i64) -> Self {
        Self { repo, notifications, refresh_token_ttl_days }
    }

    pub async fn issue(&self, req: NewSessionRequest) -> ApiResult<IssuedSession> {
        let refresh_token = crypto::generate_opaque_token();
        let refresh_token_hash = crypto::sha256_hex(&refresh_token);
        let expires_at = Utc::now() + Duration::days(self.refresh_token_ttl_days);
        let user_id = req.user_id;
        let device_name = req.device_name.clone();

        let session = self
            .repo
            .create(NewSession {
                user_id,
                refresh_token_hash,
                device_name: req.device_name,
                user_agent: req.user_agent,
                ip_address: req.ip_address,
                expires_at,
            })
            .await?;

        self.notifications
            .dispatch_scoped(&SessionCreated { session_id: session.id, user_id, device_name }, None, Some(user_id))
            .await?;

        Ok(IssuedSession { session, refresh_token })
    }

    /// Single-use rotation (P3): on success, the old plaintext is
    /// permanently unusable even if replayed before the response reaches
    /// the client.
    pub async fn rotate(&self, old_refresh_token: &str) -> ApiResult<IssuedSession> {
        let old_hash = crypto::sha256_hex(old_refresh_token);
        let new_refresh_token = crypto::generate_opaque_token();
        let new_hash = crypto::sha256_hex(&new_refresh_token);

        let session = self.repo.rotate(&old_hash, &new_hash).await?;
        Ok(IssuedSession { session, refresh_token: new_refresh_token })
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> ApiResult<Vec<UserSession>> {
        self.repo.list_for_user(user_id).await
    }

    pub async fn revoke(&self, session_id: Uuid, owner_user_id: Uuid) -> ApiResult<()> {
        self.repo.revoke(session_id, owner_user_id).await?;
        self.notifications.dispatch_scoped(&SessionRevoked { session_id, user_id: owner_user_id }, None, Some(owner_user_id)).await?;
        Ok(())
    }

    /// Returns the count of revoked sessions for the `revoked_count` field
    /// in the `DELETE /auth/sessions` response.
    pub async fn revoke_all(&self, user_id: Uuid) -> ApiResult<u64> {
        self.repo.revoke_all_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    // Rotation and revocation semantics are exercised against a real
    // Postgres connection in integration tests, per SessionRepository's own
    // test module.
}
