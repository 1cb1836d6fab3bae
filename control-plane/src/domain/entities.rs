//! # Domain Entities
//!
//! One struct per row shape in §3 of the specification. `New*` structs carry
//! only the fields a caller supplies; the repository fills in identifiers,
//! timestamps, and hashed/derived fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// User
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Empty iff the user authenticates exclusively via a linked OAuth
    /// account (§3 invariant).
    pub password_hash: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub email_verified: bool,
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    /// JSON array of `{hash, used}` objects (§4.2).
    pub backup_codes: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub email_verified: bool,
    pub totp_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            is_admin: u.is_admin,
            is_active: u.is_active,
            email_verified: u.email_verified,
            totp_enabled: u.totp_enabled,
            created_at: u.created_at,
        }
    }
}

pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserEmailPreferences {
    pub user_id: Uuid,
    pub invite_notifications: bool,
    pub share_update_notifications: bool,
    pub member_notifications: bool,
    pub security_alerts: bool,
    pub digest_emails: bool,
}

impl Default for UserEmailPreferences {
    fn default() -> Self {
        Self {
            user_id: Uuid::nil(),
            invite_notifications: true,
            share_update_notifications: true,
            member_notifications: true,
            security_alerts: true,
            digest_emails: false,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 hex digest of the opaque refresh token; the plaintext is
    /// never stored (§3 invariant).
    pub refresh_token_hash: String,
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub struct NewSession {
    pub user_id: Uuid,
    pub refresh_token_hash: String,
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// OAuth
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OAuthProvider {
    pub id: Uuid,
    pub name: String,
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret_encrypted: String,
    pub enabled: bool,
    pub auto_register: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserOAuthAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_id: Uuid,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Shares
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ShareKind {
    Doc,
    Folder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
    Protected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Viewer,
    Editor,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Share {
    pub id: Uuid,
    pub kind: ShareKind,
    pub path: String,
    pub visibility: Visibility,
    pub password_hash: Option<String>,
    pub owner_user_id: Uuid,
    pub web_published: bool,
    pub web_slug: Option<String>,
    pub web_noindex: bool,
    pub web_content: Option<String>,
    pub web_folder_items: Option<serde_json::Value>,
    pub web_doc_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewShare {
    pub kind: ShareKind,
    pub path: String,
    pub visibility: Visibility,
    pub password_hash: Option<String>,
    pub owner_user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShareMember {
    pub id: Uuid,
    pub share_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShareInvite {
    pub id: Uuid,
    pub share_id: Uuid,
    /// 256-bit random, hex-encoded (64 chars); unique.
    pub token: String,
    pub role: MemberRole,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub use_count: i32,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ShareInvite {
    /// Per §4.6: not revoked, not expired, under the use-count ceiling.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return false;
            }
        }
        if let Some(max_uses) = self.max_uses {
            if self.use_count >= max_uses {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Tokens (password reset / email verification)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailVerificationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Webhooks
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
    MaxRetriesExceeded,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Webhook {
    pub id: Uuid,
    /// `None` = admin/global webhook (§3).
    pub user_id: Option<Uuid>,
    pub name: String,
    pub url: String,
    pub secret: String,
    /// Stored as a JSON array of event-type strings (closed vocabulary, §6).
    pub events: serde_json::Value,
    pub active: bool,
    pub failure_count: i32,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    pub fn event_set(&self) -> Vec<String> {
        self.events
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    pub fn is_admin_scoped(&self) -> bool {
        self.user_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub response_status_code: Option<i32>,
    /// Truncated to 1 KiB on storage (§4.9).
    pub response_body: Option<String>,
    pub attempt_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Email queue
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailQueueItem {
    pub id: Uuid,
    pub to_email: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub email_type: String,
    pub status: EmailStatus,
    pub attempt_count: i32,
    pub error_message: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Audit log
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor_user_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub target_share_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

// =============================================================================
// Instance settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InstanceSetting {
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(use_count: i32, max_uses: Option<i32>, revoked: bool, expires_in_past: bool) -> ShareInvite {
        let now = Utc::now();
        ShareInvite {
            id: Uuid::new_v4(),
            share_id: Uuid::new_v4(),
            token: "t".into(),
            role: MemberRole::Viewer,
            expires_at: Some(if expires_in_past { now - chrono::Duration::hours(1) } else { now + chrono::Duration::hours(1) }),
            max_uses,
            use_count,
            revoked_at: if revoked { Some(now) } else { None },
            created_by: Uuid::new_v4(),
            email: None,
            created_at: now,
        }
    }

    #[test]
    fn valid_invite_passes() {
        let inv = invite(0, Some(5), false, false);
        assert!(inv.is_valid(Utc::now()));
    }

    #[test]
    fn revoked_invite_is_invalid() {
        let inv = invite(0, Some(5), true, false);
        assert!(!inv.is_valid(Utc::now()));
    }

    #[test]
    fn expired_invite_is_invalid() {
        let inv = invite(0, Some(5), false, true);
        assert!(!inv.is_valid(Utc::now()));
    }

    #[test]
    fn exhausted_invite_is_invalid() {
        let inv = invite(5, Some(5), false, false);
        assert!(!inv.is_valid(Utc::now()));
    }

    #[test]
    fn null_max_uses_never_exhausts() {
        let inv = invite(1000, None, false, false);
        assert!(inv.is_valid(Utc::now()));
    }
}
