//! # Request / Response DTOs
//!
//! One struct per JSON shape crossing the HTTP boundary (§6). Kept separate
//! from `domain::entities` so a column rename never silently changes the
//! wire contract, and so password/secret fields never round-trip back out
//! by accident (entities derive `Serialize`; these are written by hand to
//! control exactly what's exposed).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::{
    MemberRole, OAuthProvider, Share, ShareInvite, ShareKind, ShareMember, User, UserProfile, UserSession, Visibility, Webhook, WebhookDelivery,
};

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginWithSecondFactorRequest {
    pub email: String,
    pub password: String,
    pub code: String,
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_current: bool,
}

impl SessionResponse {
    pub fn from_session(session: UserSession, current_session_id: Option<Uuid>) -> Self {
        Self {
            is_current: current_session_id == Some(session.id),
            id: session.id,
            device_name: session.device_name,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            last_activity: session.last_activity,
            expires_at: session.expires_at,
            created_at: session.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RevokeAllSessionsResponse {
    pub revoked_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequestRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetCompleteRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailVerificationCompleteRequest {
    pub token: String,
}

// -- TOTP ---------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct TotpStatusResponse {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct TotpEnrollResponse {
    pub secret_base32: String,
    pub otpauth_url: String,
    pub backup_codes: Vec<String>,
    /// Opaque; the client must echo this back unmodified to `/2fa/verify`
    /// since nothing is persisted until the code is confirmed.
    pub backup_code_hashes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct TotpVerifyRequest {
    pub secret_base32: String,
    pub backup_code_hashes: serde_json::Value,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct TotpDisableRequest {
    pub code: String,
}

// -- OAuth ----------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct OAuthProviderResponse {
    pub name: String,
    pub enabled: bool,
}

impl From<OAuthProvider> for OAuthProviderResponse {
    fn from(p: OAuthProvider) -> Self {
        Self { name: p.name, enabled: p.enabled }
    }
}

#[derive(Debug, Deserialize)]
pub struct OAuthAuthorizeQuery {
    pub redirect_uri: String,
    #[serde(default)]
    pub return_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OAuthAuthorizeResponse {
    pub authorize_url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct OAuthCallbackResponse {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
    pub return_url: Option<String>,
}

// =============================================================================
// Relay tokens / public key
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RelayTokenRequest {
    pub share_id: Uuid,
    pub doc_id: String,
    pub mode: RelayModeDto,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayModeDto {
    Read,
    Write,
}

#[derive(Debug, Serialize)]
pub struct RelayTokenResponse {
    pub relay_url: String,
    pub token: String,
    pub doc_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    pub key_id: String,
    pub public_key: String,
    pub algorithm: &'static str,
}

// =============================================================================
// Shares
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateShareRequest {
    pub kind: ShareKind,
    pub path: String,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_visibility() -> Visibility {
    Visibility::Private
}

#[derive(Debug, Deserialize)]
pub struct UpdateShareVisibilityRequest {
    pub visibility: Visibility,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSharePathRequest {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub id: Uuid,
    pub kind: ShareKind,
    pub path: String,
    pub visibility: Visibility,
    pub has_password: bool,
    pub owner_user_id: Uuid,
    pub web_published: bool,
    pub web_slug: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Share> for ShareResponse {
    fn from(s: Share) -> Self {
        Self {
            id: s.id,
            kind: s.kind,
            path: s.path,
            visibility: s.visibility,
            has_password: s.password_hash.is_some(),
            owner_user_id: s.owner_user_id,
            web_published: s.web_published,
            web_slug: s.web_slug,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    pub role: MemberRole,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: MemberRole,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub user_id: Uuid,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

impl From<ShareMember> for MemberResponse {
    fn from(m: ShareMember) -> Self {
        Self { user_id: m.user_id, role: m.role, created_at: m.created_at }
    }
}

// -- Invites ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub role: MemberRole,
    #[serde(default)]
    pub expires_in_days: Option<i64>,
    #[serde(default)]
    pub max_uses: Option<i32>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub id: Uuid,
    pub share_id: Uuid,
    pub token: String,
    pub role: MemberRole,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub use_count: i32,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ShareInvite> for InviteResponse {
    fn from(i: ShareInvite) -> Self {
        Self {
            id: i.id,
            share_id: i.share_id,
            revoked: i.revoked_at.is_some(),
            token: i.token,
            role: i.role,
            expires_at: i.expires_at,
            max_uses: i.max_uses,
            use_count: i.use_count,
            created_at: i.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InviteInfoResponse {
    pub share_id: Uuid,
    pub role: MemberRole,
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RedeemInviteRequest {
    NewAccount { email: String, password: String },
    Authenticated {},
}

#[derive(Debug, Serialize)]
pub struct RedeemInviteResponse {
    pub user: UserProfile,
    pub share_id: Uuid,
    pub role: MemberRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub is_new_member: bool,
}

// =============================================================================
// Admin
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AdminCreateUserRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub actor_user_id: Option<Uuid>,
    #[serde(default)]
    pub target_user_id: Option<Uuid>,
    #[serde(default)]
    pub target_share_id: Option<Uuid>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

// =============================================================================
// Webhooks
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWebhookRequest {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub active: bool,
    pub failure_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Webhook> for WebhookResponse {
    fn from(w: Webhook) -> Self {
        Self {
            id: w.id,
            user_id: w.user_id,
            name: w.name,
            url: w.url,
            events: w.event_set(),
            active: w.active,
            failure_count: w.failure_count,
            created_at: w.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedWebhookResponse {
    #[serde(flatten)]
    pub webhook: WebhookResponse,
    /// Only ever returned once, at creation time.
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct RotateSecretResponse {
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookDeliveryResponse {
    pub id: Uuid,
    pub event_type: String,
    pub status: String,
    pub response_status_code: Option<i32>,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<WebhookDelivery> for WebhookDeliveryResponse {
    fn from(d: WebhookDelivery) -> Self {
        Self {
            id: d.id,
            event_type: d.event_type,
            status: format!("{:?}", d.status).to_lowercase(),
            response_status_code: d.response_status_code,
            attempt_count: d.attempt_count,
            created_at: d.created_at,
        }
    }
}

// =============================================================================
// Web publishing (§4.14)
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct PublishShareRequest {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub noindex: bool,
}

#[derive(Debug, Deserialize)]
pub struct SyncDocContentRequest {
    pub content: String,
    #[serde(default)]
    pub doc_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncFolderItemsRequest {
    pub items: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct WebPasswordQuery {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebPublishedResponse {
    pub slug: String,
    pub kind: ShareKind,
    pub noindex: bool,
    pub content: Option<String>,
    pub folder_items: Option<serde_json::Value>,
    pub doc_id: Option<String>,
    pub requires_password: bool,
}

impl WebPublishedResponse {
    pub fn from_share(share: &Share) -> Self {
        Self {
            slug: share.web_slug.clone().unwrap_or_default(),
            kind: share.kind,
            noindex: share.web_noindex,
            content: share.web_content.clone(),
            folder_items: share.web_folder_items.clone(),
            doc_id: share.web_doc_id.clone(),
            requires_password: share.visibility == Visibility::Protected,
        }
    }
}

pub fn user_profile(user: User) -> UserProfile {
    UserProfile::from(user)
}
