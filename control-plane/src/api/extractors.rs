//! # Shared App State & Request Extractors
//!
//! `AppState` bundles every fully-wired service; handlers pull it out of
//! `web::Data<AppState>`. `AuthenticatedUser`/`AdminUser`/`OptionalUser` turn
//! the `Authorization` header into a resolved, active `User` row -- the only
//! place in the crate that does so.

use std::sync::Arc;

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use shared::auth::JwtService;
use shared::{ApiError, ApiResult};
use uuid::Uuid;

use crate::domain::entities::User;
use crate::repository::UserRepository;
use crate::service::audit_service::AuditService;
use crate::service::identity_service::IdentityService;
use crate::service::invite_service::InviteService;
use crate::service::oauth_service::OAuthService;
use crate::service::rate_limiter::RateLimiter;
use crate::service::relay_service::RelayService;
use crate::service::session_service::SessionService;
use crate::service::share_service::ShareService;
use crate::service::webhook_service::WebhookService;

#[derive(Clone)]
pub struct AppState {
    pub identity: IdentityService,
    pub sessions: SessionService,
    pub shares: ShareService,
    pub invites: InviteService,
    pub oauth: OAuthService,
    pub relay: RelayService,
    pub webhooks: WebhookService,
    pub audit: AuditService,
    pub rate_limiter: Arc<RateLimiter>,
    pub users: UserRepository,
    pub jwt: JwtService,
    pub oauth_enabled: bool,
    pub web_publishing_enabled: bool,
}

/// Resolves the bearer token in `req` into its live `User` row, or `None` if
/// the header is absent, malformed, expired, references a deleted user, or
/// the account has since been deactivated.
async fn resolve_bearer_user(req: &HttpRequest) -> Option<(User, Uuid)> {
    let state = req.app_data::<web::Data<AppState>>()?;
    let header_value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = shared::auth::jwt::extract_bearer(header_value)?;
    let claims = state.jwt.decode_access_token(token).ok()?;
    let user_id = Uuid::parse_str(&claims.sub).ok()?;
    let session_id = claims.session_id.as_deref().and_then(|s| Uuid::parse_str(s).ok())?;
    let user = state.users.find_by_id(user_id).await.ok()?;
    if !user.is_active {
        return None;
    }
    Some((user, session_id))
}

pub struct AuthenticatedUser {
    pub user: User,
    pub session_id: Uuid,
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            match resolve_bearer_user(&req).await {
                Some((user, session_id)) => Ok(AuthenticatedUser { user, session_id }),
                None => Err(ApiError::Unauthorized("a valid access token is required".into())),
            }
        })
    }
}

/// Same resolution as `AuthenticatedUser`, additionally requiring `is_admin`.
pub struct AdminUser(pub User);

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            match resolve_bearer_user(&req).await {
                Some((user, _)) if user.is_admin => Ok(AdminUser(user)),
                Some(_) => Err(ApiError::Forbidden("administrator privileges are required".into())),
                None => Err(ApiError::Unauthorized("a valid access token is required".into())),
            }
        })
    }
}

/// Never fails: `None` when there's no usable bearer token, used by routes
/// that serve both anonymous and authenticated callers (public share reads,
/// relay-token issuance against a public/protected share).
pub struct OptionalUser(pub Option<User>);

impl FromRequest for OptionalUser {
    type Error = ApiError;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { Ok(OptionalUser(resolve_bearer_user(&req).await.map(|(user, _)| user))) })
    }
}

pub fn client_ip(req: &HttpRequest) -> String {
    if let Some(forwarded) = req.headers().get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    req.peer_addr().map(|a| a.ip().to_string()).unwrap_or_else(|| "unknown".to_string())
}

pub fn forwarded_proto(req: &HttpRequest) -> Option<String> {
    req.headers().get("x-forwarded-proto").and_then(|v| v.to_str().ok()).map(str::to_string)
}

pub fn user_agent(req: &HttpRequest) -> Option<String> {
    req.headers().get(header::USER_AGENT).and_then(|v| v.to_str().ok()).map(str::to_string)
}

pub fn require_password_header(req: &HttpRequest) -> Option<String> {
    req.headers().get("x-share-password").and_then(|v| v.to_str().ok()).map(str::to_string)
}

pub type ApiOutcome<T> = ApiResult<T>;
