//! # Identity Service (C2 orchestration)
//!
//! Registration, two-phase login (password, then TOTP-or-backup when
//! enabled), password reset, email verification, and TOTP lifecycle
//! management (§4.2). Wraps `UserRepository` + `TokenRepository` and
//! delegates session/access-token issuance to `SessionService` /
//! `shared::auth::JwtService`.

use chrono::{Duration, Utc};
use shared::auth::JwtService;
use shared::{ApiError, ApiResult};
use uuid::Uuid;

use crate::domain::entities::{NewUser, User, UserProfile};
use crate::domain::events::{TotpDisabled, TotpEnabled, UserCreated, UserLoggedIn, UserLoggedOut, UserPasswordReset};
use crate::repository::{EmailRepository, TokenRepository, UserRepository};
use crate::repository::email_repository::NewEmail;
use crate::service::crypto::PasswordVerifierHandle;
use crate::service::notification_service::NotificationService;
use crate::service::session_service::{IssuedSession, NewSessionRequest, SessionService};
use crate::service::totp;

pub struct LoginOutcome {
    pub user: User,
    pub access_token: String,
    pub issued_session: IssuedSession,
}

#[derive(Clone)]
pub struct IdentityService {
    users: UserRepository,
    tokens: TokenRepository,
    emails: EmailRepository,
    sessions: SessionService,
    jwt: JwtService,
    notifications: NotificationService,
    password_reset_ttl_hours: i64,
}

pub struct DeviceContext {
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl IdentityService {
    pub fn new(
        users: UserRepository,
        tokens: TokenRepository,
        emails: EmailRepository,
        sessions: SessionService,
        jwt: JwtService,
        notifications: NotificationService,
        password_reset_ttl_hours: i64,
    ) -> Self {
        Self { users, tokens, emails, sessions, jwt, notifications, password_reset_ttl_hours }
    }

    pub async fn register(&self, email: &str, password: &str, is_admin: bool) -> ApiResult<User> {
        shared::validation::validate_password_strength(password)?;
        let hasher = PasswordVerifierHandle::default();
        let password_hash = hasher.hash(password)?;
        let user = self.users.create(NewUser { email: email.to_string(), password_hash, is_admin }).await?;
        self.notifications.dispatch(&UserCreated { user_id: user.id, email: user.email.clone() }, None).await?;
        Ok(user)
    }

    /// First phase of login: validates credentials, then either finishes
    /// the login or raises `ApiError::TwoFactorRequired` so the caller can
    /// surface the 403 and prompt for `login_with_second_factor` instead.
    /// Returns a generic `Unauthorized` on any credential failure -- no
    /// enumeration of which part was wrong.
    pub async fn login(&self, email: &str, password: &str, ctx: DeviceContext) -> ApiResult<LoginOutcome> {
        let user = self.load_active_user_by_credentials(email, password).await?;

        if user.totp_enabled {
            return Err(ApiError::TwoFactorRequired);
        }

        self.finish_login(user, ctx).await
    }

    /// Second phase: password plus a live TOTP code or an unused backup
    /// code. Both credential checks happen before either succeeds.
    pub async fn login_with_second_factor(
        &self,
        email: &str,
        password: &str,
        totp_or_backup_code: &str,
        ctx: DeviceContext,
    ) -> ApiResult<LoginOutcome> {
        let user = self.load_active_user_by_credentials(email, password).await?;

        if !user.totp_enabled {
            return Err(ApiError::Validation("two-factor authentication is not enabled for this account".into()));
        }
        let secret = user.totp_secret.as_deref().ok_or_else(|| ApiError::Internal(anyhow::anyhow!("totp_enabled without a secret")))?;

        let totp_ok = totp::verify_code(secret, &user.email, totp_or_backup_code).unwrap_or(false);
        let backup_used = if !totp_ok {
            if let Some(codes) = &user.backup_codes {
                if let Some(updated) = totp::consume_backup_code(codes, totp_or_backup_code) {
                    self.users.set_totp(user.id, Some(secret), true, Some(updated)).await?;
                    true
                } else {
                    false
                }
            } else {
                false
            }
        } else {
            false
        };

        if !totp_ok && !backup_used {
            return Err(ApiError::Unauthorized("invalid credentials".into()));
        }

        self.finish_login(user, ctx).await
    }

    async fn load_active_user_by_credentials(&self, email: &str, password: &str) -> ApiResult<User> {
        let hasher = PasswordVerifierHandle::default();
        let user = self.users.find_by_email(email).await?;
        match user {
            Some(user) if user.is_active && hasher.verify(password, &user.password_hash) => Ok(user),
            _ => Err(ApiError::Unauthorized("invalid credentials".into())),
        }
    }

    async fn finish_login(&self, user: User, ctx: DeviceContext) -> ApiResult<LoginOutcome> {
        let issued = self
            .sessions
            .issue(NewSessionRequest {
                user_id: user.id,
                device_name: ctx.device_name,
                user_agent: ctx.user_agent.clone(),
                ip_address: ctx.ip_address.clone(),
            })
            .await?;
        let access_token = self.jwt.generate_access_token(&user.id.to_string(), &issued.session.id.to_string())?;

        self.notifications
            .dispatch(&UserLoggedIn { user_id: user.id, session_id: issued.session.id }, Some(&user))
            .await?;

        Ok(LoginOutcome { user, access_token, issued_session: issued })
    }

    /// Issues a session and access token outside the `login` flow, for a
    /// user created via invite redemption (§4.6) who hasn't presented a
    /// password in this request.
    pub async fn issue_session_for_new_user(&self, user: &User) -> ApiResult<String> {
        let outcome = self.finish_login(user.clone(), DeviceContext { device_name: None, user_agent: None, ip_address: None }).await?;
        Ok(outcome.access_token)
    }

    pub async fn logout(&self, user: &User, session_id: Uuid) -> ApiResult<()> {
        self.sessions.revoke(session_id, user.id).await?;
        self.notifications.dispatch(&UserLoggedOut { user_id: user.id, session_id }, Some(user)).await?;
        Ok(())
    }

    pub fn profile_of(&self, user: User) -> UserProfile {
        UserProfile::from(user)
    }

    /// Always succeeds from the caller's perspective -- no enumeration of
    /// whether the email exists (§4.2, §7).
    pub async fn request_password_reset(&self, email: &str) -> ApiResult<()> {
        let Some(user) = self.users.find_by_email(email).await? else {
            return Ok(());
        };

        let plaintext = crate::service::crypto::generate_opaque_token();
        let token_hash = crate::service::crypto::sha256_hex(&plaintext);
        let expires_at = Utc::now() + Duration::hours(self.password_reset_ttl_hours);
        self.tokens.create_password_reset_token(user.id, &token_hash, expires_at).await?;

        self.emails
            .enqueue(NewEmail {
                to_email: user.email.clone(),
                subject: "Reset your password".to_string(),
                body_text: format!("Use this code to reset your password: {plaintext}"),
                body_html: format!("<p>Use this code to reset your password: <code>{plaintext}</code></p>"),
                email_type: "password_reset".to_string(),
            })
            .await?;
        Ok(())
    }

    /// Validates, applies the new password, revokes every existing session
    /// (R2), and marks the token used.
    pub async fn complete_password_reset(&self, token: &str, new_password: &str) -> ApiResult<()> {
        shared::validation::validate_password_strength(new_password)?;
        let token_hash = crate::service::crypto::sha256_hex(token);
        let record = self.tokens.find_password_reset_token(&token_hash).await?;

        if record.used_at.is_some() || record.expires_at <= Utc::now() {
            return Err(ApiError::Gone("password reset token is expired or already used".into()));
        }

        let hasher = PasswordVerifierHandle::default();
        let new_hash = hasher.hash(new_password)?;
        self.users.update_password(record.user_id, &new_hash).await?;
        self.tokens.mark_password_reset_token_used(record.id).await?;
        self.sessions.revoke_all(record.user_id).await?;

        self.notifications.dispatch(&UserPasswordReset { user_id: record.user_id }, None).await?;
        Ok(())
    }

    pub async fn request_email_verification(&self, user: &User) -> ApiResult<()> {
        let plaintext = crate::service::crypto::generate_opaque_token();
        let token_hash = crate::service::crypto::sha256_hex(&plaintext);
        let expires_at = Utc::now() + Duration::hours(24);
        self.tokens.create_email_verification_token(user.id, &token_hash, expires_at).await?;

        self.emails
            .enqueue(NewEmail {
                to_email: user.email.clone(),
                subject: "Verify your email address".to_string(),
                body_text: format!("Use this code to verify your email: {plaintext}"),
                body_html: format!("<p>Use this code to verify your email: <code>{plaintext}</code></p>"),
                email_type: "email_verification".to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn complete_email_verification(&self, token: &str) -> ApiResult<()> {
        let token_hash = crate::service::crypto::sha256_hex(token);
        let record = self.tokens.find_email_verification_token(&token_hash).await?;
        if record.used_at.is_some() || record.expires_at <= Utc::now() {
            return Err(ApiError::Gone("verification token is expired or already used".into()));
        }
        self.users.set_email_verified(record.user_id).await?;
        self.tokens.mark_email_verification_token_used(record.id).await?;
        Ok(())
    }

    // -- TOTP lifecycle (§4.2) -------------------------------------------

    pub async fn totp_status(&self, user: &User) -> bool {
        user.totp_enabled
    }

    /// Step 1 of enabling TOTP: generates the secret and backup codes but
    /// does not persist them until `totp_verify_enable` confirms possession
    /// of a live code.
    pub async fn totp_begin_enroll(&self, user: &User) -> ApiResult<totp::TotpEnrollment> {
        totp::generate_enrollment(&user.email)
    }

    pub async fn totp_verify_enable(
        &self,
        user: &User,
        secret_base32: &str,
        backup_code_hashes: serde_json::Value,
        code: &str,
    ) -> ApiResult<()> {
        if !totp::verify_code(secret_base32, &user.email, code)? {
            return Err(ApiError::Validation("invalid verification code".into()));
        }
        self.users.set_totp(user.id, Some(secret_base32), true, Some(backup_code_hashes)).await?;
        self.notifications.dispatch(&TotpEnabled { user_id: user.id }, Some(user)).await?;
        Ok(())
    }

    pub async fn totp_disable(&self, user: &User, totp_or_backup_code: &str) -> ApiResult<()> {
        let secret = user.totp_secret.as_deref().ok_or_else(|| ApiError::Validation("two-factor authentication is not enabled".into()))?;

        let ok = totp::verify_code(secret, &user.email, totp_or_backup_code)?
            || user
                .backup_codes
                .as_ref()
                .and_then(|codes| totp::consume_backup_code(codes, totp_or_backup_code))
                .is_some();

        if !ok {
            return Err(ApiError::Validation("invalid verification code".into()));
        }

        self.users.set_totp(user.id, None, false, None).await?;
        self.notifications.dispatch(&TotpDisabled { user_id: user.id }, Some(user)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Full login/registration flows require a real Postgres-backed
    // UserRepository; the pure pieces (password strength, TOTP window
    // tolerance, backup-code single-use) are exercised in
    // `shared::validation` and `service::totp`'s own test modules.
}
