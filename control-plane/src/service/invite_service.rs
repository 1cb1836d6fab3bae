//! # Invite Engine (C7)
//!
//! Token-keyed share invites with expiry, use-count ceiling, and atomic
//! redemption against either an existing caller or a freshly created user
//! (§4.6).

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::entities::{MemberRole, NewInvite as NewInviteRow, NewUser, Share, ShareInvite, ShareMember, User};
use crate::domain::events::{InviteCreated, InviteRedeemed, InviteRevoked};
use crate::repository::invite_repository::RedeemOutcome;
use crate::repository::{InviteRepository, UserRepository};
use crate::service::crypto::{self, PasswordVerifierHandle};
use crate::service::identity_service::IdentityService;
use crate::service::notification_service::NotificationService;
use shared::{ApiError, ApiResult};

pub struct NewInviteRequest {
    pub share_id: Uuid,
    pub role: MemberRole,
    pub expires_in_days: Option<i64>,
    pub max_uses: Option<i32>,
    pub email: Option<String>,
    pub created_by: Uuid,
}

/// Either an already-authenticated caller, or the `{email, password}` form
/// used to mint a brand-new account on redemption.
pub enum Redeemer {
    Authenticated(User),
    NewAccount { email: String, password: String },
}

pub struct RedemptionResult {
    pub user: User,
    pub share_id: Uuid,
    pub role: MemberRole,
    /// Only set when redemption minted a new account, so the caller can
    /// proceed without a separate login (§4.6).
    pub access_token: Option<String>,
    pub is_new_member: bool,
}

#[derive(Clone)]
pub struct InviteService {
    invites: InviteRepository,
    users: UserRepository,
    identity: IdentityService,
    notifications: NotificationService,
}

impl InviteService {
    pub fn new(invites: InviteRepository, users: UserRepository, identity: IdentityService, notifications: NotificationService) -> Self {
        Self { invites, users, identity, notifications }
    }

    pub async fn create(&self, share: &Share, req: NewInviteRequest) -> ApiResult<ShareInvite> {
        let token = crypto::generate_opaque_token();
        let expires_at = req.expires_in_days.map(|days| Utc::now() + Duration::days(days));
        let invite = self
            .invites
            .create(NewInviteRow {
                share_id: share.id,
                token,
                role: req.role,
                expires_at,
                max_uses: req.max_uses,
                created_by: req.created_by,
                email: req.email,
            })
            .await?;

        self.notifications
            .dispatch(&InviteCreated { invite_id: invite.id, share_id: share.id, email: invite.email.clone() }, None)
            .await?;

        Ok(invite)
    }

    pub async fn find_by_token(&self, token: &str) -> ApiResult<ShareInvite> {
        self.invites.find_by_token(token).await
    }

    pub async fn list_for_share(&self, share_id: Uuid) -> ApiResult<Vec<ShareInvite>> {
        self.invites.list_for_share(share_id).await
    }

    pub async fn revoke(&self, invite_id: Uuid, share_id: Uuid) -> ApiResult<()> {
        self.invites.revoke(invite_id).await?;
        self.notifications.dispatch(&InviteRevoked { invite_id, share_id }, None).await?;
        Ok(())
    }

    /// The full redemption flow: resolves the redeeming user (creating one
    /// if necessary), rejects the share owner, and performs the atomic
    /// membership grant.
    pub async fn redeem(&self, token: &str, share: &Share, redeemer: Redeemer) -> ApiResult<RedemptionResult> {
        let invite = self.invites.find_by_token(token).await?;
        if !invite.is_valid(Utc::now()) {
            return Err(ApiError::Gone("invite is revoked, expired, or fully used".into()));
        }

        let (user, access_token, minted_new_account) = match redeemer {
            Redeemer::Authenticated(user) => (user, None, false),
            Redeemer::NewAccount { email, password } => {
                let normalized = shared::validation::normalize_email(&email);
                if self.users.find_by_email(&normalized).await?.is_some() {
                    return Err(ApiError::Validation("a user with that email already exists".into()));
                }
                let hasher = PasswordVerifierHandle::default();
                let password_hash = hasher.hash(&password)?;
                let user = self.users.create(NewUser { email: normalized, password_hash, is_admin: false }).await?;
                let issued = self.identity.issue_session_for_new_user(&user).await?;
                (user, Some(issued), true)
            }
        };

        if user.id == share.owner_user_id {
            return Err(ApiError::Validation("the share owner cannot redeem an invite to their own share".into()));
        }

        let outcome = self.invites.redeem(invite.id, user.id, invite.role).await?;
        let (member, is_new_member): (ShareMember, bool) = match outcome {
            RedeemOutcome::NewMember(member) => (member, true),
            RedeemOutcome::AlreadyMember(member) => (member, false),
        };

        if is_new_member {
            self.notifications
                .dispatch(&InviteRedeemed { invite_id: invite.id, share_id: share.id, redeemed_by: user.id, owner_user_id: share.owner_user_id }, None)
                .await?;
        }

        Ok(RedemptionResult {
            user,
            share_id: share.id,
            role: member.role,
            access_token: if minted_new_account { access_token } else { None },
            is_new_member,
        })
    }
}

#[cfg(test)]
mod tests {
    // Redemption's idempotence and owner-rejection rule are covered by
    // `IdentityService`/`InviteRepository` integration tests since both
    // require a live Postgres connection to exercise the `FOR UPDATE` path.
}
