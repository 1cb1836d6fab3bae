//! # Share, Membership & Invite Handlers (§6: `/shares/*`, `/invite/{token}`)

use actix_web::{web, HttpRequest, HttpResponse};
use shared::{ApiError, ApiResult};
use uuid::Uuid;

use crate::api::dto::*;
use crate::api::extractors::{client_ip, require_password_header, user_agent, AppState, AuthenticatedUser, OptionalUser};
use crate::domain::entities::Share;
use crate::service::audit_service::RequestContext;
use crate::service::authz_service::{self, Action, Decision};
use crate::service::invite_service::{NewInviteRequest, Redeemer};
use crate::service::rate_limiter::RouteClass;
use crate::service::share_service::NewShareRequest;

/// Owner-or-admin gate for mutating a share's own record or membership list.
/// Content read/write authorization (public/protected/member-role) is a
/// separate concern handled by `authz_service::authorize`.
fn require_owner_or_admin(user: &crate::domain::entities::User, share: &Share) -> ApiResult<()> {
    if user.is_admin || user.id == share.owner_user_id {
        return Ok(());
    }
    Err(ApiError::Forbidden("only the share's owner or an administrator may do this".into()))
}

fn audit_ctx(req: &HttpRequest) -> RequestContext {
    RequestContext { ip_address: Some(client_ip(req)), user_agent: user_agent(req) }
}

pub async fn create_share(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    body: web::Json<CreateShareRequest>,
) -> ApiResult<HttpResponse> {
    state.rate_limiter.check(RouteClass::ShareCreate, &client_ip(&req)).await?;
    let share = state
        .shares
        .create(NewShareRequest {
            kind: body.kind,
            path: body.path.clone(),
            visibility: body.visibility,
            password: body.password.clone(),
            owner_user_id: auth.user.id,
        })
        .await?;
    state
        .audit
        .record("share.created", Some(auth.user.id), None, Some(share.id), serde_json::json!({ "path": share.path }), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::Created().json(ShareResponse::from(share)))
}

pub async fn list_my_shares(state: web::Data<AppState>, auth: AuthenticatedUser) -> ApiResult<HttpResponse> {
    let shares = state.shares.list_owned_by(auth.user.id).await?;
    Ok(HttpResponse::Ok().json(shares.into_iter().map(ShareResponse::from).collect::<Vec<_>>()))
}

/// Content-read gate: owner/admin/member-editor-or-viewer always pass; a
/// public share passes for anyone; a protected share requires the
/// `x-share-password` header to match.
pub async fn get_share(
    state: web::Data<AppState>,
    req: HttpRequest,
    optional: OptionalUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let share = state.shares.find(path.into_inner()).await?;
    let role = match &optional.0 {
        Some(user) => state.shares.find_member(share.id, user.id).await?.map(|m| m.role),
        None => None,
    };
    let password = require_password_header(&req);
    if password.is_some() {
        state.rate_limiter.check(RouteClass::WebPassword, &client_ip(&req)).await?;
    }
    if authz_service::authorize(optional.0.as_ref(), &share, Action::Read, role, password.as_deref()) != Decision::Allow {
        return Err(ApiError::Forbidden("you do not have access to this share".into()));
    }
    Ok(HttpResponse::Ok().json(ShareResponse::from(share)))
}

pub async fn update_share_visibility(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateShareVisibilityRequest>,
) -> ApiResult<HttpResponse> {
    let share_id = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    let updated = state.shares.update_visibility(share_id, auth.user.id, body.visibility, body.password.clone()).await?;
    state
        .audit
        .record(
            "share.visibility.updated",
            Some(auth.user.id),
            None,
            Some(share_id),
            serde_json::json!({ "visibility": body.visibility }),
            &audit_ctx(&req),
        )
        .await?;
    Ok(HttpResponse::Ok().json(ShareResponse::from(updated)))
}

pub async fn update_share_path(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateSharePathRequest>,
) -> ApiResult<HttpResponse> {
    let share_id = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    let updated = state.shares.update_path(share_id, auth.user.id, share.kind, &body.path).await?;
    state
        .audit
        .record("share.path.updated", Some(auth.user.id), None, Some(share_id), serde_json::json!({ "path": body.path }), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::Ok().json(ShareResponse::from(updated)))
}

pub async fn delete_share(state: web::Data<AppState>, req: HttpRequest, auth: AuthenticatedUser, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let share_id = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    state.shares.delete(share_id, auth.user.id).await?;
    state.audit.record("share.deleted", Some(auth.user.id), None, Some(share_id), serde_json::json!({}), &audit_ctx(&req)).await?;
    Ok(HttpResponse::NoContent().finish())
}

// -- members ------------------------------------------------------------

pub async fn list_members(state: web::Data<AppState>, auth: AuthenticatedUser, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let share_id = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    let members = state.shares.list_members(share_id).await?;
    Ok(HttpResponse::Ok().json(members.into_iter().map(MemberResponse::from).collect::<Vec<_>>()))
}

pub async fn add_member(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<AddMemberRequest>,
) -> ApiResult<HttpResponse> {
    state.rate_limiter.check(RouteClass::MemberAdd, &client_ip(&req)).await?;
    let share_id = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    let member = state.shares.add_member(&share, body.user_id, body.role).await?;
    state
        .audit
        .record(
            "share.member.added",
            Some(auth.user.id),
            Some(body.user_id),
            Some(share_id),
            serde_json::json!({ "role": body.role }),
            &audit_ctx(&req),
        )
        .await?;
    Ok(HttpResponse::Created().json(MemberResponse::from(member)))
}

pub async fn update_member(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<UpdateMemberRequest>,
) -> ApiResult<HttpResponse> {
    let (share_id, user_id) = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    let member = state.shares.update_member_role(&share, user_id, body.role).await?;
    state
        .audit
        .record(
            "share.member.updated",
            Some(auth.user.id),
            Some(user_id),
            Some(share_id),
            serde_json::json!({ "role": body.role }),
            &audit_ctx(&req),
        )
        .await?;
    Ok(HttpResponse::Ok().json(MemberResponse::from(member)))
}

pub async fn remove_member(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    path: web::Path<(Uuid, Uuid)>,
) -> ApiResult<HttpResponse> {
    let (share_id, user_id) = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    state.shares.remove_member(&share, user_id).await?;
    state
        .audit
        .record("share.member.removed", Some(auth.user.id), Some(user_id), Some(share_id), serde_json::json!({}), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

// -- invites --------------------------------------------------------------

pub async fn create_invite(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<CreateInviteRequest>,
) -> ApiResult<HttpResponse> {
    state.rate_limiter.check(RouteClass::InviteCreate, &client_ip(&req)).await?;
    let share_id = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    let invite = state
        .invites
        .create(
            &share,
            NewInviteRequest {
                share_id,
                role: body.role,
                expires_in_days: body.expires_in_days,
                max_uses: body.max_uses,
                email: body.email.clone(),
                created_by: auth.user.id,
            },
        )
        .await?;
    state
        .audit
        .record("invite.created", Some(auth.user.id), None, Some(share_id), serde_json::json!({ "invite_id": invite.id, "role": invite.role }), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::Created().json(InviteResponse::from(invite)))
}

pub async fn list_invites(state: web::Data<AppState>, auth: AuthenticatedUser, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let share_id = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    let invites = state.invites.list_for_share(share_id).await?;
    Ok(HttpResponse::Ok().json(invites.into_iter().map(InviteResponse::from).collect::<Vec<_>>()))
}

pub async fn revoke_invite(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    path: web::Path<(Uuid, Uuid)>,
) -> ApiResult<HttpResponse> {
    let (share_id, invite_id) = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    state.invites.revoke(invite_id, share_id).await?;
    state
        .audit
        .record("invite.revoked", Some(auth.user.id), None, Some(share_id), serde_json::json!({ "invite_id": invite_id }), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn invite_info(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let invite = state.invites.find_by_token(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(InviteInfoResponse { share_id: invite.share_id, role: invite.role, valid: invite.is_valid(chrono::Utc::now()) }))
}

pub async fn redeem_invite(
    state: web::Data<AppState>,
    req: HttpRequest,
    optional: OptionalUser,
    path: web::Path<String>,
    body: web::Json<RedeemInviteRequest>,
) -> ApiResult<HttpResponse> {
    state.rate_limiter.check(RouteClass::InviteRedeem, &client_ip(&req)).await?;
    let token = path.into_inner();
    let invite = state.invites.find_by_token(&token).await?;
    let share = state.shares.find(invite.share_id).await?;

    // An authenticated caller's identity always wins, regardless of what the
    // request body looks like -- a signed-in user posting a stray
    // `{email,password}` body must not have a brand-new account created out
    // from under them.
    let redeemer = match optional.0 {
        Some(user) => Redeemer::Authenticated(user),
        None => match body.into_inner() {
            RedeemInviteRequest::NewAccount { email, password } => Redeemer::NewAccount { email, password },
            RedeemInviteRequest::Authenticated {} => {
                return Err(ApiError::Unauthorized("sign in, or provide an email and password, to redeem this invite".into()));
            }
        },
    };

    let result = state.invites.redeem(&token, &share, redeemer).await?;
    state
        .audit
        .record(
            "invite.redeemed",
            Some(result.user.id),
            None,
            Some(result.share_id),
            serde_json::json!({ "role": result.role, "is_new_member": result.is_new_member }),
            &audit_ctx(&req),
        )
        .await?;
    Ok(HttpResponse::Ok().json(RedeemInviteResponse {
        user: state.identity.profile_of(result.user),
        share_id: result.share_id,
        role: result.role,
        access_token: result.access_token,
        is_new_member: result.is_new_member,
    }))
}

#[cfg(test)]
mod tests {
    // Authorization-gate behavior for these handlers is exercised against a
    // live Postgres connection in integration tests; the pure decision logic
    // itself is covered by `authz_service`'s unit tests.
}
