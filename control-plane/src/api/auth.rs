//! # Auth Handlers (§6: `/auth/*`)

use actix_web::{web, HttpRequest, HttpResponse};
use shared::ApiResult;
use uuid::Uuid;

use crate::api::dto::*;
use crate::api::extractors::{client_ip, user_agent, AdminUser, AppState, AuthenticatedUser};
use crate::service::audit_service::RequestContext;
use crate::service::identity_service::DeviceContext;
use crate::service::rate_limiter::RouteClass;

fn device_context(req: &HttpRequest, device_name: Option<String>) -> DeviceContext {
    DeviceContext { device_name, user_agent: user_agent(req), ip_address: Some(client_ip(req)) }
}

fn audit_ctx(req: &HttpRequest) -> RequestContext {
    RequestContext { ip_address: Some(client_ip(req)), user_agent: user_agent(req) }
}

/// `POST /auth/register` -- admin-only (§4.2): the first account is
/// provisioned out of band; every subsequent one is created by an admin or
/// via invite/OAuth auto-registration.
pub async fn register(state: web::Data<AppState>, req: HttpRequest, admin: AdminUser, body: web::Json<RegisterRequest>) -> ApiResult<HttpResponse> {
    let user = state.identity.register(&body.email, &body.password, body.is_admin).await?;
    state
        .audit
        .record("user.created", Some(admin.0.id), Some(user.id), None, serde_json::json!({ "email": user.email }), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::Created().json(user_profile(user)))
}

pub async fn login(state: web::Data<AppState>, req: HttpRequest, body: web::Json<LoginRequest>) -> ApiResult<HttpResponse> {
    state.rate_limiter.check(RouteClass::Login, &client_ip(&req)).await?;
    let ctx = device_context(&req, body.device_name.clone());
    let outcome = state.identity.login(&body.email, &body.password, ctx).await?;
    state.audit.record("user.login", Some(outcome.user.id), None, None, serde_json::json!({}), &audit_ctx(&req)).await?;
    Ok(HttpResponse::Ok().json(LoginResponse {
        user: state.identity.profile_of(outcome.user),
        access_token: outcome.access_token,
        refresh_token: outcome.issued_session.refresh_token,
        session_id: outcome.issued_session.session.id,
    }))
}

pub async fn login_with_second_factor(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<LoginWithSecondFactorRequest>,
) -> ApiResult<HttpResponse> {
    state.rate_limiter.check(RouteClass::Login, &client_ip(&req)).await?;
    let ctx = device_context(&req, body.device_name.clone());
    let outcome = state.identity.login_with_second_factor(&body.email, &body.password, &body.code, ctx).await?;
    state.audit.record("user.login", Some(outcome.user.id), None, None, serde_json::json!({ "second_factor": true }), &audit_ctx(&req)).await?;
    Ok(HttpResponse::Ok().json(LoginResponse {
        user: state.identity.profile_of(outcome.user),
        access_token: outcome.access_token,
        refresh_token: outcome.issued_session.refresh_token,
        session_id: outcome.issued_session.session.id,
    }))
}

pub async fn logout(state: web::Data<AppState>, req: HttpRequest, auth: AuthenticatedUser) -> ApiResult<HttpResponse> {
    state.identity.logout(&auth.user, auth.session_id).await?;
    state.audit.record("user.logout", Some(auth.user.id), None, None, serde_json::json!({}), &audit_ctx(&req)).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn me(state: web::Data<AppState>, auth: AuthenticatedUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.identity.profile_of(auth.user)))
}

pub async fn refresh(state: web::Data<AppState>, req: HttpRequest, body: web::Json<RefreshRequest>) -> ApiResult<HttpResponse> {
    state.rate_limiter.check(RouteClass::Refresh, &client_ip(&req)).await?;
    let issued = state.sessions.rotate(&body.refresh_token).await?;
    let access_token = state.jwt.generate_access_token(&issued.session.user_id.to_string(), &issued.session.id.to_string())?;
    Ok(HttpResponse::Ok().json(RefreshResponse { access_token, refresh_token: issued.refresh_token }))
}

pub async fn list_sessions(state: web::Data<AppState>, auth: AuthenticatedUser) -> ApiResult<HttpResponse> {
    let sessions = state.sessions.list_for_user(auth.user.id).await?;
    let body: Vec<_> = sessions.into_iter().map(|s| SessionResponse::from_session(s, Some(auth.session_id))).collect();
    Ok(HttpResponse::Ok().json(body))
}

pub async fn revoke_session(state: web::Data<AppState>, req: HttpRequest, auth: AuthenticatedUser, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let session_id = path.into_inner();
    state.sessions.revoke(session_id, auth.user.id).await?;
    state
        .audit
        .record("session.revoked", Some(auth.user.id), None, None, serde_json::json!({ "session_id": session_id }), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn revoke_all_sessions(state: web::Data<AppState>, req: HttpRequest, auth: AuthenticatedUser) -> ApiResult<HttpResponse> {
    let revoked_count = state.sessions.revoke_all(auth.user.id).await?;
    state
        .audit
        .record("session.revoked", Some(auth.user.id), None, None, serde_json::json!({ "revoked_count": revoked_count }), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::Ok().json(RevokeAllSessionsResponse { revoked_count }))
}

pub async fn request_password_reset(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<PasswordResetRequestRequest>,
) -> ApiResult<HttpResponse> {
    state.rate_limiter.check(RouteClass::PasswordResetRequest, &client_ip(&req)).await?;
    state.identity.request_password_reset(&body.email).await?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn complete_password_reset(state: web::Data<AppState>, body: web::Json<PasswordResetCompleteRequest>) -> ApiResult<HttpResponse> {
    state.identity.complete_password_reset(&body.token, &body.new_password).await?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn request_email_verification(state: web::Data<AppState>, auth: AuthenticatedUser) -> ApiResult<HttpResponse> {
    state.identity.request_email_verification(&auth.user).await?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn complete_email_verification(state: web::Data<AppState>, body: web::Json<EmailVerificationCompleteRequest>) -> ApiResult<HttpResponse> {
    state.identity.complete_email_verification(&body.token).await?;
    Ok(HttpResponse::Ok().finish())
}

// -- TOTP -----------------------------------------------------------------

pub async fn totp_status(state: web::Data<AppState>, auth: AuthenticatedUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(TotpStatusResponse { enabled: state.identity.totp_status(&auth.user).await }))
}

pub async fn totp_enroll(state: web::Data<AppState>, auth: AuthenticatedUser) -> ApiResult<HttpResponse> {
    let enrollment = state.identity.totp_begin_enroll(&auth.user).await?;
    Ok(HttpResponse::Ok().json(TotpEnrollResponse {
        secret_base32: enrollment.secret_base32,
        otpauth_url: enrollment.otpauth_uri,
        backup_codes: enrollment.backup_codes,
        backup_code_hashes: enrollment.backup_code_hashes,
    }))
}

pub async fn totp_verify(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    body: web::Json<TotpVerifyRequest>,
) -> ApiResult<HttpResponse> {
    state
        .identity
        .totp_verify_enable(&auth.user, &body.secret_base32, body.backup_code_hashes.clone(), &body.code)
        .await?;
    state.audit.record("totp.enabled", Some(auth.user.id), None, None, serde_json::json!({}), &audit_ctx(&req)).await?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn totp_disable(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    body: web::Json<TotpDisableRequest>,
) -> ApiResult<HttpResponse> {
    state.identity.totp_disable(&auth.user, &body.code).await?;
    state.audit.record("totp.disabled", Some(auth.user.id), None, None, serde_json::json!({}), &audit_ctx(&req)).await?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn public_key(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let key = state.relay.public_key();
    Ok(HttpResponse::Ok().json(PublicKeyResponse { key_id: key.key_id, public_key: key.public_key, algorithm: key.algorithm }))
}
