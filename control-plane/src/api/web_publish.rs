//! # Web-Publishing Handlers (§6: `/shares/{id}/web`, `/w/{slug}`; §4.14)

use actix_web::{web, HttpRequest, HttpResponse};
use shared::{ApiError, ApiResult};
use uuid::Uuid;

use crate::api::dto::*;
use crate::api::extractors::{client_ip, require_password_header, user_agent, AppState, AuthenticatedUser, OptionalUser};
use crate::domain::entities::Share;
use crate::service::audit_service::RequestContext;
use crate::service::authz_service::{self, Action, Decision};
use crate::service::crypto::RelayMode;
use crate::service::rate_limiter::RouteClass;

fn require_owner_or_admin(user: &crate::domain::entities::User, share: &Share) -> ApiResult<()> {
    if user.is_admin || user.id == share.owner_user_id {
        return Ok(());
    }
    Err(ApiError::Forbidden("only the share's owner or an administrator may do this".into()))
}

fn audit_ctx(req: &HttpRequest) -> RequestContext {
    RequestContext { ip_address: Some(client_ip(req)), user_agent: user_agent(req) }
}

fn require_enabled(state: &AppState) -> ApiResult<()> {
    if !state.web_publishing_enabled {
        return Err(ApiError::NotFound("web publishing is not enabled on this instance".into()));
    }
    Ok(())
}

pub async fn get_web_metadata(
    state: web::Data<AppState>,
    req: HttpRequest,
    optional: OptionalUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    require_enabled(&state)?;
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
    Ok(HttpResponse::Ok().json(WebPublishedResponse::from_share(&share)))
}

pub async fn publish_share(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<PublishShareRequest>,
) -> ApiResult<HttpResponse> {
    require_enabled(&state)?;
    let share_id = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    let published = state.shares.publish(share_id, body.slug.as_deref(), body.noindex).await?;
    state
        .audit
        .record(
            "share.web.published",
            Some(auth.user.id),
            None,
            Some(share_id),
            serde_json::json!({ "web_slug": published.web_slug }),
            &audit_ctx(&req),
        )
        .await?;
    Ok(HttpResponse::Ok().json(WebPublishedResponse::from_share(&published)))
}

pub async fn unpublish_share(state: web::Data<AppState>, req: HttpRequest, auth: AuthenticatedUser, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    require_enabled(&state)?;
    let share_id = path.into_inner();
    let share = state.shares.find(share_id).await?;
    require_owner_or_admin(&auth.user, &share)?;
    state.shares.unpublish(share_id).await?;
    state.audit.record("share.web.unpublished", Some(auth.user.id), None, Some(share_id), serde_json::json!({}), &audit_ctx(&req)).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn sync_doc_content(
    state: web::Data<AppState>,
    req: HttpRequest,
    optional: OptionalUser,
    path: web::Path<Uuid>,
    body: web::Json<SyncDocContentRequest>,
) -> ApiResult<HttpResponse> {
    require_enabled(&state)?;
    state.rate_limiter.check(RouteClass::WebContentSync, &client_ip(&req)).await?;
    let share_id = path.into_inner();
    let share = state.shares.find(share_id).await?;
    crate::service::share_service::ShareService::validate_asset_upload_size(body.content.len() as u64)?;
    authorize_write(&state, &req, &optional, &share).await?;
    let updated = state.shares.sync_doc_content(share_id, &body.content, body.doc_id.as_deref()).await?;
    state
        .audit
        .record(
            "share.web.content_synced",
            optional.0.as_ref().map(|u| u.id),
            None,
            Some(share_id),
            serde_json::json!({ "doc_id": body.doc_id }),
            &audit_ctx(&req),
        )
        .await?;
    Ok(HttpResponse::Ok().json(WebPublishedResponse::from_share(&updated)))
}

pub async fn sync_folder_items(
    state: web::Data<AppState>,
    req: HttpRequest,
    optional: OptionalUser,
    path: web::Path<Uuid>,
    body: web::Json<SyncFolderItemsRequest>,
) -> ApiResult<HttpResponse> {
    require_enabled(&state)?;
    state.rate_limiter.check(RouteClass::WebContentSync, &client_ip(&req)).await?;
    let share_id = path.into_inner();
    let share = state.shares.find(share_id).await?;
    authorize_write(&state, &req, &optional, &share).await?;
    let updated = state.shares.sync_folder_items(share_id, body.items.clone()).await?;
    state
        .audit
        .record(
            "share.web.items_synced",
            optional.0.as_ref().map(|u| u.id),
            None,
            Some(share_id),
            serde_json::json!({ "item_count": body.items.len() }),
            &audit_ctx(&req),
        )
        .await?;
    Ok(HttpResponse::Ok().json(WebPublishedResponse::from_share(&updated)))
}

async fn authorize_write(state: &web::Data<AppState>, req: &HttpRequest, optional: &OptionalUser, share: &Share) -> ApiResult<()> {
    let role = match &optional.0 {
        Some(user) => state.shares.find_member(share.id, user.id).await?.map(|m| m.role),
        None => None,
    };
    let password = require_password_header(req);
    if authz_service::authorize(optional.0.as_ref(), share, Action::Write, role, password.as_deref()) != Decision::Allow {
        return Err(ApiError::Forbidden("you do not have write access to this share".into()));
    }
    Ok(())
}

/// `GET /w/{slug}/token`: a read-only relay token for the viewer of a
/// published share, gated the same way the public lookup is -- public shares
/// need nothing, protected ones need the share password, private shares
/// can't be reached through the web surface at all.
pub async fn get_web_relay_token(
    state: web::Data<AppState>,
    req: HttpRequest,
    slug: web::Path<String>,
    query: web::Query<WebPasswordQuery>,
) -> ApiResult<HttpResponse> {
    require_enabled(&state)?;
    if query.password.is_some() {
        state.rate_limiter.check(RouteClass::WebPassword, &client_ip(&req)).await?;
    }
    let share = state.shares.find_published_by_slug(&slug.into_inner()).await?;
    let doc_id = share.web_doc_id.clone().ok_or_else(|| ApiError::NotFound("real-time sync is not configured for this share".into()))?;

    let relay_req = crate::service::relay_service::RelayTokenRequest {
        share_id: share.id,
        doc_id,
        mode: RelayMode::Read,
        file_path: None,
        password: query.password.clone(),
    };
    let response = state.relay.issue_relay_token(None, |_| None, relay_req).await?;
    Ok(HttpResponse::Ok().json(RelayTokenResponse {
        relay_url: response.relay_url,
        token: response.token,
        doc_id: response.doc_id,
        expires_at: response.expires_at,
    }))
}

/// `GET /w/{slug}`: the fully public lookup, no membership involved.
pub async fn public_lookup(
    state: web::Data<AppState>,
    req: HttpRequest,
    slug: web::Path<String>,
    query: web::Query<WebPasswordQuery>,
) -> ApiResult<HttpResponse> {
    require_enabled(&state)?;
    if query.password.is_some() {
        state.rate_limiter.check(RouteClass::WebPassword, &client_ip(&req)).await?;
    }
    let share = state.shares.find_published_by_slug(&slug.into_inner()).await?;
    if authz_service::authorize(None, &share, Action::Read, None, query.password.as_deref()) != Decision::Allow {
        return Err(ApiError::Forbidden("a password is required".into()));
    }
    Ok(HttpResponse::Ok().json(WebPublishedResponse::from_share(&share)))
}
