//! # Webhook Handlers (§6: `/webhooks/*`, `/admin/webhooks/*`)

use actix_web::{web, HttpRequest, HttpResponse};
use shared::{ApiError, ApiResult};
use uuid::Uuid;

use crate::api::dto::*;
use crate::api::extractors::{client_ip, user_agent, AdminUser, AppState, AuthenticatedUser};
use crate::service::audit_service::RequestContext;
use crate::service::rate_limiter::RouteClass;
use crate::service::webhook_service::NewWebhookRequest;

fn require_owner_or_admin(user_id: Uuid, is_admin: bool, webhook: &crate::domain::entities::Webhook) -> ApiResult<()> {
    if is_admin || webhook.user_id == Some(user_id) {
        return Ok(());
    }
    Err(ApiError::Forbidden("you do not own this webhook".into()))
}

fn audit_ctx(req: &HttpRequest) -> RequestContext {
    RequestContext { ip_address: Some(client_ip(req)), user_agent: user_agent(req) }
}

pub async fn create_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    body: web::Json<CreateWebhookRequest>,
) -> ApiResult<HttpResponse> {
    state.rate_limiter.check(RouteClass::WebhookCreate, &client_ip(&req)).await?;
    let (webhook, secret) = state
        .webhooks
        .create(NewWebhookRequest { user_id: Some(auth.user.id), name: body.name.clone(), url: body.url.clone(), events: body.events.clone() })
        .await?;
    state
        .audit
        .record("webhook.created", Some(auth.user.id), None, None, serde_json::json!({ "webhook_id": webhook.id }), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::Created().json(CreatedWebhookResponse { webhook: WebhookResponse::from(webhook), secret }))
}

pub async fn list_webhooks(state: web::Data<AppState>, auth: AuthenticatedUser) -> ApiResult<HttpResponse> {
    let webhooks = state.webhooks.list_for_user(auth.user.id).await?;
    Ok(HttpResponse::Ok().json(webhooks.into_iter().map(WebhookResponse::from).collect::<Vec<_>>()))
}

pub async fn create_admin_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    admin: AdminUser,
    body: web::Json<CreateWebhookRequest>,
) -> ApiResult<HttpResponse> {
    state.rate_limiter.check(RouteClass::WebhookCreate, &client_ip(&req)).await?;
    let (webhook, secret) = state
        .webhooks
        .create(NewWebhookRequest { user_id: None, name: body.name.clone(), url: body.url.clone(), events: body.events.clone() })
        .await?;
    state
        .audit
        .record("webhook.created", Some(admin.0.id), None, None, serde_json::json!({ "webhook_id": webhook.id, "global": true }), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::Created().json(CreatedWebhookResponse { webhook: WebhookResponse::from(webhook), secret }))
}

pub async fn list_admin_webhooks(state: web::Data<AppState>, _admin: AdminUser) -> ApiResult<HttpResponse> {
    let webhooks = state.webhooks.list_admin_global().await?;
    Ok(HttpResponse::Ok().json(webhooks.into_iter().map(WebhookResponse::from).collect::<Vec<_>>()))
}

pub async fn update_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    auth: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateWebhookRequest>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let existing = state.webhooks.find(id).await?;
    require_owner_or_admin(auth.user.id, auth.user.is_admin, &existing)?;
    let updated = state.webhooks.update(id, &body.name, &body.url, body.events.clone(), body.active).await?;
    state.audit.record("webhook.updated", Some(auth.user.id), None, None, serde_json::json!({ "webhook_id": id }), &audit_ctx(&req)).await?;
    Ok(HttpResponse::Ok().json(WebhookResponse::from(updated)))
}

pub async fn delete_webhook(state: web::Data<AppState>, req: HttpRequest, auth: AuthenticatedUser, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let existing = state.webhooks.find(id).await?;
    require_owner_or_admin(auth.user.id, auth.user.is_admin, &existing)?;
    state.webhooks.delete(id).await?;
    state.audit.record("webhook.deleted", Some(auth.user.id), None, None, serde_json::json!({ "webhook_id": id }), &audit_ctx(&req)).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn rotate_secret(state: web::Data<AppState>, req: HttpRequest, auth: AuthenticatedUser, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let existing = state.webhooks.find(id).await?;
    require_owner_or_admin(auth.user.id, auth.user.is_admin, &existing)?;
    let secret = state.webhooks.rotate_secret(id).await?;
    state
        .audit
        .record("webhook.secret_rotated", Some(auth.user.id), None, None, serde_json::json!({ "webhook_id": id }), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::Ok().json(RotateSecretResponse { secret }))
}

pub async fn test_webhook(state: web::Data<AppState>, auth: AuthenticatedUser, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let webhook = state.webhooks.find(id).await?;
    require_owner_or_admin(auth.user.id, auth.user.is_admin, &webhook)?;
    let delivery = state.webhooks.test_ping(&webhook).await?;
    Ok(HttpResponse::Ok().json(WebhookDeliveryResponse::from(delivery)))
}
