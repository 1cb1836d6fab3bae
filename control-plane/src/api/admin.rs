//! # Admin Handlers (§6: `/admin/users/*`, `/admin/audit-logs`)

use actix_web::{web, HttpRequest, HttpResponse};
use shared::ApiResult;
use uuid::Uuid;

use crate::api::dto::*;
use crate::api::extractors::{client_ip, user_agent, AdminUser, AppState};
use crate::repository::audit_repository::AuditQuery;
use crate::service::audit_service::RequestContext;

fn audit_ctx(req: &HttpRequest) -> RequestContext {
    RequestContext { ip_address: Some(client_ip(req)), user_agent: user_agent(req) }
}

pub async fn create_user(state: web::Data<AppState>, req: HttpRequest, admin: AdminUser, body: web::Json<AdminCreateUserRequest>) -> ApiResult<HttpResponse> {
    let user = state.identity.register(&body.email, &body.password, body.is_admin).await?;
    state
        .audit
        .record("user.created", Some(admin.0.id), Some(user.id), None, serde_json::json!({ "email": user.email }), &audit_ctx(&req))
        .await?;
    Ok(HttpResponse::Created().json(user_profile(user)))
}

pub async fn list_users(state: web::Data<AppState>, _admin: AdminUser, query: web::Query<ListQuery>) -> ApiResult<HttpResponse> {
    let users = state.users.list(query.limit, query.offset).await?;
    Ok(HttpResponse::Ok().json(users.into_iter().map(user_profile).collect::<Vec<_>>()))
}

pub async fn get_user(state: web::Data<AppState>, _admin: AdminUser, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let user = state.users.find_by_id(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user_profile(user)))
}

pub async fn update_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    admin: AdminUser,
    path: web::Path<Uuid>,
    body: web::Json<AdminUpdateUserRequest>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    if let Some(is_admin) = body.is_admin {
        state.users.set_is_admin(user_id, is_admin).await?;
    }
    if let Some(is_active) = body.is_active {
        state.users.set_is_active(user_id, is_active).await?;
    }
    let user = state.users.find_by_id(user_id).await?;
    state
        .audit
        .record(
            "user.updated",
            Some(admin.0.id),
            Some(user_id),
            None,
            serde_json::json!({ "is_admin": body.is_admin, "is_active": body.is_active }),
            &audit_ctx(&req),
        )
        .await?;
    Ok(HttpResponse::Ok().json(user_profile(user)))
}

pub async fn delete_user(state: web::Data<AppState>, req: HttpRequest, admin: AdminUser, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    state.users.delete(user_id).await?;
    state.audit.record("user.deleted", Some(admin.0.id), Some(user_id), None, serde_json::json!({}), &audit_ctx(&req)).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn audit_logs(state: web::Data<AppState>, _admin: AdminUser, query: web::Query<AuditLogQuery>) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    let entries = state
        .audit
        .query(AuditQuery {
            action: query.action,
            actor_user_id: query.actor_user_id,
            target_user_id: query.target_user_id,
            target_share_id: query.target_share_id,
            since: query.since,
            until: query.until,
            limit: query.limit,
            offset: query.offset,
        })
        .await?;
    Ok(HttpResponse::Ok().json(entries))
}
