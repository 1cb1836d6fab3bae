//! # OAuth/OIDC Handlers (§6: `/auth/oauth/*`)

use actix_web::{web, HttpRequest, HttpResponse};
use shared::{ApiError, ApiResult};

use crate::api::dto::*;
use crate::api::extractors::{client_ip, forwarded_proto, user_agent, AppState};
use crate::service::audit_service::RequestContext;
use crate::service::oauth_service::{self, AuthorizeRequest};

fn audit_ctx(req: &HttpRequest) -> RequestContext {
    RequestContext { ip_address: Some(client_ip(req)), user_agent: user_agent(req) }
}

pub async fn list_providers(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    if !state.oauth_enabled {
        return Ok(HttpResponse::Ok().json(Vec::<OAuthProviderResponse>::new()));
    }
    let providers = state.oauth.list_enabled_providers().await?;
    Ok(HttpResponse::Ok().json(providers.into_iter().map(OAuthProviderResponse::from).collect::<Vec<_>>()))
}

pub async fn authorize(
    state: web::Data<AppState>,
    req: HttpRequest,
    provider: web::Path<String>,
    query: web::Query<OAuthAuthorizeQuery>,
) -> ApiResult<HttpResponse> {
    if !state.oauth_enabled {
        return Err(ApiError::NotFound("OAuth is not enabled on this instance".into()));
    }
    let redirect_uri = oauth_service::normalize_redirect_uri(&query.redirect_uri, forwarded_proto(&req).as_deref());
    let outcome = state
        .oauth
        .authorize(AuthorizeRequest { provider: provider.into_inner(), redirect_uri, return_url: query.return_url.clone() })
        .await?;
    Ok(HttpResponse::Ok().json(OAuthAuthorizeResponse { authorize_url: outcome.authorize_url, state: outcome.state }))
}

pub async fn callback(
    state: web::Data<AppState>,
    req: HttpRequest,
    provider: web::Path<String>,
    query: web::Query<OAuthCallbackQuery>,
) -> ApiResult<HttpResponse> {
    if !state.oauth_enabled {
        return Err(ApiError::NotFound("OAuth is not enabled on this instance".into()));
    }
    let provider_name = provider.into_inner();
    let outcome = state.oauth.callback(&provider_name, &query.code, &query.state).await?;
    state
        .audit
        .record(
            "oauth.login",
            Some(outcome.user.id),
            None,
            None,
            serde_json::json!({ "provider": provider_name }),
            &audit_ctx(&req),
        )
        .await?;
    Ok(HttpResponse::Ok().json(OAuthCallbackResponse {
        user: state.identity.profile_of(outcome.user),
        access_token: outcome.access_token,
        refresh_token: outcome.issued_session.refresh_token,
        return_url: outcome.return_url,
    }))
}
