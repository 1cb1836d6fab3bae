//! # Relay-Capability Handler (§6: `POST /tokens/relay`)

use actix_web::{web, HttpResponse};
use shared::ApiResult;

use crate::api::dto::*;
use crate::api::extractors::{AppState, OptionalUser};
use crate::service::crypto::RelayMode;
use crate::service::relay_service::RelayTokenRequest as ServiceRelayTokenRequest;

pub async fn issue_relay_token(state: web::Data<AppState>, optional: OptionalUser, body: web::Json<RelayTokenRequest>) -> ApiResult<HttpResponse> {
    let roles = match &optional.0 {
        Some(user) => state.shares.member_role_map(user.id).await?,
        None => Default::default(),
    };
    let body = body.into_inner();
    let req = ServiceRelayTokenRequest {
        share_id: body.share_id,
        doc_id: body.doc_id,
        mode: match body.mode {
            RelayModeDto::Read => RelayMode::Read,
            RelayModeDto::Write => RelayMode::Write,
        },
        file_path: body.file_path,
        password: body.password,
    };
    let response = state.relay.issue_relay_token(optional.0.as_ref(), |share_id| roles.get(&share_id).copied(), req).await?;
    Ok(HttpResponse::Ok().json(RelayTokenResponse {
        relay_url: response.relay_url,
        token: response.token,
        doc_id: response.doc_id,
        expires_at: response.expires_at,
    }))
}
