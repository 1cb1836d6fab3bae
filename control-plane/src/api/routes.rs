//! # Route Configuration
//!
//! Every resource route is declared once in [`resource_routes`] and mounted
//! twice by [`configure`]: under `/v1` and again at the root, per §5's
//! "versioned prefix plus compatibility mirror" requirement. `/health` is
//! mounted once, unversioned.

use actix_web::{web, HttpResponse};
use shared::ApiResult;
use sqlx::PgPool;

use crate::api::{admin, auth, oauth, relay, shares, web_publish, webhooks};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .service(web::scope("/v1").configure(resource_routes))
        .service(web::scope("").configure(resource_routes));
}

async fn health_check(pool: web::Data<PgPool>) -> ApiResult<HttpResponse> {
    if shared::database::health_check(&pool).await {
        Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })))
    } else {
        Ok(HttpResponse::ServiceUnavailable().json(serde_json::json!({ "status": "degraded" })))
    }
}

fn resource_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(auth::register))
            .route("/login", web::post().to(auth::login))
            .route("/login/2fa", web::post().to(auth::login_with_second_factor))
            .route("/logout", web::post().to(auth::logout))
            .route("/me", web::get().to(auth::me))
            .route("/refresh", web::post().to(auth::refresh))
            .route("/sessions", web::get().to(auth::list_sessions))
            .route("/sessions", web::delete().to(auth::revoke_all_sessions))
            .route("/sessions/{id}", web::delete().to(auth::revoke_session))
            .route("/password-reset/request", web::post().to(auth::request_password_reset))
            .route("/password-reset/complete", web::post().to(auth::complete_password_reset))
            .route("/email/verify/request", web::post().to(auth::request_email_verification))
            .route("/email/verify/complete", web::post().to(auth::complete_email_verification))
            .route("/2fa/status", web::get().to(auth::totp_status))
            .route("/2fa/enable", web::post().to(auth::totp_enroll))
            .route("/2fa/verify", web::post().to(auth::totp_verify))
            .route("/2fa/disable", web::post().to(auth::totp_disable))
            .route("/oauth/providers", web::get().to(oauth::list_providers))
            .route("/oauth/{provider}/authorize", web::get().to(oauth::authorize))
            .route("/oauth/{provider}/callback", web::get().to(oauth::callback)),
    )
    .route("/tokens/relay", web::post().to(relay::issue_relay_token))
    .route("/tokens/relay/public-key", web::get().to(auth::public_key))
    .service(
        web::scope("/shares")
            .route("", web::post().to(shares::create_share))
            .route("", web::get().to(shares::list_my_shares))
            .route("/{id}", web::get().to(shares::get_share))
            .route("/{id}", web::patch().to(shares::update_share_visibility))
            .route("/{id}/path", web::patch().to(shares::update_share_path))
            .route("/{id}", web::delete().to(shares::delete_share))
            .route("/{id}/members", web::get().to(shares::list_members))
            .route("/{id}/members", web::post().to(shares::add_member))
            .route("/{id}/members/{user_id}", web::patch().to(shares::update_member))
            .route("/{id}/members/{user_id}", web::delete().to(shares::remove_member))
            .route("/{id}/invites", web::post().to(shares::create_invite))
            .route("/{id}/invites", web::get().to(shares::list_invites))
            .route("/{id}/invites/{invite_id}", web::delete().to(shares::revoke_invite))
            .route("/{id}/web", web::get().to(web_publish::get_web_metadata))
            .route("/{id}/web", web::post().to(web_publish::publish_share))
            .route("/{id}/web", web::delete().to(web_publish::unpublish_share))
            .route("/{id}/web/content", web::put().to(web_publish::sync_doc_content))
            .route("/{id}/web/items", web::put().to(web_publish::sync_folder_items)),
    )
    .service(
        web::scope("/invite")
            .route("/{token}", web::get().to(shares::invite_info))
            .route("/{token}/redeem", web::post().to(shares::redeem_invite)),
    )
    .route("/w/{slug}", web::get().to(web_publish::public_lookup))
    .route("/w/{slug}/token", web::get().to(web_publish::get_web_relay_token))
    .service(
        web::scope("/admin")
            .route("/users", web::post().to(admin::create_user))
            .route("/users", web::get().to(admin::list_users))
            .route("/users/{id}", web::get().to(admin::get_user))
            .route("/users/{id}", web::patch().to(admin::update_user))
            .route("/users/{id}", web::delete().to(admin::delete_user))
            .route("/audit-logs", web::get().to(admin::audit_logs))
            .route("/webhooks", web::post().to(webhooks::create_admin_webhook))
            .route("/webhooks", web::get().to(webhooks::list_admin_webhooks)),
    )
    .service(
        web::scope("/webhooks")
            .route("", web::post().to(webhooks::create_webhook))
            .route("", web::get().to(webhooks::list_webhooks))
            .route("/{id}", web::patch().to(webhooks::update_webhook))
            .route("/{id}", web::delete().to(webhooks::delete_webhook))
            .route("/{id}/rotate-secret", web::post().to(webhooks::rotate_secret))
            .route("/{id}/test", web::post().to(webhooks::test_webhook)),
    );
}

#[cfg(test)]
mod tests {
    // Route wiring is exercised end to end by the integration test suite,
    // which spins up the full App against a live database.
}
