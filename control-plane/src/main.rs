//! # Relay Control Plane
//!
//! Identity, shares/membership/invites, webhooks, audit, and relay-token
//! minting for the on-prem collaborative-editing relay (§1-§4). A single
//! binary, one Postgres database, optional Redis for distributed rate
//! limiting and the access-token blacklist.
//!
//! ## Architecture
//!
//! ```text
//! api/        one handler module per resource family, DTOs, extractors
//! service/    business logic, orchestrates repositories
//! repository/ one file per aggregate, raw sqlx queries
//! domain/     entities and the events services emit to NotificationService
//! ```
//!
//! ## Background work
//!
//! The only periodic task this binary runs itself is webhook delivery
//! retry (§4.9): `WebhookService::process_due_deliveries` is polled on an
//! interval. Queued emails (`EmailRepository::enqueue`) are left for a
//! separate sender worker -- SMTP transport is out of scope here (§1).

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use shared::auth::JwtService;
use shared::config::AppConfig;
use shared::{database, redis_client::RedisClient, tracing_config};
use tracing::{error, info, warn};

mod api;
mod domain;
mod repository;
mod service;

use api::extractors::AppState;
use repository::{
    AuditRepository, EmailRepository, InviteRepository, OAuthRepository, SessionRepository, ShareRepository, TokenRepository,
    UserRepository, WebhookRepository,
};
use service::audit_service::AuditService;
use service::crypto::RelaySigner;
use service::identity_service::IdentityService;
use service::invite_service::InviteService;
use service::notification_service::NotificationService;
use service::oauth_service::OAuthService;
use service::rate_limiter::RateLimiter;
use service::relay_service::RelayService;
use service::session_service::SessionService;
use service::share_service::ShareService;
use service::webhook_service::WebhookService;

const WEBHOOK_DELIVERY_POLL_INTERVAL: Duration = Duration::from_secs(15);
const WEBHOOK_DELIVERY_BATCH_SIZE: i64 = 25;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::from_env().expect("failed to load configuration");

    tracing_config::init_tracing("control-plane", config.is_production());

    info!(host = %config.server.host, port = %config.server.port, "starting relay control plane");

    let db_pool = database::create_pool(&config.database).await.expect("failed to create database pool");

    let rate_limiter = Arc::new(match config.rate_limit.store.as_str() {
        "redis" => {
            let redis = RedisClient::connect(&config.redis).await.expect("failed to connect to redis for rate limiting");
            RateLimiter::redis(redis)
        }
        _ => RateLimiter::in_memory(),
    });

    let jwt = JwtService::new(&config.jwt.secret, config.jwt.issuer.clone(), config.jwt.access_token_ttl_minutes);

    let users = UserRepository::new(db_pool.clone());
    let tokens = TokenRepository::new(db_pool.clone());
    let emails = EmailRepository::new(db_pool.clone());
    let sessions_repo = SessionRepository::new(db_pool.clone());
    let shares_repo = ShareRepository::new(db_pool.clone());
    let invites_repo = InviteRepository::new(db_pool.clone());
    let webhooks_repo = WebhookRepository::new(db_pool.clone());
    let oauth_repo = OAuthRepository::new(db_pool.clone());
    let audit_repo = AuditRepository::new(db_pool.clone());

    let webhooks = WebhookService::new(webhooks_repo, !config.is_production());
    let notifications = NotificationService::new(webhooks.clone(), users.clone(), emails.clone());
    let shares = ShareService::new(shares_repo, notifications.clone());
    let sessions = SessionService::new(sessions_repo, notifications.clone(), config.jwt.refresh_token_ttl_days);
    let identity = IdentityService::new(
        users.clone(),
        tokens,
        emails,
        sessions.clone(),
        jwt.clone(),
        notifications.clone(),
        config.jwt.password_reset_ttl_hours,
    );
    let invites = InviteService::new(invites_repo, users.clone(), identity.clone(), notifications.clone());
    let oauth = OAuthService::new(
        oauth_repo,
        users.clone(),
        sessions.clone(),
        jwt.clone(),
        notifications.clone(),
        config.oauth.admin_groups.clone(),
        &config.oauth.default_role,
    );

    let signer = Arc::new(RelaySigner::from_base64_or_generate(config.relay.private_key_base64.as_deref()).expect("invalid relay private key"));
    let relay = RelayService::new(shares.clone(), signer, config.relay.public_url.clone(), config.relay.issuer.clone(), config.relay.token_ttl_minutes);

    let audit = AuditService::new(audit_repo);

    if config.oauth.enabled {
        if let Err(e) = register_configured_oauth_provider(&oauth, &config).await {
            warn!(error = %e, "failed to register configured OAuth provider at startup");
        }
    }

    let app_state = web::Data::new(AppState {
        identity,
        sessions,
        shares,
        invites,
        oauth,
        relay,
        webhooks: webhooks.clone(),
        audit,
        rate_limiter,
        users,
        jwt,
        oauth_enabled: config.oauth.enabled,
        web_publishing_enabled: config.web_publishing.enabled,
    });
    let db_data = web::Data::new(db_pool);

    spawn_webhook_delivery_worker(webhooks);

    let bind_address = (config.server.host.clone(), config.server.port);
    let workers = config.server.workers;

    info!(address = ?bind_address, "listening");

    let server = HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .app_data(app_state.clone())
            .app_data(db_data.clone())
            .app_data(web::JsonConfig::default().limit(10 * 1024 * 1024))
            .configure(api::routes::configure)
    })
    .bind(bind_address)?;

    let server = match workers {
        Some(n) => server.workers(n),
        None => server,
    };

    server.run().await
}

/// Seeds/updates the single OAuth provider row named by `OAUTH_PROVIDER_NAME`
/// from the rest of the `OAUTH_*` env vars, so `OAuthService` has something
/// to look up on the first `/auth/oauth/{provider}/authorize` call.
async fn register_configured_oauth_provider(oauth: &OAuthService, config: &AppConfig) -> anyhow::Result<()> {
    use domain::entities::OAuthProvider;

    oauth
        .upsert_configured_provider(OAuthProvider {
            id: uuid::Uuid::new_v4(),
            name: config.oauth.provider_name.clone(),
            issuer_url: config.oauth.issuer_url.clone(),
            client_id: config.oauth.client_id.clone(),
            client_secret_encrypted: config.oauth.client_secret.clone(),
            enabled: true,
            auto_register: config.oauth.auto_register,
        })
        .await?;
    Ok(())
}

fn spawn_webhook_delivery_worker(webhooks: WebhookService) {
    actix_rt::spawn(async move {
        let mut interval = actix_rt::time::interval(WEBHOOK_DELIVERY_POLL_INTERVAL);
        loop {
            interval.tick().await;
            match webhooks.process_due_deliveries(WEBHOOK_DELIVERY_BATCH_SIZE).await {
                Ok(count) if count > 0 => info!(count, "processed due webhook deliveries"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "webhook delivery sweep failed"),
            }
        }
    });
}
