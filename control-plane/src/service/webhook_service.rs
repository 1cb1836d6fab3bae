//! # Webhook Subsystem (C10)
//!
//! Subscription CRUD with SSRF-aware URL validation, event matching,
//! delivery attempts with the fixed retry schedule from §4.9, and
//! auto-disable/re-enable per §4.13's webhook state machine.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use std::time::Duration;

use chrono::Utc;
use shared::{ApiError, ApiResult};
use uuid::Uuid;

use crate::domain::entities::{DeliveryStatus, Webhook, WebhookDelivery};
use crate::domain::events::EventEnvelope;
use crate::repository::webhook_repository::NewWebhook;
use crate::repository::WebhookRepository;
use crate::service::crypto;

/// Seconds from first failure for each of the six attempts (§4.9).
const RETRY_SCHEDULE_SECS: [i64; 6] = [60, 300, 900, 3600, 21600, 86400];
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "RelayOnPrem-Webhooks/1.0";
const AUTO_DISABLE_THRESHOLD: i32 = 10;

#[derive(Clone)]
pub struct WebhookService {
    repo: WebhookRepository,
    http: reqwest::Client,
    allow_insecure_http: bool,
}

pub struct NewWebhookRequest {
    pub user_id: Option<Uuid>,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
}

impl WebhookService {
    pub fn new(repo: WebhookRepository, allow_insecure_http: bool) -> Self {
        let http = reqwest::Client::builder().timeout(DELIVERY_TIMEOUT).build().expect("static reqwest config is valid");
        Self { repo, http, allow_insecure_http }
    }

    pub async fn create(&self, req: NewWebhookRequest) -> ApiResult<(Webhook, String)> {
        validate_url(&req.url, self.allow_insecure_http)?;
        validate_events(&req.events, req.user_id.is_none())?;

        let secret = crypto::generate_opaque_token();
        let webhook = self
            .repo
            .create(NewWebhook { user_id: req.user_id, name: req.name, url: req.url, secret: secret.clone(), events: req.events })
            .await?;
        Ok((webhook, secret))
    }

    pub async fn update(&self, id: Uuid, name: &str, url: &str, events: Vec<String>, active: bool) -> ApiResult<Webhook> {
        let existing = self.repo.find_by_id(id).await?;
        validate_url(url, self.allow_insecure_http)?;
        validate_events(&events, existing.is_admin_scoped())?;
        self.repo.update(id, name, url, events, active).await
    }

    pub async fn rotate_secret(&self, id: Uuid) -> ApiResult<String> {
        let new_secret = crypto::generate_opaque_token();
        self.repo.rotate_secret(id, &new_secret).await?;
        Ok(new_secret)
    }

    pub async fn delete(&self, id: Uuid) -> ApiResult<()> {
        self.repo.delete(id).await
    }

    pub async fn find(&self, id: Uuid) -> ApiResult<Webhook> {
        self.repo.find_by_id(id).await
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> ApiResult<Vec<Webhook>> {
        self.repo.list_for_user(user_id).await
    }

    pub async fn list_admin_global(&self) -> ApiResult<Vec<Webhook>> {
        self.repo.list_admin_global().await
    }

    /// `find_matching_webhooks` (§4.9): active subscriptions whose event
    /// set contains `event_type`, scoped to the originating user plus
    /// admin/global; admin-only events only match admin/global.
    pub async fn find_matching(&self, event_type: &str, originating_user_id: Option<Uuid>, is_admin_only: bool) -> ApiResult<Vec<Webhook>> {
        let candidates = self.repo.list_active_candidates(originating_user_id).await?;
        Ok(candidates
            .into_iter()
            .filter(|w| w.event_set().iter().any(|e| e == event_type))
            .filter(|w| !is_admin_only || w.is_admin_scoped())
            .collect())
    }

    /// Enqueues and immediately attempts one delivery per matching webhook
    /// for `envelope`. Matching is run once by the caller (`notification_service`);
    /// this method performs the HTTP attempt and records the outcome.
    pub async fn enqueue_and_attempt(&self, webhook: &Webhook, envelope: &EventEnvelope) -> ApiResult<WebhookDelivery> {
        let payload = envelope.to_webhook_payload();
        let delivery = self.repo.create_delivery(webhook.id, envelope.event_id, envelope.event_type, payload).await?;
        self.attempt(webhook, &delivery).await
    }

    /// Sends one HTTP attempt for `delivery` and records the outcome per
    /// §4.9's rules; returns the updated delivery row.
    pub async fn attempt(&self, webhook: &Webhook, delivery: &WebhookDelivery) -> ApiResult<WebhookDelivery> {
        let body = serde_json::to_vec(&delivery.payload).unwrap_or_default();
        let signature = crypto::sign_webhook_payload(&webhook.secret, &body);

        let send_result = self
            .http
            .post(&webhook.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .header("X-Relay-Event", delivery.event_type.clone())
            .header("X-Relay-Delivery", delivery.id.to_string())
            .header("X-Relay-Signature", signature)
            .body(body)
            .send()
            .await;

        let next_attempt_number = delivery.attempt_count + 1;

        match send_result {
            Ok(response) => {
                let status = response.status();
                let response_body = response.text().await.ok();

                if status.is_success() {
                    self.repo.reset_failure_count(webhook.id).await?;
                    return self.repo.record_attempt(delivery.id, DeliveryStatus::Success, Some(status.as_u16() as i32), response_body, None).await;
                }

                let transient = status.as_u16() == 429 || status.is_server_error();
                if transient {
                    self.record_failure_and_maybe_retry(webhook, delivery, next_attempt_number, Some(status.as_u16() as i32), response_body).await
                } else {
                    self.repo.increment_failure_count(webhook.id).await?;
                    self.repo.record_attempt(delivery.id, DeliveryStatus::Failed, Some(status.as_u16() as i32), response_body, None).await
                }
            }
            Err(_) => self.record_failure_and_maybe_retry(webhook, delivery, next_attempt_number, None, None).await,
        }
    }

    async fn record_failure_and_maybe_retry(
        &self,
        webhook: &Webhook,
        delivery: &WebhookDelivery,
        next_attempt_number: i32,
        response_status_code: Option<i32>,
        response_body: Option<String>,
    ) -> ApiResult<WebhookDelivery> {
        let schedule_index = (next_attempt_number - 1) as usize;
        if let Some(&delay_secs) = RETRY_SCHEDULE_SECS.get(schedule_index) {
            let next_retry_at = Utc::now() + chrono::Duration::seconds(delay_secs);
            self.repo
                .record_attempt(delivery.id, DeliveryStatus::Pending, response_status_code, response_body, Some(next_retry_at))
                .await
        } else {
            self.repo.increment_failure_count(webhook.id).await?;
            self.repo
                .record_attempt(delivery.id, DeliveryStatus::MaxRetriesExceeded, response_status_code, response_body, None)
                .await
        }
    }

    /// The delivery-worker loop body: pops due deliveries and retries each.
    /// Intended to be called on a periodic interval from `main`.
    pub async fn process_due_deliveries(&self, batch_size: i64) -> ApiResult<usize> {
        let due = self.repo.due_deliveries(batch_size).await?;
        let mut attempted = 0;
        for delivery in due {
            let webhook = self.repo.find_by_id(delivery.webhook_id).await?;
            if !webhook.active {
                continue;
            }
            self.attempt(&webhook, &delivery).await?;
            attempted += 1;
        }
        Ok(attempted)
    }

    /// `POST /webhooks/{id}/test`: synthesizes a `ping` event and delivers
    /// it immediately.
    pub async fn test_ping(&self, webhook: &Webhook) -> ApiResult<WebhookDelivery> {
        let payload = serde_json::json!({
            "event_id": Uuid::new_v4(),
            "event_type": "ping",
            "timestamp": Utc::now().to_rfc3339(),
            "data": {},
            "context": null,
        });
        let delivery = self.repo.create_delivery(webhook.id, Uuid::new_v4(), "ping", payload).await?;
        self.attempt(webhook, &delivery).await
    }
}

/// Closed event-type vocabulary (§6), including the synthetic `ping` used
/// only for test deliveries.
const ADMIN_ONLY_EVENTS: [&str; 3] = ["user.created", "user.updated", "user.deleted"];
const ALL_EVENTS: [&str; 21] = [
    "share.created", "share.updated", "share.deleted",
    "share.member.added", "share.member.updated", "share.member.removed",
    "invite.created", "invite.redeemed", "invite.revoked",
    "user.login", "user.logout", "user.password_reset",
    "session.created", "session.revoked",
    "oauth.login", "oauth.account.linked",
    "totp.enabled", "totp.disabled",
    "user.created", "user.updated", "user.deleted",
];

fn validate_events(events: &[String], is_admin_scoped: bool) -> ApiResult<()> {
    for event in events {
        if event == "ping" {
            continue;
        }
        if !ALL_EVENTS.contains(&event.as_str()) {
            return Err(ApiError::Validation(format!("unknown event type: {event}")));
        }
        if ADMIN_ONLY_EVENTS.contains(&event.as_str()) && !is_admin_scoped {
            return Err(ApiError::Validation(format!("{event} may only be subscribed by an admin/global webhook")));
        }
    }
    Ok(())
}

/// SSRF-aware URL validation (§4.9): HTTPS required outside debug builds;
/// loopback/private/reserved IPs and `.local`/`.internal` hostnames rejected.
fn validate_url(url: &str, allow_insecure_http: bool) -> ApiResult<()> {
    let parsed = url::Url::parse(url).map_err(|_| ApiError::Validation("invalid webhook URL".into()))?;

    if parsed.scheme() != "https" && !(allow_insecure_http && parsed.scheme() == "http") {
        return Err(ApiError::Validation("webhook URL must use https".into()));
    }

    let host = parsed.host_str().ok_or_else(|| ApiError::Validation("webhook URL must have a host".into()))?;
    if host.ends_with(".local") || host.ends_with(".internal") || host == "localhost" {
        return Err(ApiError::Validation("webhook URL may not target a local/internal hostname".into()));
    }

    if let Ok(addrs) = (host, parsed.port().unwrap_or(443)).to_socket_addrs() {
        for addr in addrs {
            if is_disallowed_ip(addr.ip()) {
                return Err(ApiError::Validation("webhook URL resolves to a disallowed address".into()));
            }
        }
    }

    Ok(())
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_disallowed_ipv4(v4),
        IpAddr::V6(v6) => is_disallowed_ipv6(v6),
    }
}

fn is_disallowed_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_broadcast() || ip.is_unspecified()
}

fn is_disallowed_ipv6(ip: Ipv6Addr) -> bool {
    ip.is_loopback() || ip.is_unspecified() || ip.segments()[0] & 0xfe00 == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_plain_http_by_default() {
        assert!(validate_url("http://example.com/hook", false).is_err());
    }

    #[test]
    fn accepts_https() {
        assert!(validate_url("https://example.com/hook", false).is_ok());
    }

    #[test]
    fn rejects_dot_local_hostnames() {
        assert!(validate_url("https://hook.local/endpoint", false).is_err());
    }

    #[test]
    fn rejects_dot_internal_hostnames() {
        assert!(validate_url("https://hook.internal/endpoint", false).is_err());
    }

    #[test]
    fn rejects_unknown_event_type() {
        assert!(validate_events(&["not.a.real.event".to_string()], true).is_err());
    }

    #[test]
    fn rejects_admin_only_event_on_user_scoped_webhook() {
        assert!(validate_events(&["user.created".to_string()], false).is_err());
    }

    #[test]
    fn allows_admin_only_event_on_admin_scoped_webhook() {
        assert!(validate_events(&["user.created".to_string()], true).is_ok());
    }

    #[test]
    fn retry_schedule_matches_spec_intervals() {
        assert_eq!(RETRY_SCHEDULE_SECS, [60, 300, 900, 3600, 21600, 86400]);
    }

    #[test]
    fn loopback_and_private_ipv4_are_disallowed() {
        assert!(is_disallowed_ipv4(Ipv4Addr::new(127, 0, 0, 1)));
        assert!(is_disallowed_ipv4(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(is_disallowed_ipv4(Ipv4Addr::new(192, 168, 1, 1)));
        assert!(!is_disallowed_ipv4(Ipv4Addr::new(93, 184, 216, 34)));
    }
}
