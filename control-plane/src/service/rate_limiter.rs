//! # Rate Limiter (C13)
//!
//! Per-remote-IP counters on the routes enumerated in §4.12. Two
//! interchangeable backends per `RateLimitConfig::store`: `memory` (a
//! process-local `DashMap`-free mutex map, fine for a single node) or
//! `redis` (shared counters via `shared::redis_client::RedisClient`,
//! required for multi-node deployments). Both honor the same window
//! semantics: a fixed window of `window_secs` starting at first increment.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use shared::redis_client::RedisClient;
use shared::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy)]
pub enum RouteClass {
    Login,
    PasswordResetRequest,
    Refresh,
    InviteCreate,
    InviteRedeem,
    ShareCreate,
    MemberAdd,
    WebPassword,
    WebContentSync,
    WebAssetUpload,
    WebhookCreate,
}

impl RouteClass {
    /// `(max_requests, window)` per §4.12.
    fn limit(self) -> (u32, Duration) {
        match self {
            RouteClass::Login => (10, Duration::from_secs(60)),
            RouteClass::PasswordResetRequest => (3, Duration::from_secs(3600)),
            RouteClass::Refresh => (30, Duration::from_secs(60)),
            RouteClass::InviteCreate => (10, Duration::from_secs(60)),
            RouteClass::InviteRedeem => (10, Duration::from_secs(60)),
            RouteClass::ShareCreate => (20, Duration::from_secs(60)),
            RouteClass::MemberAdd => (30, Duration::from_secs(60)),
            RouteClass::WebPassword => (5, Duration::from_secs(60)),
            RouteClass::WebContentSync => (30, Duration::from_secs(60)),
            RouteClass::WebAssetUpload => (20, Duration::from_secs(60)),
            RouteClass::WebhookCreate => (10, Duration::from_secs(3600)),
        }
    }

    fn key_prefix(self) -> &'static str {
        match self {
            RouteClass::Login => "ratelimit:login",
            RouteClass::PasswordResetRequest => "ratelimit:pwreset",
            RouteClass::Refresh => "ratelimit:refresh",
            RouteClass::InviteCreate => "ratelimit:invite_create",
            RouteClass::InviteRedeem => "ratelimit:invite_redeem",
            RouteClass::ShareCreate => "ratelimit:share_create",
            RouteClass::MemberAdd => "ratelimit:member_add",
            RouteClass::WebPassword => "ratelimit:web_password",
            RouteClass::WebContentSync => "ratelimit:web_content_sync",
            RouteClass::WebAssetUpload => "ratelimit:web_asset_upload",
            RouteClass::WebhookCreate => "ratelimit:webhook_create",
        }
    }
}

enum Backend {
    Memory(Mutex<HashMap<String, (u32, Instant)>>),
    Redis(RedisClient),
}

pub struct RateLimiter {
    backend: Backend,
}

impl RateLimiter {
    pub fn in_memory() -> Self {
        Self { backend: Backend::Memory(Mutex::new(HashMap::new())) }
    }

    pub fn redis(client: RedisClient) -> Self {
        Self { backend: Backend::Redis(client) }
    }

    /// Increments the counter for `(route_class, remote_ip)`; returns `Err`
    /// with `RateLimited { retry_after_secs }` once the window's ceiling is
    /// exceeded (P10).
    pub async fn check(&self, route_class: RouteClass, remote_ip: &str) -> ApiResult<()> {
        let (max_requests, window) = route_class.limit();
        let key = format!("{}:{}", route_class.key_prefix(), remote_ip);

        let count = match &self.backend {
            Backend::Memory(map) => {
                let mut map = map.lock().expect("rate limiter mutex poisoned");
                let now = Instant::now();
                let entry = map.entry(key).or_insert((0, now));
                if now.duration_since(entry.1) > window {
                    *entry = (0, now);
                }
                entry.0 += 1;
                entry.0
            }
            Backend::Redis(client) => client.incr_with_ttl(&key, window.as_secs()).await? as u32,
        };

        if count > max_requests {
            return Err(ApiError::RateLimited { retry_after_secs: window.as_secs() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_requests_under_the_ceiling() {
        let limiter = RateLimiter::in_memory();
        for _ in 0..10 {
            limiter.check(RouteClass::Login, "203.0.113.1").await.unwrap();
        }
    }

    #[tokio::test]
    async fn rejects_the_n_plus_first_request() {
        let limiter = RateLimiter::in_memory();
        for _ in 0..10 {
            limiter.check(RouteClass::Login, "203.0.113.2").await.unwrap();
        }
        let result = limiter.check(RouteClass::Login, "203.0.113.2").await;
        assert!(matches!(result, Err(ApiError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn counters_are_independent_per_ip() {
        let limiter = RateLimiter::in_memory();
        for _ in 0..10 {
            limiter.check(RouteClass::Login, "203.0.113.3").await.unwrap();
        }
        limiter.check(RouteClass::Login, "203.0.113.4").await.unwrap();
    }

    #[tokio::test]
    async fn counters_are_independent_per_route_class() {
        let limiter = RateLimiter::in_memory();
        for _ in 0..10 {
            limiter.check(RouteClass::Login, "203.0.113.5").await.unwrap();
        }
        limiter.check(RouteClass::Refresh, "203.0.113.5").await.unwrap();
    }
}
