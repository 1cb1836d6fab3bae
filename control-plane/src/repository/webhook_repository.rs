//! # Webhook Repository

use chrono::{DateTime, Utc};
use shared::{ApiError, ApiResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{DeliveryStatus, Webhook, WebhookDelivery};

#[derive(Clone)]
pub struct WebhookRepository {
    pool: PgPool,
}

pub struct NewWebhook {
    pub user_id: Option<Uuid>,
    pub name: String,
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
}

impl WebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_webhook: NewWebhook) -> ApiResult<Webhook> {
        Ok(sqlx::query_as::<_, Webhook>(
            r#"
            INSERT INTO webhooks (id, user_id, name, url, secret, events, active, failure_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, true, 0, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_webhook.user_id)
        .bind(&new_webhook.name)
        .bind(&new_webhook.url)
        .bind(&new_webhook.secret)
        .bind(serde_json::json!(new_webhook.events))
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> ApiResult<Webhook> {
        sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("webhook not found".into()))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> ApiResult<Vec<Webhook>> {
        Ok(sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn list_admin_global(&self) -> ApiResult<Vec<Webhook>> {
        Ok(sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE user_id IS NULL ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Active webhooks eligible to receive `event_type`, scoped to the
    /// originating user plus admin/global subscriptions (§4.9). Narrowing by
    /// `events @> [...]` and admin-only eligibility happens in the service
    /// layer once rows are loaded, since `events` is a JSON column here.
    pub async fn list_active_candidates(&self, originating_user_id: Option<Uuid>) -> ApiResult<Vec<Webhook>> {
        Ok(match originating_user_id {
            Some(user_id) => {
                sqlx::query_as::<_, Webhook>(
                    "SELECT * FROM webhooks WHERE active = true AND (user_id = $1 OR user_id IS NULL)",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE active = true AND user_id IS NULL")
                    .fetch_all(&self.pool)
                    .await?
            }
        })
    }

    pub async fn update(&self, id: Uuid, name: &str, url: &str, events: Vec<String>, active: bool) -> ApiResult<Webhook> {
        Ok(sqlx::query_as::<_, Webhook>(
            "UPDATE webhooks SET name = $1, url = $2, events = $3, active = $4, failure_count = CASE WHEN $4 AND NOT active THEN 0 ELSE failure_count END WHERE id = $5 RETURNING *",
        )
        .bind(name)
        .bind(url)
        .bind(serde_json::json!(events))
        .bind(active)
        .bind(id)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn rotate_secret(&self, id: Uuid, new_secret: &str) -> ApiResult<Webhook> {
        Ok(sqlx::query_as::<_, Webhook>("UPDATE webhooks SET secret = $1 WHERE id = $2 RETURNING *")
            .bind(new_secret)
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn increment_failure_count(&self, id: Uuid) -> ApiResult<i32> {
        let row: (i32,) = sqlx::query_as(
            "UPDATE webhooks SET failure_count = failure_count + 1, active = (failure_count + 1 < 10) WHERE id = $1 RETURNING failure_count",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn reset_failure_count(&self, id: Uuid) -> ApiResult<()> {
        sqlx::query("UPDATE webhooks SET failure_count = 0 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1").bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("webhook not found".into()));
        }
        Ok(())
    }

    // -- deliveries -------------------------------------------------------

    pub async fn create_delivery(
        &self,
        webhook_id: Uuid,
        event_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> ApiResult<WebhookDelivery> {
        Ok(sqlx::query_as::<_, WebhookDelivery>(
            r#"
            INSERT INTO webhook_deliveries (id, webhook_id, event_id, event_type, payload, status, attempt_count, created_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', 0, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(webhook_id)
        .bind(event_id)
        .bind(event_type)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn due_deliveries(&self, limit: i64) -> ApiResult<Vec<WebhookDelivery>> {
        Ok(sqlx::query_as::<_, WebhookDelivery>(
            "SELECT * FROM webhook_deliveries WHERE status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= now()) ORDER BY next_retry_at NULLS FIRST LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn record_attempt(
        &self,
        delivery_id: Uuid,
        status: DeliveryStatus,
        response_status_code: Option<i32>,
        response_body: Option<String>,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> ApiResult<WebhookDelivery> {
        let truncated = response_body.map(|b| truncate_utf8(&b, 1024));
        Ok(sqlx::query_as::<_, WebhookDelivery>(
            r#"
            UPDATE webhook_deliveries
            SET status = $1, response_status_code = $2, response_body = $3,
                attempt_count = attempt_count + 1, next_retry_at = $4
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(response_status_code)
        .bind(truncated)
        .bind(next_retry_at)
        .bind(delivery_id)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn find_delivery(&self, id: Uuid) -> ApiResult<WebhookDelivery> {
        sqlx::query_as::<_, WebhookDelivery>("SELECT * FROM webhook_deliveries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("delivery not found".into()))
    }
}

/// Truncates to at most `max_bytes` bytes on a UTF-8 char boundary, never
/// splitting a multi-byte character.
fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_utf8_respects_byte_cap_not_char_count() {
        let body = "\u{1F600}".repeat(300); // 4 bytes each, 1200 bytes total
        let truncated = truncate_utf8(&body, 1024);
        assert!(truncated.len() <= 1024);
        assert!(truncated.is_char_boundary(truncated.len()));
    }

    #[test]
    fn truncate_utf8_is_a_no_op_under_the_cap() {
        assert_eq!(truncate_utf8("short", 1024), "short");
    }
}
