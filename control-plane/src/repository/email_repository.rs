//! # Email Queue Repository
//!
//! The SMTP transport itself is an excluded external collaborator (§1); this
//! repository only stages rows for a sender worker to pick up.

use shared::ApiResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::EmailQueueItem;

#[derive(Clone)]
pub struct EmailRepository {
    pool: PgPool,
}

pub struct NewEmail {
    pub to_email: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub email_type: String,
}

impl EmailRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, email: NewEmail) -> ApiResult<EmailQueueItem> {
        Ok(sqlx::query_as::<_, EmailQueueItem>(
            r#"
            INSERT INTO email_queue (id, to_email, subject, body_text, body_html, email_type, status, attempt_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email.to_email)
        .bind(&email.subject)
        .bind(&email.body_text)
        .bind(&email.body_html)
        .bind(&email.email_type)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn due_emails(&self, limit: i64) -> ApiResult<Vec<EmailQueueItem>> {
        Ok(sqlx::query_as::<_, EmailQueueItem>(
            "SELECT * FROM email_queue WHERE status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= now()) ORDER BY created_at LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn mark_sent(&self, id: Uuid) -> ApiResult<()> {
        sqlx::query("UPDATE email_queue SET status = 'sent', sent_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, error_message: &str) -> ApiResult<()> {
        sqlx::query("UPDATE email_queue SET status = 'failed', error_message = $1, attempt_count = attempt_count + 1 WHERE id = $2")
            .bind(error_message)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
