//! # Audit Log Repository
//!
//! Append-only (§4.11): no `update`/`delete` method exists here on purpose.

use chrono::{DateTime, Utc};
use shared::ApiResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::AuditLogEntry;

#[derive(Clone)]
pub struct AuditRepository {
    pool: PgPool,
}

pub struct NewAuditEntry {
    pub action: String,
    pub actor_user_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub target_share_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Default)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub actor_user_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub target_share_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, entry: NewAuditEntry) -> ApiResult<AuditLogEntry> {
        Ok(sqlx::query_as::<_, AuditLogEntry>(
            r#"
            INSERT INTO audit_logs (id, timestamp, action, actor_user_id, target_user_id, target_share_id, details, ip_address, user_agent)
            VALUES ($1, now(), $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.action)
        .bind(entry.actor_user_id)
        .bind(entry.target_user_id)
        .bind(entry.target_share_id)
        .bind(&entry.details)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn query(&self, q: AuditQuery) -> ApiResult<Vec<AuditLogEntry>> {
        Ok(sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT * FROM audit_logs
            WHERE ($1::text IS NULL OR action = $1)
              AND ($2::uuid IS NULL OR actor_user_id = $2)
              AND ($3::uuid IS NULL OR target_user_id = $3)
              AND ($4::uuid IS NULL OR target_share_id = $4)
              AND ($5::timestamptz IS NULL OR timestamp >= $5)
              AND ($6::timestamptz IS NULL OR timestamp <= $6)
            ORDER BY timestamp DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(&q.action)
        .bind(q.actor_user_id)
        .bind(q.target_user_id)
        .bind(q.target_share_id)
        .bind(q.since)
        .bind(q.until)
        .bind(q.limit)
        .bind(q.offset)
        .fetch_all(&self.pool)
        .await?)
    }
}
