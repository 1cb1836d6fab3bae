//! # Session Repository
//!
//! Refresh-token rotation (§4.2) is the one operation here that must be
//! serializable on `(session_id)` (§5): `rotate` re-reads under `FOR UPDATE`
//! inside the caller's transaction so two concurrent rotations of the same
//! token cannot both succeed.

use chrono::Utc;
use shared::{ApiError, ApiResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{NewSession, UserSession};

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_session: NewSession) -> ApiResult<UserSession> {
        Ok(sqlx::query_as::<_, UserSession>(
            r#"
            INSERT INTO user_sessions (id, user_id, refresh_token_hash, device_name, user_agent, ip_address, last_activity, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, now(), $7, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_session.user_id)
        .bind(&new_session.refresh_token_hash)
        .bind(&new_session.device_name)
        .bind(&new_session.user_agent)
        .bind(&new_session.ip_address)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn find_by_token_hash(&self, refresh_token_hash: &str) -> ApiResult<UserSession> {
        sqlx::query_as::<_, UserSession>("SELECT * FROM user_sessions WHERE refresh_token_hash = $1")
            .bind(refresh_token_hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("invalid or expired refresh token".into()))
    }

    /// Single-use rotation (§4.2, P3): looks up the session row by its
    /// *current* token hash inside a row lock, verifies it has not expired,
    /// then swaps in a new hash and bumps `last_activity` -- all in one
    /// statement so a second concurrent rotation with the stale hash finds
    /// zero matching rows and fails with 401.
    pub async fn rotate(
        &self,
        old_refresh_token_hash: &str,
        new_refresh_token_hash: &str,
    ) -> ApiResult<UserSession> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, UserSession>(
            "SELECT * FROM user_sessions WHERE refresh_token_hash = $1 FOR UPDATE",
        )
        .bind(old_refresh_token_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid or expired refresh token".into()))?;

        if session.expires_at <= Utc::now() {
            tx.rollback().await.ok();
            return Err(ApiError::Unauthorized("refresh token expired".into()));
        }

        let updated = sqlx::query_as::<_, UserSession>(
            "UPDATE user_sessions SET refresh_token_hash = $1, last_activity = now() WHERE id = $2 RETURNING *",
        )
        .bind(new_refresh_token_hash)
        .bind(session.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> ApiResult<Vec<UserSession>> {
        Ok(
            sqlx::query_as::<_, UserSession>("SELECT * FROM user_sessions WHERE user_id = $1 ORDER BY last_activity DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Distinguishes "no such session" (404) from "that session belongs to
    /// someone else" (403) -- a single `DELETE ... WHERE id = $1 AND user_id
    /// = $2` can't tell the two apart.
    pub async fn revoke(&self, session_id: Uuid, owner_user_id: Uuid) -> ApiResult<()> {
        let session = sqlx::query_as::<_, UserSession>("SELECT * FROM user_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("session not found".into()))?;

        if session.user_id != owner_user_id {
            return Err(ApiError::Forbidden("you do not own this session".into()));
        }

        sqlx::query("DELETE FROM user_sessions WHERE id = $1").bind(session_id).execute(&self.pool).await?;
        Ok(())
    }

    /// Returns the number of deleted sessions (`revoked_count` in the
    /// `DELETE /auth/sessions` response).
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> ApiResult<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    // Rotation serializability and expiry handling require a real Postgres
    // connection (row locking semantics); exercised in integration tests.
}
