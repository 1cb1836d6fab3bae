//! # User Repository

use shared::{ApiError, ApiResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{NewUser, User, UserEmailPreferences};

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_user: NewUser) -> ApiResult<User> {
        let normalized_email = shared::validation::normalize_email(&new_user.email);
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, is_admin, is_active, email_verified, totp_enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, true, false, false, now(), now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&normalized_email)
        .bind(&new_user.password_hash)
        .bind(new_user.is_admin)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_conflict(e, "a user with that email already exists"))?;

        sqlx::query(
            "INSERT INTO user_email_preferences (user_id, invite_notifications, share_update_notifications, member_notifications, security_alerts, digest_emails) VALUES ($1, true, true, true, true, false)",
        )
        .bind(user.id)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(&self, id: Uuid) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("user not found".into()))
    }

    /// Case-insensitive per §3. Returns `None` rather than erroring so
    /// callers (login, password reset) can implement enumeration-safe flows.
    pub async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let normalized = shared::validation::normalize_email(email);
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(normalized)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn update_password(&self, user_id: Uuid, password_hash: &str) -> ApiResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("user not found".into()));
        }
        Ok(())
    }

    pub async fn set_email_verified(&self, user_id: Uuid) -> ApiResult<()> {
        sqlx::query("UPDATE users SET email_verified = true, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_totp(
        &self,
        user_id: Uuid,
        secret: Option<&str>,
        enabled: bool,
        backup_codes: Option<serde_json::Value>,
    ) -> ApiResult<()> {
        sqlx::query(
            "UPDATE users SET totp_secret = $1, totp_enabled = $2, backup_codes = $3, updated_at = now() WHERE id = $4",
        )
        .bind(secret)
        .bind(enabled)
        .bind(backup_codes)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_is_admin(&self, user_id: Uuid, is_admin: bool) -> ApiResult<()> {
        sqlx::query("UPDATE users SET is_admin = $1, updated_at = now() WHERE id = $2")
            .bind(is_admin)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_is_active(&self, user_id: Uuid, is_active: bool) -> ApiResult<()> {
        sqlx::query("UPDATE users SET is_active = $1, updated_at = now() WHERE id = $2")
            .bind(is_active)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, user_id: Uuid) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("user not found".into()));
        }
        Ok(())
    }

    pub async fn list(&self, limit: i64, offset: i64) -> ApiResult<Vec<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn get_email_preferences(&self, user_id: Uuid) -> ApiResult<UserEmailPreferences> {
        Ok(
            sqlx::query_as::<_, UserEmailPreferences>("SELECT * FROM user_email_preferences WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
                .unwrap_or(UserEmailPreferences { user_id, ..Default::default() }),
        )
    }
}

/// Maps a unique-constraint violation to a 409; everything else propagates
/// to the generic `sqlx::Error -> ApiError::Database` conversion.
fn map_conflict(err: sqlx::Error, message: &str) -> ApiError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.constraint().is_some() {
            return ApiError::Conflict(message.to_string());
        }
    }
    ApiError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_conflict_passes_through_non_constraint_errors() {
        let err = map_conflict(sqlx::Error::RowNotFound, "dup");
        assert!(matches!(err, ApiError::Database(sqlx::Error::RowNotFound)));
    }
}
