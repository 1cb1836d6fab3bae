//! # OAuth Repository

use shared::{ApiError, ApiResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{OAuthProvider, UserOAuthAccount};

#[derive(Clone)]
pub struct OAuthRepository {
    pool: PgPool,
}

impl OAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_provider_by_name(&self, name: &str) -> ApiResult<Option<OAuthProvider>> {
        Ok(sqlx::query_as::<_, OAuthProvider>("SELECT * FROM oauth_providers WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_enabled_providers(&self) -> ApiResult<Vec<OAuthProvider>> {
        Ok(sqlx::query_as::<_, OAuthProvider>("SELECT * FROM oauth_providers WHERE enabled = true")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn upsert_provider(&self, provider: OAuthProvider) -> ApiResult<OAuthProvider> {
        Ok(sqlx::query_as::<_, OAuthProvider>(
            r#"
            INSERT INTO oauth_providers (id, name, issuer_url, client_id, client_secret_encrypted, enabled, auto_register)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO UPDATE SET
                issuer_url = EXCLUDED.issuer_url,
                client_id = EXCLUDED.client_id,
                client_secret_encrypted = EXCLUDED.client_secret_encrypted,
                enabled = EXCLUDED.enabled,
                auto_register = EXCLUDED.auto_register
            RETURNING *
            "#,
        )
        .bind(provider.id)
        .bind(&provider.name)
        .bind(&provider.issuer_url)
        .bind(&provider.client_id)
        .bind(&provider.client_secret_encrypted)
        .bind(provider.enabled)
        .bind(provider.auto_register)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn find_account(&self, provider_id: Uuid, provider_user_id: &str) -> ApiResult<Option<UserOAuthAccount>> {
        Ok(sqlx::query_as::<_, UserOAuthAccount>(
            "SELECT * FROM user_oauth_accounts WHERE provider_id = $1 AND provider_user_id = $2",
        )
        .bind(provider_id)
        .bind(provider_user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn find_account_for_user(&self, provider_id: Uuid, user_id: Uuid) -> ApiResult<Option<UserOAuthAccount>> {
        Ok(sqlx::query_as::<_, UserOAuthAccount>(
            "SELECT * FROM user_oauth_accounts WHERE provider_id = $1 AND user_id = $2",
        )
        .bind(provider_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn link_account(
        &self,
        user_id: Uuid,
        provider_id: Uuid,
        provider_user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
        picture_url: Option<&str>,
    ) -> ApiResult<UserOAuthAccount> {
        sqlx::query_as::<_, UserOAuthAccount>(
            r#"
            INSERT INTO user_oauth_accounts (id, user_id, provider_id, provider_user_id, email, name, picture_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(provider_id)
        .bind(provider_user_id)
        .bind(email)
        .bind(name)
        .bind(picture_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint().is_some() {
                    return ApiError::Conflict("this OAuth account is already linked to another user".into());
                }
            }
            ApiError::Database(e)
        })
    }
}
