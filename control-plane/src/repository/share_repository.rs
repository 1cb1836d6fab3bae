//! # Share Repository
//!
//! Shares and their membership table. The folder-prefix resolution algorithm
//! itself (§4.5) lives in `service::share_service` -- this repository only
//! exposes the raw listing queries it needs.

use shared::{ApiError, ApiResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{MemberRole, NewShare, Share, ShareKind, ShareMember, Visibility};

#[derive(Clone)]
pub struct ShareRepository {
    pool: PgPool,
}

impl ShareRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_share: NewShare) -> ApiResult<Share> {
        Ok(sqlx::query_as::<_, Share>(
            r#"
            INSERT INTO shares (id, kind, path, visibility, password_hash, owner_user_id, web_published, web_noindex, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, false, false, now(), now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_share.kind)
        .bind(&new_share.path)
        .bind(new_share.visibility)
        .bind(&new_share.password_hash)
        .bind(new_share.owner_user_id)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> ApiResult<Share> {
        sqlx::query_as::<_, Share>("SELECT * FROM shares WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("share not found".into()))
    }

    pub async fn find_by_exact_path(&self, kind: ShareKind, path: &str) -> ApiResult<Option<Share>> {
        Ok(sqlx::query_as::<_, Share>("SELECT * FROM shares WHERE kind = $1 AND path = $2")
            .bind(kind)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_folder_shares(&self) -> ApiResult<Vec<Share>> {
        Ok(sqlx::query_as::<_, Share>("SELECT * FROM shares WHERE kind = 'folder'")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn list_owned_by(&self, owner_user_id: Uuid) -> ApiResult<Vec<Share>> {
        Ok(sqlx::query_as::<_, Share>("SELECT * FROM shares WHERE owner_user_id = $1 ORDER BY created_at DESC")
            .bind(owner_user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn update_visibility(
        &self,
        share_id: Uuid,
        visibility: Visibility,
        password_hash: Option<String>,
    ) -> ApiResult<Share> {
        Ok(sqlx::query_as::<_, Share>(
            "UPDATE shares SET visibility = $1, password_hash = $2, updated_at = now() WHERE id = $3 RETURNING *",
        )
        .bind(visibility)
        .bind(password_hash)
        .bind(share_id)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn update_path(&self, share_id: Uuid, path: &str) -> ApiResult<Share> {
        Ok(
            sqlx::query_as::<_, Share>("UPDATE shares SET path = $1, updated_at = now() WHERE id = $2 RETURNING *")
                .bind(path)
                .bind(share_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn set_web_publishing(
        &self,
        share_id: Uuid,
        published: bool,
        slug: Option<&str>,
        noindex: bool,
    ) -> ApiResult<Share> {
        sqlx::query_as::<_, Share>(
            "UPDATE shares SET web_published = $1, web_slug = $2, web_noindex = $3, updated_at = now() WHERE id = $4 RETURNING *",
        )
        .bind(published)
        .bind(slug)
        .bind(noindex)
        .bind(share_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint().is_some() {
                    return ApiError::Conflict("that web slug is already in use".into());
                }
            }
            ApiError::Database(e)
        })
    }

    pub async fn set_web_content(
        &self,
        share_id: Uuid,
        content: Option<&str>,
        folder_items: Option<serde_json::Value>,
        doc_id: Option<&str>,
    ) -> ApiResult<Share> {
        Ok(sqlx::query_as::<_, Share>(
            "UPDATE shares SET web_content = $1, web_folder_items = $2, web_doc_id = $3, updated_at = now() WHERE id = $4 RETURNING *",
        )
        .bind(content)
        .bind(folder_items)
        .bind(doc_id)
        .bind(share_id)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn find_by_slug(&self, slug: &str) -> ApiResult<Share> {
        sqlx::query_as::<_, Share>("SELECT * FROM shares WHERE web_slug = $1 AND web_published = true")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("published share not found".into()))
    }

    pub async fn delete(&self, share_id: Uuid) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM shares WHERE id = $1")
            .bind(share_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("share not found".into()));
        }
        Ok(())
    }

    // -- members --------------------------------------------------------

    pub async fn list_members(&self, share_id: Uuid) -> ApiResult<Vec<ShareMember>> {
        Ok(
            sqlx::query_as::<_, ShareMember>("SELECT * FROM share_members WHERE share_id = $1 ORDER BY created_at")
                .bind(share_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Every membership row for a user, across all shares -- used to build
    /// the synchronous role lookup the folder-prefix resolver needs.
    pub async fn list_member_roles_for_user(&self, user_id: Uuid) -> ApiResult<Vec<ShareMember>> {
        Ok(sqlx::query_as::<_, ShareMember>("SELECT * FROM share_members WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn find_member(&self, share_id: Uuid, user_id: Uuid) -> ApiResult<Option<ShareMember>> {
        Ok(
            sqlx::query_as::<_, ShareMember>("SELECT * FROM share_members WHERE share_id = $1 AND user_id = $2")
                .bind(share_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn add_member(&self, share_id: Uuid, user_id: Uuid, role: MemberRole) -> ApiResult<ShareMember> {
        sqlx::query_as::<_, ShareMember>(
            "INSERT INTO share_members (id, share_id, user_id, role, created_at) VALUES ($1, $2, $3, $4, now()) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(share_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint().is_some() {
                    return ApiError::Conflict("user is already a member of this share".into());
                }
            }
            ApiError::Database(e)
        })
    }

    pub async fn update_member_role(&self, share_id: Uuid, user_id: Uuid, role: MemberRole) -> ApiResult<ShareMember> {
        sqlx::query_as::<_, ShareMember>("UPDATE share_members SET role = $1 WHERE share_id = $2 AND user_id = $3 RETURNING *")
            .bind(role)
            .bind(share_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("membership not found".into()))
    }

    pub async fn remove_member(&self, share_id: Uuid, user_id: Uuid) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM share_members WHERE share_id = $1 AND user_id = $2")
            .bind(share_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("membership not found".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // CRUD behavior against real uniqueness constraints is covered in
    // integration tests run against Postgres.
}
