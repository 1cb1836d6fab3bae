//! # Share Registry (C6) & Web-Publishing Metadata (C15)
//!
//! Path validation, visibility/password invariants, and the folder-prefix
//! resolver (§4.5), plus the web-publishing JSON contract layered on top of
//! the `Share` entity's `web_*` fields (§4.14).

use uuid::Uuid;

use crate::domain::entities::{MemberRole, NewShare, Share, ShareMember, ShareKind, User, Visibility};
use crate::domain::events::{ShareCreated, ShareDeleted, ShareMemberAdded, ShareMemberRemoved, ShareMemberUpdated, ShareUpdated};
use crate::repository::ShareRepository;
use crate::service::authz_service::{self, Action, Decision};
use crate::service::crypto::PasswordVerifierHandle;
use crate::service::notification_service::NotificationService;
use shared::{ApiError, ApiResult};

const MAX_PATH_LEN: usize = 512;
const ALLOWED_DOC_EXTENSIONS: [&str; 2] = [".md", ".canvas"];
const RESERVED_SLUGS: [&str; 6] = ["api", "admin", "v1", "auth", "health", "assets"];
const MAX_ASSET_UPLOAD_BYTES: u64 = 5_242_880;
const SLUG_UNIQUENESS_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct ShareService {
    repo: ShareRepository,
    notifications: NotificationService,
}

pub struct NewShareRequest {
    pub kind: ShareKind,
    pub path: String,
    pub visibility: Visibility,
    pub password: Option<String>,
    pub owner_user_id: Uuid,
}

impl ShareService {
    pub fn new(repo: ShareRepository, notifications: NotificationService) -> Self {
        Self { repo, notifications }
    }

    pub async fn create(&self, req: NewShareRequest) -> ApiResult<Share> {
        validate_path(&req.path, req.kind)?;
        let password_hash = self.hash_password_for_visibility(req.visibility, req.password)?;
        let owner_user_id = req.owner_user_id;
        let share = self
            .repo
            .create(NewShare { kind: req.kind, path: req.path, visibility: req.visibility, password_hash, owner_user_id })
            .await?;

        self.notifications
            .dispatch_scoped(&ShareCreated { share_id: share.id, owner_user_id, path: share.path.clone() }, None, Some(owner_user_id))
            .await?;
        Ok(share)
    }

    pub async fn find(&self, id: Uuid) -> ApiResult<Share> {
        self.repo.find_by_id(id).await
    }

    pub async fn list_owned_by(&self, owner_user_id: Uuid) -> ApiResult<Vec<Share>> {
        self.repo.list_owned_by(owner_user_id).await
    }

    /// Per P1: setting `protected` requires a password; leaving `protected`
    /// clears it; a fresh password re-hashes.
    pub async fn update_visibility(&self, share_id: Uuid, actor_user_id: Uuid, visibility: Visibility, password: Option<String>) -> ApiResult<Share> {
        let password_hash = self.hash_password_for_visibility(visibility, password)?;
        let share = self.repo.update_visibility(share_id, visibility, password_hash).await?;
        self.notifications
            .dispatch_scoped(&ShareUpdated { share_id, actor_user_id }, None, Some(share.owner_user_id))
            .await?;
        Ok(share)
    }

    pub async fn update_path(&self, share_id: Uuid, actor_user_id: Uuid, kind: ShareKind, new_path: &str) -> ApiResult<Share> {
        validate_path(new_path, kind)?;
        let share = self.repo.update_path(share_id, new_path).await?;
        self.notifications
            .dispatch_scoped(&ShareUpdated { share_id, actor_user_id }, None, Some(share.owner_user_id))
            .await?;
        Ok(share)
    }

    pub async fn delete(&self, share_id: Uuid, actor_user_id: Uuid) -> ApiResult<()> {
        let share = self.repo.find_by_id(share_id).await?;
        let affected_member_ids: Vec<Uuid> = self.repo.list_members(share_id).await?.into_iter().map(|m| m.user_id).collect();
        self.repo.delete(share_id).await?;
        self.notifications
            .dispatch_scoped(&ShareDeleted { share_id, actor_user_id, affected_member_ids }, None, Some(share.owner_user_id))
            .await?;
        Ok(())
    }

    // -- members ----------------------------------------------------------

    pub async fn list_members(&self, share_id: Uuid) -> ApiResult<Vec<ShareMember>> {
        self.repo.list_members(share_id).await
    }

    pub async fn find_member(&self, share_id: Uuid, user_id: Uuid) -> ApiResult<Option<ShareMember>> {
        self.repo.find_member(share_id, user_id).await
    }

    /// A user's membership roles keyed by share id, for building the
    /// synchronous `member_role_lookup` closure `resolve_for_path` needs.
    pub async fn member_role_map(&self, user_id: Uuid) -> ApiResult<std::collections::HashMap<Uuid, MemberRole>> {
        Ok(self.repo.list_member_roles_for_user(user_id).await?.into_iter().map(|m| (m.share_id, m.role)).collect())
    }

    pub async fn add_member(&self, share: &Share, user_id: Uuid, role: MemberRole) -> ApiResult<ShareMember> {
        let member = self.repo.add_member(share.id, user_id, role).await?;
        self.notifications
            .dispatch_scoped(&ShareMemberAdded { share_id: share.id, user_id, role: role_label(role) }, None, Some(share.owner_user_id))
            .await?;
        Ok(member)
    }

    pub async fn update_member_role(&self, share: &Share, user_id: Uuid, role: MemberRole) -> ApiResult<ShareMember> {
        let member = self.repo.update_member_role(share.id, user_id, role).await?;
        self.notifications
            .dispatch_scoped(&ShareMemberUpdated { share_id: share.id, user_id, role: role_label(role) }, None, Some(share.owner_user_id))
            .await?;
        Ok(member)
    }

    pub async fn remove_member(&self, share: &Share, user_id: Uuid) -> ApiResult<()> {
        self.repo.remove_member(share.id, user_id).await?;
        self.notifications
            .dispatch_scoped(&ShareMemberRemoved { share_id: share.id, user_id }, None, Some(share.owner_user_id))
            .await?;
        Ok(())
    }

    fn hash_password_for_visibility(&self, visibility: Visibility, password: Option<String>) -> ApiResult<Option<String>> {
        match visibility {
            Visibility::Protected => {
                let password = password.ok_or_else(|| ApiError::Validation("a password is required for protected shares".into()))?;
                let hasher = PasswordVerifierHandle::default();
                Ok(Some(hasher.hash(&password)?))
            }
            _ => Ok(None),
        }
    }

    /// `find_share_for_path` (§4.5, P8): exact doc match first, else the
    /// longest-prefix folder match the principal can read.
    pub async fn resolve_for_path(
        &self,
        principal: Option<&User>,
        member_role_lookup: impl Fn(Uuid) -> Option<MemberRole>,
        file_path: &str,
    ) -> ApiResult<Option<Share>> {
        if let Some(exact) = self.repo.find_by_exact_path(ShareKind::Doc, file_path).await? {
            let role = member_role_lookup(exact.id);
            if authz_service::authorize(principal, &exact, Action::Read, role, None) == Decision::Allow {
                return Ok(Some(exact));
            }
        }

        let normalized_target = normalize_folder_path(file_path);
        let folders = self.repo.list_folder_shares().await?;

        let mut best: Option<Share> = None;
        for folder in folders {
            let normalized_folder_path = normalize_folder_path(&folder.path);
            if normalized_folder_path.is_empty() || !normalized_target.starts_with(&normalized_folder_path) {
                continue;
            }
            if normalized_folder_path.len() >= normalized_target.len() {
                continue;
            }
            let role = member_role_lookup(folder.id);
            if authz_service::authorize(principal, &folder, Action::Read, role, None) != Decision::Allow {
                continue;
            }
            let is_better = best.as_ref().map(|b| normalized_folder_path.len() > normalize_folder_path(&b.path).len()).unwrap_or(true);
            if is_better {
                best = Some(folder);
            }
        }

        Ok(best)
    }

    // -- web-publishing metadata (C15, §4.14) ----------------------------

    /// `slug: None` auto-generates one from the share's path, retrying with a
    /// growing id-derived suffix on collision, mirroring the original's
    /// `slug_utils.generate_unique_slug` fallback taken whenever a publish
    /// request omits a custom slug.
    pub async fn publish(&self, share_id: Uuid, slug: Option<&str>, noindex: bool) -> ApiResult<Share> {
        if let Some(requested) = slug {
            let candidate = slugify(requested);
            if candidate.is_empty() {
                return Err(ApiError::Validation("slug must contain at least one alphanumeric character".into()));
            }
            if RESERVED_SLUGS.contains(&candidate.as_str()) {
                return Err(ApiError::Conflict("that slug is reserved".into()));
            }
            return self.repo.set_web_publishing(share_id, true, Some(&candidate), noindex).await;
        }

        let share = self.repo.find_by_id(share_id).await?;
        let base = slugify(&share.path);
        let base = if base.is_empty() || RESERVED_SLUGS.contains(&base.as_str()) { "share".to_string() } else { base };
        let id_hex = share_id.simple().to_string();

        for attempt in 0..SLUG_UNIQUENESS_ATTEMPTS {
            let candidate = if attempt == 0 {
                base.clone()
            } else {
                let suffix_len = (4 + attempt as usize).min(id_hex.len());
                format!("{base}-{}", &id_hex[..suffix_len])
            };
            match self.repo.set_web_publishing(share_id, true, Some(&candidate), noindex).await {
                Ok(share) => return Ok(share),
                Err(ApiError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ApiError::Conflict("could not generate a unique slug after several attempts".into()))
    }

    pub async fn unpublish(&self, share_id: Uuid) -> ApiResult<Share> {
        self.repo.set_web_publishing(share_id, false, None, false).await?;
        self.repo.set_web_content(share_id, None, None, None).await
    }

    pub async fn sync_doc_content(&self, share_id: Uuid, content: &str, doc_id: Option<&str>) -> ApiResult<Share> {
        self.repo.set_web_content(share_id, Some(content), None, doc_id).await
    }

    pub async fn sync_folder_items(&self, share_id: Uuid, folder_items: serde_json::Value) -> ApiResult<Share> {
        self.repo.set_web_content(share_id, None, Some(folder_items), None).await
    }

    pub async fn find_published_by_slug(&self, slug: &str) -> ApiResult<Share> {
        self.repo.find_by_slug(slug).await
    }

    pub fn validate_asset_upload_size(size_bytes: u64) -> ApiResult<()> {
        if size_bytes > MAX_ASSET_UPLOAD_BYTES {
            return Err(ApiError::PayloadTooLarge("asset exceeds 5 MiB".into()));
        }
        Ok(())
    }
}

/// Path-validation invariants (§4.5, P9), applied on create and on path
/// change.
fn validate_path(path: &str, kind: ShareKind) -> ApiResult<()> {
    if path.is_empty() {
        return Err(ApiError::Validation("path must not be empty".into()));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(ApiError::Validation(format!("path must be at most {MAX_PATH_LEN} characters")));
    }
    if path.contains('\0') {
        return Err(ApiError::Validation("path must not contain a null byte".into()));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(ApiError::Validation("path must not contain a \"..\" segment".into()));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(ApiError::Validation("path must be relative".into()));
    }
    if is_drive_letter_prefixed(path) {
        return Err(ApiError::Validation("path must not carry a drive-letter prefix".into()));
    }
    if kind == ShareKind::Doc {
        let lower = path.to_lowercase();
        if !ALLOWED_DOC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            return Err(ApiError::Validation(format!(
                "document paths must end in one of: {}",
                ALLOWED_DOC_EXTENSIONS.join(", ")
            )));
        }
    }
    Ok(())
}

/// Lowercases, collapses runs of non-alphanumerics to a single `-`, and trims
/// leading/trailing dashes -- the same normalization a custom slug and an
/// auto-generated one both go through.
fn slugify(input: &str) -> String {
    let mut out = String::new();
    let mut prev_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash && !out.is_empty() {
            out.push('-');
            prev_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn is_drive_letter_prefixed(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Normalizes a folder path for prefix comparison only -- never stored.
fn normalize_folder_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    format!("{trimmed}/")
}

fn role_label(role: MemberRole) -> String {
    match role {
        MemberRole::Viewer => "viewer".to_string(),
        MemberRole::Editor => "editor".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn rejects_dotdot_segment() {
        assert!(validate_path("notes/../secret.md", ShareKind::Doc).is_err());
    }

    #[test]
    fn rejects_leading_slash() {
        assert!(validate_path("/notes/a.md", ShareKind::Doc).is_err());
    }

    #[test]
    fn rejects_drive_letter_prefix() {
        assert!(validate_path("C:/notes/a.md", ShareKind::Doc).is_err());
    }

    #[test]
    fn rejects_null_byte() {
        assert!(validate_path("notes/a\0.md", ShareKind::Doc).is_err());
    }

    #[test]
    fn rejects_empty_path() {
        assert!(validate_path("", ShareKind::Folder).is_err());
    }

    #[test]
    fn doc_requires_allowed_extension() {
        assert!(validate_path("notes/a.txt", ShareKind::Doc).is_err());
        assert!(validate_path("notes/a.md", ShareKind::Doc).is_ok());
        assert!(validate_path("notes/a.canvas", ShareKind::Doc).is_ok());
    }

    #[test]
    fn folder_paths_are_not_extension_checked() {
        assert!(validate_path("Projects/", ShareKind::Folder).is_ok());
    }

    #[test]
    fn folder_prefix_normalization_adds_trailing_slash() {
        assert_eq!(normalize_folder_path("Projects"), "Projects/");
        assert_eq!(normalize_folder_path("Projects/"), "Projects/");
    }

    #[test]
    fn slugify_collapses_non_alnum_runs() {
        assert_eq!(slugify("Projects/My Plan.md"), "projects-my-plan-md");
    }

    #[test]
    fn slugify_trims_trailing_dashes() {
        assert_eq!(slugify("weird!!!"), "weird");
    }

    #[test]
    fn longest_prefix_wins_among_two_folders() {
        let now = Utc::now();
        let make = |path: &str| Share {
            id: Uuid::new_v4(),
            kind: ShareKind::Folder,
            path: path.to_string(),
            visibility: Visibility::Public,
            password_hash: None,
            owner_user_id: Uuid::new_v4(),
            web_published: false,
            web_slug: None,
            web_noindex: false,
            web_content: None,
            web_folder_items: None,
            web_doc_id: None,
            created_at: now,
            updated_at: now,
        };
        let outer = make("Projects/");
        let inner = make("Projects/subproject/");
        let target = "Projects/subproject/file.md";

        let outer_prefix = normalize_folder_path(&outer.path);
        let inner_prefix = normalize_folder_path(&inner.path);
        assert!(target.starts_with(&outer_prefix));
        assert!(target.starts_with(&inner_prefix));
        assert!(inner_prefix.len() > outer_prefix.len());
    }
}
