//! # Relay-Capability Minter (C9)
//!
//! Turns an authorized `(share, doc_id, mode)` triple into a signed CWT for
//! the downstream collaborative-editing relay (§4.8). `doc_id` is opaque end
//! to end -- authorization rides on share membership, never on anything
//! parsed out of it.

use chrono::Utc;
use uuid::Uuid;

use crate::domain::entities::{MemberRole, Share, User};
use crate::service::authz_service::{self, Action, Decision};
use crate::service::crypto::{RelayMode, RelaySigner};
use crate::service::share_service::ShareService;
use shared::{ApiError, ApiResult};

pub struct RelayTokenRequest {
    pub share_id: Uuid,
    pub doc_id: String,
    pub mode: RelayMode,
    pub file_path: Option<String>,
    pub password: Option<String>,
}

pub struct RelayTokenResponse {
    pub relay_url: String,
    pub token: String,
    pub doc_id: String,
    pub expires_at: chrono::DateTime<Utc>,
}

pub struct RelayPublicKey {
    pub key_id: String,
    pub public_key: String,
    pub algorithm: &'static str,
}

#[derive(Clone)]
pub struct RelayService {
    shares: ShareService,
    signer: std::sync::Arc<RelaySigner>,
    relay_url: String,
    issuer: String,
    token_ttl_minutes: i64,
}

impl RelayService {
    pub fn new(shares: ShareService, signer: std::sync::Arc<RelaySigner>, relay_url: String, issuer: String, token_ttl_minutes: i64) -> Self {
        Self { shares, signer, relay_url, issuer, token_ttl_minutes }
    }

    pub async fn issue_relay_token(
        &self,
        principal: Option<&User>,
        member_role_lookup: impl Fn(Uuid) -> Option<MemberRole>,
        req: RelayTokenRequest,
    ) -> ApiResult<RelayTokenResponse> {
        let mut share = self.shares.find(req.share_id).await?;

        if let Some(file_path) = &req.file_path {
            if share.kind == crate::domain::entities::ShareKind::Folder {
                if let Some(resolved) = self.shares.resolve_for_path(principal, &member_role_lookup, file_path).await? {
                    if is_strictly_more_specific(&resolved, &share) {
                        share = resolved;
                    }
                }
            }
        }

        let action = match req.mode {
            RelayMode::Read => Action::Read,
            RelayMode::Write => Action::Write,
        };

        let role = member_role_lookup(share.id);
        let decision = authz_service::authorize(principal, &share, action, role, req.password.as_deref());
        if decision != Decision::Allow {
            return Err(ApiError::Forbidden("not authorized for this share".into()));
        }

        let now = Utc::now();
        let token = self.signer.mint_cwt(&self.issuer, &req.doc_id, req.mode, now.timestamp())?;
        let expires_at = now + chrono::Duration::minutes(self.token_ttl_minutes);

        Ok(RelayTokenResponse { relay_url: self.relay_url.clone(), token, doc_id: req.doc_id, expires_at })
    }

    pub fn public_key(&self) -> RelayPublicKey {
        RelayPublicKey { key_id: self.signer.key_id().to_string(), public_key: self.signer.public_key_base64(), algorithm: "EdDSA" }
    }
}

/// A resolved folder-prefix match only pre-empts the originally requested
/// share when its stored path is longer -- i.e. it's the nested doc/folder,
/// not an unrelated ancestor (§4.8 step 2).
fn is_strictly_more_specific(candidate: &Share, original: &Share) -> bool {
    candidate.id != original.id && candidate.path.len() > original.path.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ShareKind, Visibility};

    fn make_share(id: Uuid, path: &str, kind: ShareKind) -> Share {
        let now = Utc::now();
        Share {
            id,
            kind,
            path: path.to_string(),
            visibility: Visibility::Private,
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
        }
    }

    #[test]
    fn nested_doc_is_more_specific_than_parent_folder() {
        let folder = make_share(Uuid::new_v4(), "Projects/", ShareKind::Folder);
        let doc = make_share(Uuid::new_v4(), "Projects/plan.md", ShareKind::Doc);
        assert!(is_strictly_more_specific(&doc, &folder));
    }

    #[test]
    fn identical_share_is_not_more_specific() {
        let folder = make_share(Uuid::new_v4(), "Projects/", ShareKind::Folder);
        let same_id_share = Share { path: "Projects/".to_string(), ..folder.clone() };
        assert!(!is_strictly_more_specific(&same_id_share, &folder));
    }
}
