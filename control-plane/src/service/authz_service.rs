//! # Authorization Engine (C8)
//!
//! One decision function, consumed by every protected endpoint. Rule order
//! is significant: the first matching rule decides (§4.7).

use crate::domain::entities::{MemberRole, Share, User, Visibility};
use crate::service::crypto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// `member_role` is resolved by the caller (a DB lookup) since this function
/// stays pure and synchronous -- it never touches the database itself.
pub fn authorize(
    principal: Option<&User>,
    share: &Share,
    action: Action,
    member_role: Option<MemberRole>,
    presented_password: Option<&str>,
) -> Decision {
    if let Some(principal) = principal {
        if principal.is_admin {
            return Decision::Allow;
        }
        if share.owner_user_id == principal.id {
            return Decision::Allow;
        }
        if let Some(role) = member_role {
            return match (role, action) {
                (MemberRole::Editor, _) => Decision::Allow,
                (MemberRole::Viewer, Action::Read) => Decision::Allow,
                (MemberRole::Viewer, Action::Write) => Decision::Deny,
            };
        }
    }

    if action == Action::Read && share.visibility == Visibility::Public {
        return Decision::Allow;
    }

    if action == Action::Read && share.visibility == Visibility::Protected {
        if let (Some(presented), Some(stored)) = (presented_password, share.password_hash.as_deref()) {
            let hasher = crypto::PasswordVerifierHandle::default();
            if hasher.verify(presented, stored) {
                return Decision::Allow;
            }
        }
        return Decision::Deny;
    }

    Decision::Deny
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn share(owner: Uuid, visibility: Visibility, password_hash: Option<String>) -> Share {
        Share {
            id: Uuid::new_v4(),
            kind: crate::domain::entities::ShareKind::Doc,
            path: "notes/a.md".into(),
            visibility,
            password_hash,
            owner_user_id: owner,
            web_published: false,
            web_slug: None,
            web_noindex: false,
            web_content: None,
            web_folder_items: None,
            web_doc_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn user(is_admin: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: "u@example.com".into(),
            password_hash: String::new(),
            is_admin,
            is_active: true,
            email_verified: true,
            totp_secret: None,
            totp_enabled: false,
            backup_codes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn admin_always_allowed() {
        let admin = user(true);
        let s = share(Uuid::new_v4(), Visibility::Private, None);
        assert_eq!(authorize(Some(&admin), &s, Action::Write, None, None), Decision::Allow);
    }

    #[test]
    fn owner_always_allowed() {
        let owner = user(false);
        let s = share(owner.id, Visibility::Private, None);
        assert_eq!(authorize(Some(&owner), &s, Action::Write, None, None), Decision::Allow);
    }

    #[test]
    fn editor_can_write_viewer_cannot() {
        let u = user(false);
        let s = share(Uuid::new_v4(), Visibility::Private, None);
        assert_eq!(authorize(Some(&u), &s, Action::Write, Some(MemberRole::Editor), None), Decision::Allow);
        assert_eq!(authorize(Some(&u), &s, Action::Write, Some(MemberRole::Viewer), None), Decision::Deny);
        assert_eq!(authorize(Some(&u), &s, Action::Read, Some(MemberRole::Viewer), None), Decision::Allow);
    }

    #[test]
    fn anonymous_read_allowed_on_public() {
        let s = share(Uuid::new_v4(), Visibility::Public, None);
        assert_eq!(authorize(None, &s, Action::Read, None, None), Decision::Allow);
    }

    #[test]
    fn anonymous_write_denied_on_public() {
        let s = share(Uuid::new_v4(), Visibility::Public, None);
        assert_eq!(authorize(None, &s, Action::Write, None, None), Decision::Deny);
    }

    #[test]
    fn protected_share_requires_correct_password() {
        let hasher = crypto::PasswordVerifierHandle::default();
        let hash = hasher.hash("correct-horse").unwrap();
        let s = share(Uuid::new_v4(), Visibility::Protected, Some(hash));
        assert_eq!(authorize(None, &s, Action::Read, None, Some("correct-horse")), Decision::Allow);
        assert_eq!(authorize(None, &s, Action::Read, None, Some("wrong")), Decision::Deny);
        assert_eq!(authorize(None, &s, Action::Read, None, None), Decision::Deny);
    }

    #[test]
    fn private_share_denies_anonymous() {
        let s = share(Uuid::new_v4(), Visibility::Private, None);
        assert_eq!(authorize(None, &s, Action::Read, None, None), Decision::Deny);
    }
}
