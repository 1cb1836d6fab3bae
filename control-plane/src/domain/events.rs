//! # Domain Events
//!
//! The closed event-type vocabulary from §6. Each concrete event knows its
//! own `event_type()` string; [`EventEnvelope`] wraps one with the metadata
//! the notification dispatcher (C11) needs to build a webhook payload and
//! decide which emails to queue.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

pub trait DomainEvent: Serialize {
    fn event_type(&self) -> &'static str;
    fn aggregate_id(&self) -> Uuid;
    /// True for the admin-only `user.created|updated|deleted` family (§4.9):
    /// these may only route to admin/global webhooks.
    fn is_admin_only(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShareCreated { pub share_id: Uuid, pub owner_user_id: Uuid, pub path: String }
impl DomainEvent for ShareCreated {
    fn event_type(&self) -> &'static str { "share.created" }
    fn aggregate_id(&self) -> Uuid { self.share_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShareUpdated { pub share_id: Uuid, pub actor_user_id: Uuid }
impl DomainEvent for ShareUpdated {
    fn event_type(&self) -> &'static str { "share.updated" }
    fn aggregate_id(&self) -> Uuid { self.share_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShareDeleted { pub share_id: Uuid, pub actor_user_id: Uuid, pub affected_member_ids: Vec<Uuid> }
impl DomainEvent for ShareDeleted {
    fn event_type(&self) -> &'static str { "share.deleted" }
    fn aggregate_id(&self) -> Uuid { self.share_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShareMemberAdded { pub share_id: Uuid, pub user_id: Uuid, pub role: String }
impl DomainEvent for ShareMemberAdded {
    fn event_type(&self) -> &'static str { "share.member.added" }
    fn aggregate_id(&self) -> Uuid { self.share_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShareMemberUpdated { pub share_id: Uuid, pub user_id: Uuid, pub role: String }
impl DomainEvent for ShareMemberUpdated {
    fn event_type(&self) -> &'static str { "share.member.updated" }
    fn aggregate_id(&self) -> Uuid { self.share_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShareMemberRemoved { pub share_id: Uuid, pub user_id: Uuid }
impl DomainEvent for ShareMemberRemoved {
    fn event_type(&self) -> &'static str { "share.member.removed" }
    fn aggregate_id(&self) -> Uuid { self.share_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteCreated { pub invite_id: Uuid, pub share_id: Uuid, pub email: Option<String> }
impl DomainEvent for InviteCreated {
    fn event_type(&self) -> &'static str { "invite.created" }
    fn aggregate_id(&self) -> Uuid { self.invite_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteRedeemed { pub invite_id: Uuid, pub share_id: Uuid, pub redeemed_by: Uuid, pub owner_user_id: Uuid }
impl DomainEvent for InviteRedeemed {
    fn event_type(&self) -> &'static str { "invite.redeemed" }
    fn aggregate_id(&self) -> Uuid { self.invite_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteRevoked { pub invite_id: Uuid, pub share_id: Uuid }
impl DomainEvent for InviteRevoked {
    fn event_type(&self) -> &'static str { "invite.revoked" }
    fn aggregate_id(&self) -> Uuid { self.invite_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserLoggedIn { pub user_id: Uuid, pub session_id: Uuid }
impl DomainEvent for UserLoggedIn {
    fn event_type(&self) -> &'static str { "user.login" }
    fn aggregate_id(&self) -> Uuid { self.user_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserLoggedOut { pub user_id: Uuid, pub session_id: Uuid }
impl DomainEvent for UserLoggedOut {
    fn event_type(&self) -> &'static str { "user.logout" }
    fn aggregate_id(&self) -> Uuid { self.user_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPasswordReset { pub user_id: Uuid }
impl DomainEvent for UserPasswordReset {
    fn event_type(&self) -> &'static str { "user.password_reset" }
    fn aggregate_id(&self) -> Uuid { self.user_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionCreated { pub session_id: Uuid, pub user_id: Uuid, pub device_name: Option<String> }
impl DomainEvent for SessionCreated {
    fn event_type(&self) -> &'static str { "session.created" }
    fn aggregate_id(&self) -> Uuid { self.session_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRevoked { pub session_id: Uuid, pub user_id: Uuid }
impl DomainEvent for SessionRevoked {
    fn event_type(&self) -> &'static str { "session.revoked" }
    fn aggregate_id(&self) -> Uuid { self.session_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct OAuthLogin { pub user_id: Uuid, pub provider: String }
impl DomainEvent for OAuthLogin {
    fn event_type(&self) -> &'static str { "oauth.login" }
    fn aggregate_id(&self) -> Uuid { self.user_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct OAuthAccountLinked { pub user_id: Uuid, pub provider: String }
impl DomainEvent for OAuthAccountLinked {
    fn event_type(&self) -> &'static str { "oauth.account.linked" }
    fn aggregate_id(&self) -> Uuid { self.user_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct TotpEnabled { pub user_id: Uuid }
impl DomainEvent for TotpEnabled {
    fn event_type(&self) -> &'static str { "totp.enabled" }
    fn aggregate_id(&self) -> Uuid { self.user_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct TotpDisabled { pub user_id: Uuid }
impl DomainEvent for TotpDisabled {
    fn event_type(&self) -> &'static str { "totp.disabled" }
    fn aggregate_id(&self) -> Uuid { self.user_id }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserCreated { pub user_id: Uuid, pub email: String }
impl DomainEvent for UserCreated {
    fn event_type(&self) -> &'static str { "user.created" }
    fn aggregate_id(&self) -> Uuid { self.user_id }
    fn is_admin_only(&self) -> bool { true }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserUpdated { pub user_id: Uuid }
impl DomainEvent for UserUpdated {
    fn event_type(&self) -> &'static str { "user.updated" }
    fn aggregate_id(&self) -> Uuid { self.user_id }
    fn is_admin_only(&self) -> bool { true }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDeleted { pub user_id: Uuid }
impl DomainEvent for UserDeleted {
    fn event_type(&self) -> &'static str { "user.deleted" }
    fn aggregate_id(&self) -> Uuid { self.user_id }
    fn is_admin_only(&self) -> bool { true }
}

/// Actor/context metadata threaded onto a payload by the dispatcher, not by
/// the event itself -- an event struct only carries aggregate data.
#[derive(Debug, Clone, Serialize)]
pub struct EventActor {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: &'static str,
    pub aggregate_id: Uuid,
    pub is_admin_only: bool,
    pub occurred_at: DateTime<Utc>,
    pub data: Value,
    pub actor: Option<EventActor>,
    pub context: Option<EventContext>,
}

impl EventEnvelope {
    pub fn new<E: DomainEvent>(event: &E) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event.event_type(),
            aggregate_id: event.aggregate_id(),
            is_admin_only: event.is_admin_only(),
            occurred_at: Utc::now(),
            data: serde_json::to_value(event).unwrap_or(Value::Null),
            actor: None,
            context: None,
        }
    }

    pub fn with_actor(mut self, actor: EventActor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Builds the canonical webhook delivery payload described in §4.9.
    pub fn to_webhook_payload(&self) -> Value {
        let mut data = self.data.clone();
        if let (Value::Object(ref mut map), Some(actor)) = (&mut data, &self.actor) {
            map.insert("actor".into(), serde_json::json!({ "user_id": actor.user_id, "email": actor.email }));
        }
        serde_json::json!({
            "event_id": self.event_id,
            "event_type": self.event_type,
            "timestamp": self.occurred_at.to_rfc3339(),
            "data": data,
            "context": self.context.as_ref().map(|c| serde_json::json!({
                "ip_address": c.ip_address,
                "user_agent": c.user_agent,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_event_type_and_aggregate() {
        let event = ShareCreated { share_id: Uuid::new_v4(), owner_user_id: Uuid::new_v4(), path: "Notes/a.md".into() };
        let envelope = EventEnvelope::new(&event);
        assert_eq!(envelope.event_type, "share.created");
        assert_eq!(envelope.aggregate_id, event.share_id);
        assert!(!envelope.is_admin_only);
    }

    #[test]
    fn admin_only_events_are_flagged() {
        let event = UserCreated { user_id: Uuid::new_v4(), email: "a@b.com".into() };
        let envelope = EventEnvelope::new(&event);
        assert!(envelope.is_admin_only);
    }

    #[test]
    fn webhook_payload_embeds_actor() {
        let event = SessionRevoked { session_id: Uuid::new_v4(), user_id: Uuid::new_v4() };
        let actor_id = Uuid::new_v4();
        let envelope = EventEnvelope::new(&event).with_actor(EventActor { user_id: actor_id, email: "a@b.com".into() });
        let payload = envelope.to_webhook_payload();
        assert_eq!(payload["data"]["actor"]["user_id"], serde_json::json!(actor_id));
    }
}
