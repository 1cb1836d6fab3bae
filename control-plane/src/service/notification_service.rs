//! # Notification Dispatcher (C11)
//!
//! Fans a single domain event out to matching webhook subscriptions (§4.9)
//! and, where a call site also has a human recipient in hand, gates a
//! queued email against that recipient's `UserEmailPreferences` (§4.10).
//! Security-class emails bypass preferences entirely.

use uuid::Uuid;

use crate::domain::entities::User;
use crate::domain::events::{DomainEvent, EventActor, EventEnvelope};
use crate::repository::email_repository::NewEmail;
use crate::repository::{EmailRepository, UserRepository};
use crate::service::webhook_service::WebhookService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailPreferenceClass {
    Invite,
    ShareUpdate,
    Member,
    /// Always sent, regardless of preferences (§4.10).
    Security,
}

#[derive(Clone)]
pub struct NotificationService {
    webhooks: WebhookService,
    users: UserRepository,
    emails: EmailRepository,
}

impl NotificationService {
    pub fn new(webhooks: WebhookService, users: UserRepository, emails: EmailRepository) -> Self {
        Self { webhooks, users, emails }
    }

    /// Webhook fanout only; `originating_user_id` defaults to the acting
    /// user when one is supplied.
    pub async fn dispatch<E: DomainEvent>(&self, event: &E, actor: Option<&User>) -> shared::ApiResult<()> {
        self.dispatch_scoped(event, actor, actor.map(|u| u.id)).await
    }

    pub async fn dispatch_scoped<E: DomainEvent>(
        &self,
        event: &E,
        actor: Option<&User>,
        originating_user_id: Option<Uuid>,
    ) -> shared::ApiResult<()> {
        let mut envelope = EventEnvelope::new(event);
        if let Some(actor) = actor {
            envelope = envelope.with_actor(EventActor { user_id: actor.id, email: actor.email.clone() });
        }

        let matching = self.webhooks.find_matching(envelope.event_type, originating_user_id, envelope.is_admin_only).await?;
        for webhook in matching {
            // A delivery failure must not fail the request that produced
            // the event; log-and-continue on the next matching subscription.
            if let Err(err) = self.webhooks.enqueue_and_attempt(&webhook, &envelope).await {
                tracing::warn!(webhook_id = %webhook.id, error = %err, "initial webhook delivery attempt failed, will retry");
            }
        }
        Ok(())
    }

    /// Queues an email for `recipient`, unless `class` is preference-gated
    /// and the corresponding preference is off.
    pub async fn notify_email(
        &self,
        recipient: &User,
        class: EmailPreferenceClass,
        subject: &str,
        body_text: &str,
        body_html: &str,
        email_type: &str,
    ) -> shared::ApiResult<()> {
        if class != EmailPreferenceClass::Security {
            let prefs = self.users.get_email_preferences(recipient.id).await?;
            let allowed = match class {
                EmailPreferenceClass::Invite => prefs.invite_notifications,
                EmailPreferenceClass::ShareUpdate => prefs.share_update_notifications,
                EmailPreferenceClass::Member => prefs.member_notifications,
                EmailPreferenceClass::Security => true,
            };
            if !allowed {
                return Ok(());
            }
        }

        self.emails
            .enqueue(NewEmail {
                to_email: recipient.email.clone(),
                subject: subject.to_string(),
                body_text: body_text.to_string(),
                body_html: body_html.to_string(),
                email_type: email_type.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Queues an email to an arbitrary address not yet tied to a `User` row
    /// (e.g. an invite sent to an email that has no account yet). Invite
    /// emails to non-users are informational and not preference-gated.
    pub async fn notify_email_address(&self, to_email: &str, subject: &str, body_text: &str, body_html: &str, email_type: &str) -> shared::ApiResult<()> {
        self.emails
            .enqueue(NewEmail {
                to_email: to_email.to_string(),
                subject: subject.to_string(),
                body_text: body_text.to_string(),
                body_html: body_html.to_string(),
                email_type: email_type.to_string(),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Webhook matching and email-preference gating are exercised through
    // `webhook_service`'s own unit tests and integration tests against a
    // real UserRepository/EmailRepository pair.
}
