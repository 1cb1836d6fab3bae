//! # Audit Log Service (C12)
//!
//! Thin wrapper over `AuditRepository`: gives callers a typed `record(...)`
//! call instead of hand-building `NewAuditEntry` at every call site.

use shared::ApiResult;
use uuid::Uuid;

use crate::repository::audit_repository::{AuditQuery, NewAuditEntry};
use crate::repository::AuditRepository;
use crate::domain::entities::AuditLogEntry;

#[derive(Clone)]
pub struct AuditService {
    repo: AuditRepository,
}

pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditService {
    pub fn new(repo: AuditRepository) -> Self {
        Self { repo }
    }

    pub async fn record(
        &self,
        action: &str,
        actor_user_id: Option<Uuid>,
        target_user_id: Option<Uuid>,
        target_share_id: Option<Uuid>,
        details: serde_json::Value,
        ctx: &RequestContext,
    ) -> ApiResult<AuditLogEntry> {
        self.repo
            .record(NewAuditEntry {
                action: action.to_string(),
                actor_user_id,
                target_user_id,
                target_share_id,
                details,
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
            })
            .await
    }

    pub async fn query(&self, query: AuditQuery) -> ApiResult<Vec<AuditLogEntry>> {
        self.repo.query(query).await
    }
}
