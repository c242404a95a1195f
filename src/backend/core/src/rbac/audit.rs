//! Audit trail for denied authorization checks.
//!
//! Entries go through a bounded channel to a background task that appends
//! them to the [`AuditStore`] and mirrors them on the `audit` tracing target.
//! Recording never blocks or fails the authorization decision: a full channel,
//! a closed channel and a store error are all logged and the entry dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::context::AuthContext;
use super::models::{MemberId, OrganizationId, Permission};
use crate::store::AuditStore;

/// Entity type recorded for authorization checks.
pub const AUTH_CHECK_ENTITY: &str = "AUTH_CHECK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    AccessDenied,
}

impl AuditAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "ACCESS_DENIED",
        }
    }
}

/// One audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub member_id: MemberId,
    pub action: AuditAction,
    pub entity_type: String,
    pub description: String,
    pub attempt: u32,
    pub requested_permission: Permission,
    pub held_permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Entry for a denied check, snapshotting what the member held.
    pub fn access_denied(
        context: &AuthContext,
        permission: &str,
        attempt: u32,
        max_attempts: u32,
        banned: bool,
    ) -> Self {
        let mut description = format!(
            "Permission '{}' denied for member {} (Role: {}). Attempt {}/{}.",
            permission, context.member_id, context.role, attempt, max_attempts
        );
        if banned {
            description.push_str(" You are now banned.");
        }

        Self {
            id: Uuid::new_v4(),
            organization_id: context.organization_id.clone(),
            member_id: context.member_id.clone(),
            action: AuditAction::AccessDenied,
            entity_type: AUTH_CHECK_ENTITY.to_string(),
            description,
            attempt,
            requested_permission: Permission::from(permission),
            held_permissions: context.permissions.iter().cloned().collect(),
            created_at: Utc::now(),
        }
    }

    /// The structured `details` column.
    pub fn details(&self) -> serde_json::Value {
        serde_json::json!({
            "requestedPermission": self.requested_permission,
            "heldPermissions": self.held_permissions,
            "attempt": self.attempt,
        })
    }
}

/// Fire-and-forget audit writer.
///
/// Must be created inside a Tokio runtime; the writer task ends once every
/// clone of the logger is dropped and the channel drains.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    sender: mpsc::Sender<AuditLogEntry>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>, buffer: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<AuditLogEntry>(buffer.max(1));

        tokio::spawn(async move {
            while let Some(entry) = receiver.recv().await {
                info!(
                    target: "audit",
                    organization_id = %entry.organization_id,
                    member_id = %entry.member_id,
                    action = entry.action.as_str(),
                    permission = %entry.requested_permission,
                    attempt = entry.attempt,
                    "{}",
                    entry.description
                );
                if let Err(e) = store.append_audit(&entry).await {
                    counter!("audit_entries_dropped_total", "reason" => "store").increment(1);
                    error!(entry_id = %entry.id, error = %e, "Failed to persist audit entry");
                }
            }
        });

        Self { sender }
    }

    /// Enqueue an entry without waiting.
    pub fn record(&self, entry: AuditLogEntry) {
        if let Err(e) = self.sender.try_send(entry) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            };
            counter!("audit_entries_dropped_total", "reason" => reason).increment(1);
            warn!(reason, "Audit entry dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::{CachedMemberData, MemberRole, UserId};
    use crate::store::memory::StoreOperation;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn context() -> AuthContext {
        let member = CachedMemberData {
            id: MemberId::new("mem-1"),
            role: MemberRole::Manager,
            custom_roles: vec![],
            last_updated: Utc::now(),
        };
        let permissions = AuthContext::effective_permissions(&member);
        AuthContext::new(UserId::new("user-1"), OrganizationId::new("org-1"), &member, permissions)
    }

    async fn wait_for_entries(store: &InMemoryStore, count: usize) -> Vec<AuditLogEntry> {
        for _ in 0..100 {
            let entries = store.audit_entries().await;
            if entries.len() >= count {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        store.audit_entries().await
    }

    #[test]
    fn test_access_denied_entry() {
        let entry = AuditLogEntry::access_denied(&context(), "member:delete", 2, 5, false);
        assert_eq!(
            entry.description,
            "Permission 'member:delete' denied for member mem-1 (Role: MANAGER). Attempt 2/5."
        );
        assert_eq!(entry.entity_type, "AUTH_CHECK");
        assert_eq!(entry.action, AuditAction::AccessDenied);
        assert!(entry.held_permissions.contains(&Permission::from("product:create")));

        let details = entry.details();
        assert_eq!(details["requestedPermission"], "member:delete");
        assert!(details["heldPermissions"].as_array().unwrap().len() > 10);
    }

    #[test]
    fn test_ban_entry_description() {
        let entry = AuditLogEntry::access_denied(&context(), "member:delete", 5, 5, true);
        assert!(entry.description.ends_with("Attempt 5/5. You are now banned."));
    }

    #[tokio::test]
    async fn test_logger_appends_to_store() {
        let store = Arc::new(InMemoryStore::new());
        let logger = AuditLogger::new(store.clone(), 16);

        logger.record(AuditLogEntry::access_denied(&context(), "member:delete", 1, 5, false));
        logger.record(AuditLogEntry::access_denied(&context(), "member:delete", 2, 5, false));

        let entries = wait_for_entries(&store, 2).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].attempt, 1);
        assert_eq!(entries[1].attempt, 2);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_stop_writer() {
        let store = Arc::new(InMemoryStore::new());
        let logger = AuditLogger::new(store.clone(), 16);

        store.set_failing(StoreOperation::AppendAudit, true);
        logger.record(AuditLogEntry::access_denied(&context(), "audit:view", 1, 5, false));
        tokio::time::sleep(Duration::from_millis(50)).await;

        store.set_failing(StoreOperation::AppendAudit, false);
        logger.record(AuditLogEntry::access_denied(&context(), "audit:view", 2, 5, false));

        let entries = wait_for_entries(&store, 1).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempt, 2);
    }
}
