//! In-memory implementation of the member and audit stores.
//!
//! State lives in `HashMap`s behind `tokio::sync::RwLock` and is lost on
//! restart. Each store operation can be switched to fail, which lets tests
//! exercise the infrastructure-error paths without a database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{AuditStore, MemberStore};
use crate::error::{ErrorCode, Result, WardenError};
use crate::rbac::audit::AuditLogEntry;
use crate::rbac::models::{CustomRole, Member, MemberId, MemberRole, OrganizationId, UserId};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    ReadMember,
    ReadBan,
    WriteBan,
    AppendAudit,
}

#[derive(Debug, Default)]
struct Failures {
    read_member: AtomicBool,
    read_ban: AtomicBool,
    write_ban: AtomicBool,
    append_audit: AtomicBool,
}

impl Failures {
    fn flag(&self, op: StoreOperation) -> &AtomicBool {
        match op {
            StoreOperation::ReadMember => &self.read_member,
            StoreOperation::ReadBan => &self.read_ban,
            StoreOperation::WriteBan => &self.write_ban,
            StoreOperation::AppendAudit => &self.append_audit,
        }
    }

    fn check(&self, op: StoreOperation) -> Result<()> {
        if self.flag(op).load(Ordering::SeqCst) {
            return Err(WardenError::with_internal(
                ErrorCode::DatabaseConnectionFailed,
                "Database connection unavailable",
                format!("injected failure for {:?}", op),
            ));
        }
        Ok(())
    }
}

/// Non-durable store for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    members: RwLock<HashMap<MemberId, Member>>,
    bans: RwLock<HashMap<UserId, String>>,
    audit: RwLock<Vec<AuditLogEntry>>,
    failures: Failures,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a membership.
    pub async fn upsert_member(&self, member: Member) {
        self.members.write().await.insert(member.id.clone(), member);
    }

    /// Change a member's base role. Returns `false` if the member is unknown.
    pub async fn set_member_role(&self, member_id: &MemberId, role: MemberRole) -> bool {
        match self.members.write().await.get_mut(member_id) {
            Some(member) => {
                member.role = role;
                true
            }
            None => false,
        }
    }

    /// Replace a member's custom roles. Returns `false` if the member is unknown.
    pub async fn set_custom_roles(&self, member_id: &MemberId, roles: Vec<CustomRole>) -> bool {
        match self.members.write().await.get_mut(member_id) {
            Some(member) => {
                member.custom_roles = roles;
                true
            }
            None => false,
        }
    }

    /// Mark a membership inactive. Returns `false` if the member is unknown.
    pub async fn deactivate_member(&self, member_id: &MemberId) -> bool {
        match self.members.write().await.get_mut(member_id) {
            Some(member) => {
                member.is_active = false;
                true
            }
            None => false,
        }
    }

    /// The durable ban reason for a user, if banned.
    pub async fn ban_reason(&self, user_id: &UserId) -> Option<String> {
        self.bans.read().await.get(user_id).cloned()
    }

    /// Snapshot of every appended audit entry, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.audit.read().await.clone()
    }

    /// Make `op` fail (or succeed again) on subsequent calls.
    pub fn set_failing(&self, op: StoreOperation, failing: bool) {
        self.failures.flag(op).store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MemberStore for InMemoryStore {
    async fn find_active_member(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<Member>> {
        self.failures.check(StoreOperation::ReadMember)?;
        Ok(self
            .members
            .read()
            .await
            .values()
            .find(|m| m.is_active && &m.user_id == user_id && &m.organization_id == organization_id)
            .cloned())
    }

    async fn find_member_user(
        &self,
        member_id: &MemberId,
        organization_id: &OrganizationId,
    ) -> Result<Option<UserId>> {
        self.failures.check(StoreOperation::ReadMember)?;
        Ok(self
            .members
            .read()
            .await
            .get(member_id)
            .filter(|m| &m.organization_id == organization_id)
            .map(|m| m.user_id.clone()))
    }

    async fn is_user_banned(&self, user_id: &UserId) -> Result<bool> {
        self.failures.check(StoreOperation::ReadBan)?;
        Ok(self.bans.read().await.contains_key(user_id))
    }

    async fn set_user_banned(&self, user_id: &UserId, reason: &str) -> Result<()> {
        self.failures.check(StoreOperation::WriteBan)?;
        self.bans
            .write()
            .await
            .insert(user_id.clone(), reason.to_string());
        Ok(())
    }

    async fn clear_user_banned(&self, user_id: &UserId) -> Result<()> {
        self.failures.check(StoreOperation::WriteBan)?;
        self.bans.write().await.remove(user_id);
        Ok(())
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.failures.check(StoreOperation::AppendAudit)?;
        self.audit.write().await.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, user: &str, org: &str) -> Member {
        Member {
            id: MemberId::new(id),
            user_id: UserId::new(user),
            organization_id: OrganizationId::new(org),
            role: MemberRole::Employee,
            is_active: true,
            custom_roles: vec![],
        }
    }

    #[tokio::test]
    async fn test_find_active_member_scoped_to_org() {
        let store = InMemoryStore::new();
        store.upsert_member(member("m1", "u1", "org-1")).await;
        store.upsert_member(member("m2", "u1", "org-2")).await;

        let found = store
            .find_active_member(&UserId::new("u1"), &OrganizationId::new("org-2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, MemberId::new("m2"));

        assert!(store
            .find_active_member(&UserId::new("u1"), &OrganizationId::new("org-3"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_inactive_member_not_found_but_user_lookup_works() {
        let store = InMemoryStore::new();
        store.upsert_member(member("m1", "u1", "org-1")).await;
        assert!(store.deactivate_member(&MemberId::new("m1")).await);

        assert!(store
            .find_active_member(&UserId::new("u1"), &OrganizationId::new("org-1"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .find_member_user(&MemberId::new("m1"), &OrganizationId::new("org-1"))
                .await
                .unwrap(),
            Some(UserId::new("u1"))
        );
        assert!(store
            .find_member_user(&MemberId::new("m1"), &OrganizationId::new("org-2"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_ban_flag_round_trip() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        store.set_user_banned(&user, "too many attempts").await.unwrap();
        assert!(store.is_user_banned(&user).await.unwrap());
        assert_eq!(store.ban_reason(&user).await.as_deref(), Some("too many attempts"));

        store.clear_user_banned(&user).await.unwrap();
        assert!(!store.is_user_banned(&user).await.unwrap());

        store.set_failing(StoreOperation::ReadBan, true);
        assert!(store.is_user_banned(&user).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryStore::new();
        store.set_failing(StoreOperation::ReadMember, true);
        let err = store
            .find_active_member(&UserId::new("u1"), &OrganizationId::new("org-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatabaseConnectionFailed);

        store.set_failing(StoreOperation::ReadMember, false);
        assert!(store
            .find_active_member(&UserId::new("u1"), &OrganizationId::new("org-1"))
            .await
            .is_ok());
    }
}
