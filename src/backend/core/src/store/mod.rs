//! Durable store interfaces consumed by the authorization core.
//!
//! The core only reads active memberships (with their custom roles), reads and
//! flips the banned flag on user records and appends audit rows. [`memory::InMemoryStore`]
//! backs tests and local runs; [`crate::db::Database`] is the PostgreSQL
//! implementation.

use async_trait::async_trait;

use crate::error::Result;
use crate::rbac::audit::AuditLogEntry;
use crate::rbac::models::{Member, MemberId, OrganizationId, UserId};

pub mod memory;

pub use memory::InMemoryStore;

/// Membership and user-ban persistence.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// The active membership of `user_id` in `organization_id`, with custom roles.
    async fn find_active_member(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<Member>>;

    /// The user behind a membership of `organization_id`, active or not.
    async fn find_member_user(
        &self,
        member_id: &MemberId,
        organization_id: &OrganizationId,
    ) -> Result<Option<UserId>>;

    /// Whether the user record carries the durable banned flag.
    async fn is_user_banned(&self, user_id: &UserId) -> Result<bool>;

    /// Set the durable banned flag with a reason.
    async fn set_user_banned(&self, user_id: &UserId, reason: &str) -> Result<()>;

    /// Clear the durable banned flag and its reason.
    async fn clear_user_banned(&self, user_id: &UserId) -> Result<()>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()>;
}
