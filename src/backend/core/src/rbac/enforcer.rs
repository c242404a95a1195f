//! Permission enforcement: the public entrypoint of the authorization core.
//!
//! Every check runs in the same order:
//!
//! 1. resolve the caller's [`AuthContext`] (once per [`AuthRequest`])
//! 2. refuse outright if the member carries a ban flag, owners included
//! 3. match the required permission; a grant clears that permission's counter
//! 4. a denial is counted, audited and possibly escalated to a ban, all
//!    before the error is returned

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, instrument, warn};

use super::audit::{AuditLogEntry, AuditLogger};
use super::context::AuthContext;
use super::error::{AccessError, PermissionDenial};
use super::models::{MemberId, OrganizationId, UserId};
use super::resolver::{AuthRequest, MemberContextResolver};
use super::tracker::AbuseTracker;
use crate::cache::{Cache, CacheKey, KeyType};
use crate::config::AuthzConfig;
use crate::error::{Result, WardenError};
use crate::store::{AuditStore, MemberStore};

/// Enforces permissions for organization members.
///
/// Cheap to clone; every clone shares the same cache, store and audit writer.
#[derive(Clone)]
pub struct Enforcer {
    cache: Cache,
    store: Arc<dyn MemberStore>,
    resolver: MemberContextResolver,
    tracker: AbuseTracker,
    audit: AuditLogger,
    config: AuthzConfig,
}

impl Enforcer {
    /// Build an enforcer. Spawns the audit writer, so a Tokio runtime must be
    /// running.
    pub fn new(
        cache: Cache,
        members: Arc<dyn MemberStore>,
        audit: Arc<dyn AuditStore>,
        config: AuthzConfig,
    ) -> Self {
        Self {
            resolver: MemberContextResolver::new(cache.clone(), members.clone(), config.clone()),
            tracker: AbuseTracker::new(cache.clone(), members.clone(), config.clone()),
            audit: AuditLogger::new(audit, config.audit_buffer),
            cache,
            store: members,
            config,
        }
    }

    pub fn resolver(&self) -> &MemberContextResolver {
        &self.resolver
    }

    pub fn tracker(&self) -> &AbuseTracker {
        &self.tracker
    }

    /// The caller's context, or `None` when anonymous or not an active member.
    ///
    /// Performs no ban check and no permission check.
    pub async fn create_auth_context(
        &self,
        request: &AuthRequest,
    ) -> std::result::Result<Option<AuthContext>, AccessError> {
        Ok(request.context(&self.resolver).await?.cloned())
    }

    /// Require `permission`, returning the caller's context on success.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id()))]
    pub async fn require_permission(
        &self,
        request: &AuthRequest,
        permission: &str,
    ) -> std::result::Result<AuthContext, AccessError> {
        let context = self.authenticated(request, permission).await?;

        if context.has_permission(permission) {
            self.tracker.reset(&context.member_id, permission).await;
            return Ok(self.granted(context, permission));
        }

        Err(self.deny(context, permission).await)
    }

    /// Require at least one of `permissions`.
    ///
    /// A denial is counted against the first permission in the list.
    pub async fn require_any_permission(
        &self,
        request: &AuthRequest,
        permissions: &[&str],
    ) -> std::result::Result<AuthContext, AccessError> {
        let Some(&first) = permissions.first() else {
            return Err(WardenError::validation("At least one permission is required").into());
        };
        let context = self.authenticated(request, first).await?;

        if let Some(&held) = permissions.iter().find(|p| context.has_permission(p)) {
            self.tracker.reset(&context.member_id, held).await;
            return Ok(self.granted(context, held));
        }

        Err(self.deny(context, first).await)
    }

    /// Require every one of `permissions`.
    ///
    /// A denial is counted against the first permission not held.
    pub async fn require_all_permissions(
        &self,
        request: &AuthRequest,
        permissions: &[&str],
    ) -> std::result::Result<AuthContext, AccessError> {
        let Some(&first) = permissions.first() else {
            return Err(WardenError::validation("At least one permission is required").into());
        };
        let context = self.authenticated(request, first).await?;

        if let Some(missing) = context.first_missing(permissions) {
            return Err(self.deny(context, missing).await);
        }

        for permission in permissions {
            self.tracker.reset(&context.member_id, permission).await;
        }
        Ok(self.granted(context, &permissions.join(",")))
    }

    /// Drop the cached member data, permission set and context of one member.
    ///
    /// Member data is keyed by user. When the member's user cannot be looked
    /// up, every member data entry of the organization is dropped instead.
    #[instrument(skip(self))]
    pub async fn invalidate_auth_cache(&self, member_id: &MemberId, organization_id: &OrganizationId) {
        let mut keys = vec![
            CacheKey::auth_context(member_id.as_str(), organization_id.as_str()),
            CacheKey::permissions(member_id.as_str(), organization_id.as_str()),
        ];

        match self.store.find_member_user(member_id, organization_id).await {
            Ok(Some(user_id)) => {
                keys.push(CacheKey::member_data(user_id.as_str(), organization_id.as_str()));
            }
            Ok(None) => debug!("Member has no user record; skipping member data key"),
            Err(e) => {
                warn!(error = %e, "Failed to look up member user; clearing organization member data");
                let pattern = KeyType::MemberData.organization_pattern(organization_id.as_str());
                if let Err(e) = self.cache.delete_matching(&pattern).await {
                    warn!(pattern = %pattern, error = %e, "Failed to clear organization member data");
                }
            }
        }

        match self.cache.delete(&keys).await {
            Ok(deleted) => debug!(deleted, "Auth cache invalidated"),
            Err(e) => warn!(error = %e, "Failed to invalidate auth cache"),
        }
    }

    /// Drop every cached member data, permission set and context in an
    /// organization.
    #[instrument(skip(self))]
    pub async fn invalidate_organization_auth_cache(&self, organization_id: &OrganizationId) {
        for key_type in KeyType::organization_scoped() {
            let pattern = key_type.organization_pattern(organization_id.as_str());
            match self.cache.delete_matching(&pattern).await {
                Ok(deleted) => debug!(pattern = %pattern, deleted, "Organization cache family cleared"),
                Err(e) => warn!(pattern = %pattern, error = %e, "Failed to clear organization cache family"),
            }
        }
        info!("Organization auth cache invalidated");
    }

    /// Lift a member's ban.
    pub async fn clear_ban(&self, member_id: &MemberId, user_id: &UserId) -> Result<()> {
        self.tracker.clear_ban(member_id, user_id).await
    }

    /// Lift the ban of a member of `organization_id`, looking up its user.
    /// Returns `false` when the organization has no such member.
    pub async fn clear_member_ban(
        &self,
        member_id: &MemberId,
        organization_id: &OrganizationId,
    ) -> Result<bool> {
        match self.store.find_member_user(member_id, organization_id).await? {
            Some(user_id) => {
                self.clear_ban(member_id, &user_id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Resolve the context and apply the ban check.
    async fn authenticated(
        &self,
        request: &AuthRequest,
        permission: &str,
    ) -> std::result::Result<AuthContext, AccessError> {
        let context = match request.context(&self.resolver).await {
            Ok(Some(context)) => context.clone(),
            Ok(None) => return Err(self.rejected(AccessError::Unauthenticated, permission)),
            Err(e) => return Err(self.rejected(AccessError::Infrastructure(e), permission)),
        };

        if self.tracker.is_banned(&context.member_id, &context.user_id).await {
            let denial = PermissionDenial::already_banned(permission, self.config.max_failed_attempts);
            warn!(member_id = %context.member_id, permission, "Banned member refused");
            return Err(self.rejected(AccessError::Banned(denial), permission));
        }

        Ok(context)
    }

    async fn deny(&self, context: AuthContext, permission: &str) -> AccessError {
        let record = self
            .tracker
            .record_denial(&context.member_id, &context.user_id, permission)
            .await;

        let banned = record.status.is_banned();
        self.audit.record(AuditLogEntry::access_denied(
            &context,
            permission,
            record.attempts,
            self.config.max_failed_attempts,
            banned,
        ));

        let denial = PermissionDenial::counted(
            permission,
            record.attempts,
            record.status,
            self.config.max_failed_attempts,
        );
        warn!(
            member_id = %context.member_id,
            role = %context.role,
            permission,
            attempts = record.attempts,
            banned,
            "Permission denied"
        );

        let error = if banned {
            AccessError::Banned(denial)
        } else {
            AccessError::Forbidden(denial)
        };
        self.rejected(error, permission)
    }

    fn granted(&self, context: AuthContext, permission: &str) -> AuthContext {
        counter!("authz_decisions_total", "outcome" => "granted").increment(1);
        debug!(member_id = %context.member_id, permission, "Permission granted");
        context
    }

    fn rejected(&self, error: AccessError, permission: &str) -> AccessError {
        counter!("authz_decisions_total", "outcome" => error.outcome()).increment(1);
        if let AccessError::Infrastructure(e) = &error {
            warn!(permission, error = %e, "Authorization check failed");
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::{Member, MemberRole};
    use crate::store::InMemoryStore;

    async fn setup(role: MemberRole) -> (Enforcer, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_member(Member {
                id: MemberId::new("mem-1"),
                user_id: UserId::new("user-1"),
                organization_id: OrganizationId::new("org-1"),
                role,
                is_active: true,
                custom_roles: vec![],
            })
            .await;
        let enforcer = Enforcer::new(
            Cache::in_memory(1000),
            store.clone(),
            store.clone(),
            AuthzConfig::default(),
        );
        (enforcer, store)
    }

    fn request() -> AuthRequest {
        AuthRequest::for_user("user-1", "org-1")
    }

    #[tokio::test]
    async fn test_grant_returns_context() {
        let (enforcer, _store) = setup(MemberRole::Manager).await;
        let ctx = enforcer.require_permission(&request(), "product:create").await.unwrap();
        assert_eq!(ctx.member_id, MemberId::new("mem-1"));
    }

    #[tokio::test]
    async fn test_non_member_is_unauthenticated() {
        let (enforcer, _store) = setup(MemberRole::Manager).await;
        let err = enforcer
            .require_permission(&AuthRequest::for_user("stranger", "org-1"), "product:view")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Unauthenticated));

        let err = enforcer
            .require_permission(&AuthRequest::anonymous("org-1"), "product:view")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_require_any_and_all() {
        let (enforcer, _store) = setup(MemberRole::Cashier).await;
        assert!(enforcer
            .require_any_permission(&request(), &["product:delete", "sale:create"])
            .await
            .is_ok());

        let err = enforcer
            .require_all_permissions(&request(), &["sale:create", "report:view"])
            .await
            .unwrap_err();
        assert_eq!(err.denial().unwrap().permission.as_str(), "report:view");
        assert_eq!(enforcer.tracker().attempts(&MemberId::new("mem-1"), "report:view").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_permission_lists_are_rejected() {
        let (enforcer, _store) = setup(MemberRole::Owner).await;
        let no_permissions: &[&str] = &[];

        for err in [
            enforcer.require_any_permission(&request(), no_permissions).await.unwrap_err(),
            enforcer.require_all_permissions(&request(), no_permissions).await.unwrap_err(),
        ] {
            match err {
                AccessError::Infrastructure(e) => {
                    assert_eq!(e.code(), crate::error::ErrorCode::ValidationError)
                }
                other => panic!("expected validation error, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_create_auth_context_skips_checks() {
        let (enforcer, _store) = setup(MemberRole::Guest).await;
        let ctx = enforcer.create_auth_context(&request()).await.unwrap().unwrap();
        assert_eq!(ctx.role, MemberRole::Guest);
        assert!(enforcer
            .create_auth_context(&AuthRequest::for_user("stranger", "org-1"))
            .await
            .unwrap()
            .is_none());
    }
}
