//! Member context resolution: cache first, durable store on miss.
//!
//! Three cache layers sit in front of the store, each with its own TTL:
//! member data (keyed by user), the effective permission set and the full
//! context (both keyed by member). Any layer can be missing, stale, corrupt or
//! unreachable; the resolver then rebuilds from the layer below and never
//! returns a partially filled context.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use super::context::AuthContext;
use super::matcher::PermissionSet;
use super::models::{CachedMemberData, OrganizationId, Permission, UserId};
use crate::cache::{Cache, CacheKey};
use crate::config::AuthzConfig;
use crate::error::Result;
use crate::store::MemberStore;

// ═══════════════════════════════════════════════════════════════════════════════
// Per-call memoization
// ═══════════════════════════════════════════════════════════════════════════════

/// One logical request: who is calling, for which organization.
///
/// The context is resolved at most once per `AuthRequest`, however many
/// checks share it. A failed resolution is not memoized.
#[derive(Debug)]
pub struct AuthRequest {
    user_id: Option<UserId>,
    organization_id: OrganizationId,
    resolved: OnceCell<Option<AuthContext>>,
}

impl AuthRequest {
    pub fn new(user_id: Option<UserId>, organization_id: OrganizationId) -> Self {
        Self {
            user_id,
            organization_id,
            resolved: OnceCell::new(),
        }
    }

    /// A request for `user_id` in `organization_id`.
    pub fn for_user(user_id: impl Into<UserId>, organization_id: impl Into<OrganizationId>) -> Self {
        Self::new(Some(user_id.into()), organization_id.into())
    }

    /// A request with no authenticated identity.
    pub fn anonymous(organization_id: impl Into<OrganizationId>) -> Self {
        Self::new(None, organization_id.into())
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }

    /// Resolve (once) and return the context; `None` when the caller is
    /// anonymous or not an active member.
    pub async fn context(&self, resolver: &MemberContextResolver) -> Result<Option<&AuthContext>> {
        let resolved = self
            .resolved
            .get_or_try_init(|| async {
                match &self.user_id {
                    Some(user_id) => resolver.resolve(user_id, &self.organization_id).await,
                    None => Ok(None),
                }
            })
            .await?;
        Ok(resolved.as_ref())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════════════════════════

/// Builds [`AuthContext`]s from the cache and the member store.
#[derive(Clone)]
pub struct MemberContextResolver {
    cache: Cache,
    store: Arc<dyn MemberStore>,
    config: AuthzConfig,
}

impl MemberContextResolver {
    pub fn new(cache: Cache, store: Arc<dyn MemberStore>, config: AuthzConfig) -> Self {
        Self {
            cache,
            store,
            config,
        }
    }

    /// Resolve the context of `user_id` in `organization_id`.
    ///
    /// Returns `Ok(None)` when the user has no active membership. Store
    /// failures propagate; cache failures never do.
    #[instrument(skip(self), fields(user_id = %user_id, organization_id = %organization_id))]
    pub async fn resolve(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<AuthContext>> {
        let member = match self.member_data(user_id, organization_id).await? {
            Some(member) => member,
            None => {
                debug!("No active membership");
                return Ok(None);
            }
        };

        let context_key = CacheKey::auth_context(member.id.as_str(), organization_id.as_str());
        match self.cache.get::<AuthContext>(&context_key).await {
            Ok(Some(context)) if context.belongs_to(user_id, organization_id) => {
                debug!(member_id = %context.member_id, "Auth context served from cache");
                return Ok(Some(context));
            }
            Ok(Some(_)) => {
                warn!(key = %context_key, "Cached auth context belongs to another identity; rebuilding");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(key = %context_key, error = %e, "Auth context cache read failed; rebuilding");
            }
        }

        let permissions = self.permissions(&member, organization_id).await;
        let context = AuthContext::new(user_id.clone(), organization_id.clone(), &member, permissions);

        if let Err(e) = self
            .cache
            .set_with_ttl(&context_key, &context, self.config.context_ttl)
            .await
        {
            warn!(key = %context_key, error = %e, "Failed to cache auth context");
        }

        Ok(Some(context))
    }

    /// Member snapshot from cache when fresh, otherwise from the store.
    async fn member_data(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<CachedMemberData>> {
        let key = CacheKey::member_data(user_id.as_str(), organization_id.as_str());

        let write_back = match self.cache.get::<CachedMemberData>(&key).await {
            Ok(Some(cached)) if cached.is_fresh(self.config.member_data_ttl) => {
                debug!(member_id = %cached.id, "Member data served from cache");
                return Ok(Some(cached));
            }
            Ok(_) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Member data cache read failed; reading store directly");
                false
            }
        };

        let member = match self.store.find_active_member(user_id, organization_id).await? {
            Some(member) => CachedMemberData::from_member(&member),
            None => return Ok(None),
        };

        if write_back {
            if let Err(e) = self
                .cache
                .set_with_ttl(&key, &member, self.config.member_data_ttl)
                .await
            {
                warn!(key = %key, error = %e, "Failed to cache member data");
            }
        }

        Ok(Some(member))
    }

    /// Effective permissions from cache, otherwise computed and cached.
    async fn permissions(
        &self,
        member: &CachedMemberData,
        organization_id: &OrganizationId,
    ) -> PermissionSet {
        let key = CacheKey::permissions(member.id.as_str(), organization_id.as_str());

        match self.cache.get::<Vec<Permission>>(&key).await {
            Ok(Some(cached)) => return cached.into_iter().collect(),
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Permission cache read failed; recomputing");
            }
        }

        let permissions = AuthContext::effective_permissions(member);
        if let Err(e) = self
            .cache
            .set_with_ttl(&key, &permissions, self.config.permission_ttl)
            .await
        {
            warn!(key = %key, error = %e, "Failed to cache permissions");
        }
        permissions
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::{CustomRole, Member, MemberId, MemberRole};
    use crate::store::memory::StoreOperation;
    use crate::store::InMemoryStore;

    async fn setup(role: MemberRole) -> (MemberContextResolver, Arc<InMemoryStore>, Cache) {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_member(Member {
                id: MemberId::new("mem-1"),
                user_id: UserId::new("user-1"),
                organization_id: OrganizationId::new("org-1"),
                role,
                is_active: true,
                custom_roles: vec![CustomRole::new("cr-1", "Stock", ["inventory:adjust"])],
            })
            .await;
        let cache = Cache::in_memory(1000);
        let resolver = MemberContextResolver::new(cache.clone(), store.clone(), AuthzConfig::default());
        (resolver, store, cache)
    }

    #[tokio::test]
    async fn test_resolve_populates_every_layer() {
        let (resolver, _store, cache) = setup(MemberRole::Cashier).await;
        let ctx = resolver
            .resolve(&UserId::new("user-1"), &OrganizationId::new("org-1"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(ctx.member_id, MemberId::new("mem-1"));
        assert!(ctx.has_permission("inventory:adjust"));
        assert!(ctx.has_permission("sale:create"));

        let member: Option<CachedMemberData> = cache
            .get(&CacheKey::member_data("user-1", "org-1"))
            .await
            .unwrap();
        assert_eq!(member.unwrap().role, MemberRole::Cashier);

        let perms: Option<Vec<Permission>> = cache
            .get(&CacheKey::permissions("mem-1", "org-1"))
            .await
            .unwrap();
        assert_eq!(perms.unwrap().len(), 5);

        let cached: Option<AuthContext> = cache
            .get(&CacheKey::auth_context("mem-1", "org-1"))
            .await
            .unwrap();
        assert_eq!(cached, Some(ctx));
    }

    #[tokio::test]
    async fn test_unknown_member_is_none() {
        let (resolver, _store, _cache) = setup(MemberRole::Manager).await;
        let ctx = resolver
            .resolve(&UserId::new("stranger"), &OrganizationId::new("org-1"))
            .await
            .unwrap();
        assert!(ctx.is_none());
    }

    #[tokio::test]
    async fn test_cached_member_data_skips_store() {
        let (resolver, store, _cache) = setup(MemberRole::Manager).await;
        let user = UserId::new("user-1");
        let org = OrganizationId::new("org-1");
        resolver.resolve(&user, &org).await.unwrap();

        store.set_failing(StoreOperation::ReadMember, true);
        let ctx = resolver.resolve(&user, &org).await.unwrap();
        assert!(ctx.is_some());
    }

    #[tokio::test]
    async fn test_stale_member_data_rereads_store() {
        let (resolver, store, cache) = setup(MemberRole::Manager).await;
        let stale = CachedMemberData {
            id: MemberId::new("mem-1"),
            role: MemberRole::Guest,
            custom_roles: vec![],
            last_updated: chrono::Utc::now() - chrono::Duration::seconds(3600),
        };
        cache
            .set(&CacheKey::member_data("user-1", "org-1"), &stale)
            .await
            .unwrap();

        store.set_failing(StoreOperation::ReadMember, true);
        let err = resolver
            .resolve(&UserId::new("user-1"), &OrganizationId::new("org-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::DatabaseConnectionFailed);

        store.set_failing(StoreOperation::ReadMember, false);
        let ctx = resolver
            .resolve(&UserId::new("user-1"), &OrganizationId::new("org-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.role, MemberRole::Manager);
    }

    #[tokio::test]
    async fn test_corrupt_context_entry_is_rebuilt() {
        let (resolver, _store, cache) = setup(MemberRole::Manager).await;
        cache
            .set(&CacheKey::auth_context("mem-1", "org-1"), &"garbage")
            .await
            .unwrap();

        let ctx = resolver
            .resolve(&UserId::new("user-1"), &OrganizationId::new("org-1"))
            .await
            .unwrap()
            .unwrap();
        assert!(ctx.has_permission("product:create"));
    }

    #[tokio::test]
    async fn test_auth_request_memoizes() {
        let (resolver, store, _cache) = setup(MemberRole::Manager).await;
        let request = AuthRequest::for_user("user-1", "org-1");

        let first = request.context(&resolver).await.unwrap().cloned();
        assert!(first.is_some());

        // Further calls on the same request never touch the store or cache
        store.set_failing(StoreOperation::ReadMember, true);
        let second = request.context(&resolver).await.unwrap().cloned();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_anonymous_request_has_no_context() {
        let (resolver, _store, _cache) = setup(MemberRole::Manager).await;
        let request = AuthRequest::anonymous("org-1");
        assert!(request.context(&resolver).await.unwrap().is_none());
    }
}
