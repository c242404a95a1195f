//! The resolved authorization context for one member in one organization.

use serde::{Deserialize, Serialize};

use super::catalog;
use super::matcher::{self, PermissionSet};
use super::models::{CachedMemberData, MemberId, MemberRole, OrganizationId, UserId};

/// Who is acting, where, and with which permissions.
///
/// Only data is cached; the permission predicate is a method, so a context
/// read back from the cache behaves exactly like a freshly built one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub user_id: UserId,
    pub member_id: MemberId,
    pub organization_id: OrganizationId,
    pub role: MemberRole,
    pub custom_role_names: Vec<String>,
    pub permissions: PermissionSet,
}

impl AuthContext {
    pub fn new(
        user_id: UserId,
        organization_id: OrganizationId,
        member: &CachedMemberData,
        permissions: PermissionSet,
    ) -> Self {
        Self {
            user_id,
            member_id: member.id.clone(),
            organization_id,
            role: member.role,
            custom_role_names: member.custom_roles.iter().map(|r| r.name.clone()).collect(),
            permissions,
        }
    }

    /// Base-role permissions united with every custom role's permissions.
    pub fn effective_permissions(member: &CachedMemberData) -> PermissionSet {
        let mut permissions: PermissionSet = catalog::permissions_for(member.role).into_iter().collect();
        for role in &member.custom_roles {
            permissions.extend(role.permissions.iter().cloned());
        }
        permissions
    }

    /// Owners hold every permission; everyone else goes through the matcher.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.role.is_owner() || matcher::matches(&self.permissions, permission)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        self.role.is_owner() || matcher::matches_any(&self.permissions, permissions)
    }

    pub fn has_all_permissions<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        self.role.is_owner() || matcher::matches_all(&self.permissions, permissions)
    }

    /// The first of `permissions` this context does not hold.
    pub fn first_missing<'a, S: AsRef<str>>(&self, permissions: &'a [S]) -> Option<&'a str> {
        if self.role.is_owner() {
            return None;
        }
        matcher::first_unmatched(&self.permissions, permissions)
    }

    /// Whether this context was built for `user_id` in `organization_id`.
    pub fn belongs_to(&self, user_id: &UserId, organization_id: &OrganizationId) -> bool {
        &self.user_id == user_id && &self.organization_id == organization_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::{CustomRole, Permission};
    use chrono::Utc;

    fn data(role: MemberRole, custom: Vec<CustomRole>) -> CachedMemberData {
        CachedMemberData {
            id: MemberId::new("mem-1"),
            role,
            custom_roles: custom,
            last_updated: Utc::now(),
        }
    }

    fn context(role: MemberRole, custom: Vec<CustomRole>) -> AuthContext {
        let member = data(role, custom);
        let permissions = AuthContext::effective_permissions(&member);
        AuthContext::new(
            UserId::new("user-1"),
            OrganizationId::new("org-1"),
            &member,
            permissions,
        )
    }

    #[test]
    fn test_effective_permissions_union() {
        let ctx = context(
            MemberRole::Cashier,
            vec![
                CustomRole::new("cr-1", "Stock", ["inventory:adjust"]),
                CustomRole::new("cr-2", "Returns", ["return:*", "sale:create"]),
            ],
        );
        assert!(ctx.permissions.contains(&Permission::from("sale:create")));
        assert!(ctx.permissions.contains(&Permission::from("inventory:adjust")));
        assert!(ctx.permissions.contains(&Permission::from("return:*")));
        // sale:create appears twice but the set deduplicates
        assert_eq!(ctx.permissions.len(), 6);
        assert_eq!(ctx.custom_role_names, vec!["Stock", "Returns"]);

        assert!(ctx.has_permission("return:process"));
        assert!(!ctx.has_permission("product:delete"));
    }

    #[test]
    fn test_owner_bypasses_matcher() {
        let ctx = context(MemberRole::Owner, vec![]);
        assert!(ctx.has_permission("product:delete"));
        assert!(ctx.has_permission("anything:at:all"));
        assert!(ctx.has_all_permissions(&["member:delete", "journal:post"]));
        assert_eq!(ctx.first_missing(&["member:delete"]), None);
    }

    #[test]
    fn test_customer_has_nothing() {
        let ctx = context(MemberRole::Customer, vec![]);
        assert!(ctx.permissions.is_empty());
        assert!(!ctx.has_permission("chat:view"));
        assert!(!ctx.has_any_permission(&["chat:view", "product:view"]));
        assert_eq!(ctx.first_missing(&["chat:view", "product:view"]), Some("chat:view"));
    }

    #[test]
    fn test_serialized_context_keeps_predicate() {
        let ctx = context(MemberRole::Manager, vec![]);
        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"memberId\":\"mem-1\""));
        assert!(json.contains("\"role\":\"MANAGER\""));

        let restored: AuthContext = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ctx);
        assert!(restored.has_permission("product:create"));
        assert!(!restored.has_permission("member:delete"));
    }

    #[test]
    fn test_belongs_to() {
        let ctx = context(MemberRole::Guest, vec![]);
        assert!(ctx.belongs_to(&UserId::new("user-1"), &OrganizationId::new("org-1")));
        assert!(!ctx.belongs_to(&UserId::new("user-1"), &OrganizationId::new("org-2")));
    }
}
