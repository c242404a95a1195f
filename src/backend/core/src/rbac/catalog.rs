//! Built-in role permissions and the catalog of assignable permissions.
//!
//! | Role     | Grants                                                        |
//! |----------|---------------------------------------------------------------|
//! | OWNER    | `organization:*` (and bypasses matching entirely)             |
//! | ADMIN    | every business resource, member/role/invitation management    |
//! | MANAGER  | day-to-day product, sale, expense, inventory and purchasing   |
//! | EMPLOYEE | own sales and expenses, customers, chat                       |
//! | CASHIER  | point-of-sale only                                            |
//! | REPORTER | read-only reporting                                           |
//! | CUSTOMER | nothing                                                       |
//! | GUEST    | `chat:view`                                                   |

use super::models::{MemberRole, Permission};

const OWNER: &[&str] = &["organization:*"];

const ADMIN: &[&str] = &[
    "product:*",
    "sale:*",
    "expense:*",
    "report:*",
    "inventory:*",
    "purchase:*",
    "customer:*",
    "supplier:*",
    "member:create",
    "member:view",
    "member:update",
    "member:deactivate",
    "invitation:create",
    "invitation:view",
    "invitation:delete",
    "organization:settings:view",
    "organization:settings:update",
    "role:view",
    "role:create",
    "role:update",
    "role:delete",
    "chat:manage",
    "audit:view",
];

const MANAGER: &[&str] = &[
    "product:view",
    "product:create",
    "product:update",
    "sale:view",
    "sale:create",
    "sale:cancel",
    "expense:view",
    "expense:create",
    "expense:update",
    "expense:approve",
    "report:view",
    "inventory:view",
    "inventory:adjust",
    "purchase:view",
    "purchase:create",
    "purchase:update",
    "customer:view",
    "customer:create",
    "customer:update",
    "supplier:view",
    "supplier:create",
    "categories*",
];

const EMPLOYEE: &[&str] = &[
    "product:view",
    "sale:view:own",
    "sale:create",
    "expense:view:own",
    "expense:create",
    "customer:view",
    "customer:create",
    "chat:view",
    "chat:create",
];

const CASHIER: &[&str] = &["sale:create", "sale:view:own", "customer:view", "customer:create"];

const REPORTER: &[&str] = &[
    "report:view",
    "sale:view",
    "product:view",
    "expense:view",
    "inventory:view",
];

const CUSTOMER: &[&str] = &[];

const GUEST: &[&str] = &["chat:view"];

/// Every assignable permission, grouped by resource, for custom-role editors.
const PERMISSION_GROUPS: &[(&str, &[&str])] = &[
    (
        "organization",
        &[
            "organization:settings:view",
            "organization:settings:update",
            "organization:billing:view",
            "organization:billing:manage",
            "organization:delete",
        ],
    ),
    (
        "product",
        &[
            "product:view",
            "product:create",
            "product:update",
            "product:delete",
            "product:update:marketing",
        ],
    ),
    (
        "sale",
        &[
            "sale:view",
            "sale:view:own",
            "sale:create",
            "sale:update",
            "sale:cancel",
            "sale:process_payment",
        ],
    ),
    (
        "expense",
        &[
            "expense:view",
            "expense:view:own",
            "expense:create",
            "expense:update",
            "expense:delete",
            "expense:approve",
            "expense:reimburse",
        ],
    ),
    (
        "report",
        &["report:view", "report:view:financial", "report:create", "report:share"],
    ),
    (
        "inventory",
        &[
            "inventory:view",
            "inventory:adjust",
            "location:view",
            "location:create",
            "location:update",
            "location:delete",
        ],
    ),
    (
        "purchase",
        &[
            "purchase:view",
            "purchase:create",
            "purchase:update",
            "purchase:delete",
            "purchase:receive",
        ],
    ),
    (
        "member",
        &[
            "member:view",
            "member:create",
            "member:update",
            "member:deactivate",
            "member:delete",
        ],
    ),
    ("invitation", &["invitation:view", "invitation:create", "invitation:delete"]),
    (
        "customer",
        &["customer:view", "customer:create", "customer:update", "customer:delete"],
    ),
    (
        "supplier",
        &["supplier:view", "supplier:create", "supplier:update", "supplier:delete"],
    ),
    ("return", &["return:view", "return:create", "return:process"]),
    ("attendance", &["attendance:view", "attendance:manage", "attendance:log"]),
    ("audit", &["audit:view"]),
    ("chat", &["chat:view", "chat:create", "chat:manage", "chat:delete"]),
    ("role", &["role:view", "role:create", "role:update", "role:delete"]),
    ("tax", &["tax:view", "tax:create", "tax:update", "tax:delete"]),
    (
        "department",
        &["department:view", "department:create", "department:update", "department:delete"],
    ),
    ("budget", &["budget:view", "budget:create", "budget:update", "budget:delete"]),
    ("account", &["account:view", "account:create", "account:update", "account:delete"]),
    ("journal", &["journal:view", "journal:create", "journal:post", "journal:delete"]),
    ("fiscal_period", &["fiscal_period:view", "fiscal_period:manage"]),
];

/// Raw permission strings granted by a built-in role.
pub fn role_permissions(role: MemberRole) -> &'static [&'static str] {
    match role {
        MemberRole::Owner => OWNER,
        MemberRole::Admin => ADMIN,
        MemberRole::Manager => MANAGER,
        MemberRole::Employee => EMPLOYEE,
        MemberRole::Cashier => CASHIER,
        MemberRole::Reporter => REPORTER,
        MemberRole::Customer => CUSTOMER,
        MemberRole::Guest => GUEST,
    }
}

/// Permissions granted by a built-in role.
pub fn permissions_for(role: MemberRole) -> Vec<Permission> {
    role_permissions(role).iter().copied().map(Permission::from).collect()
}

/// Permissions for a role given by name; unknown names grant nothing.
pub fn permissions_for_name(role: &str) -> Vec<Permission> {
    role.parse::<MemberRole>()
        .map(permissions_for)
        .unwrap_or_default()
}

/// All built-in roles, most privileged first.
pub fn all_roles() -> [MemberRole; 8] {
    [
        MemberRole::Owner,
        MemberRole::Admin,
        MemberRole::Manager,
        MemberRole::Employee,
        MemberRole::Cashier,
        MemberRole::Reporter,
        MemberRole::Customer,
        MemberRole::Guest,
    ]
}

/// Assignable permissions grouped by resource.
pub fn permission_groups() -> &'static [(&'static str, &'static [&'static str])] {
    PERMISSION_GROUPS
}

/// Whether `permission` is one of the assignable permissions.
pub fn is_known_permission(permission: &str) -> bool {
    PERMISSION_GROUPS
        .iter()
        .any(|(_, perms)| perms.contains(&permission))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_role_has_an_entry() {
        for role in all_roles() {
            // CUSTOMER is intentionally empty; the rest grant something
            if role != MemberRole::Customer {
                assert!(!permissions_for(role).is_empty(), "{} has no permissions", role);
            }
        }
        assert!(permissions_for(MemberRole::Customer).is_empty());
    }

    #[test]
    fn test_unknown_role_name_is_empty() {
        assert!(permissions_for_name("SUPERUSER").is_empty());
        assert!(permissions_for_name("").is_empty());
        assert_eq!(
            permissions_for_name("GUEST"),
            vec![Permission::from("chat:view")]
        );
    }

    #[test]
    fn test_manager_catalog() {
        let perms = permissions_for(MemberRole::Manager);
        assert!(perms.contains(&Permission::from("product:create")));
        assert!(!perms.contains(&Permission::from("member:delete")));
        assert!(perms.contains(&Permission::from("categories*")));
    }

    #[test]
    fn test_permission_groups() {
        let resources: Vec<&str> = permission_groups().iter().map(|(r, _)| *r).collect();
        assert_eq!(resources.len(), 22);
        assert_eq!(resources.first(), Some(&"organization"));
        assert_eq!(resources.last(), Some(&"fiscal_period"));

        assert!(is_known_permission("journal:post"));
        assert!(is_known_permission("location:create"));
        assert!(!is_known_permission("product:*"));
        assert!(!is_known_permission("spaceship:launch"));
    }
}
