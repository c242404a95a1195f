//! Wildcard permission matching.
//!
//! A required permission `a:b:c` is granted when the held set contains, in
//! order of checking:
//!
//! 1. the universal grant `*`
//! 2. `a:b:c` itself
//! 3. `a:b:*`, then `a:*` (every proper prefix with a trailing wildcard)
//!
//! Nothing else matches. In particular `a*` (no colon) only ever matches the
//! literal string `a*`, and a single-segment requirement has no wildcard
//! candidates. Owners are not special-cased here; callers skip the matcher
//! for them.

use std::collections::BTreeSet;

use super::models::Permission;

/// Held permissions, ordered so snapshots serialize deterministically.
pub type PermissionSet = BTreeSet<Permission>;

/// Whether `granted` satisfies `required`.
pub fn matches(granted: &PermissionSet, required: &str) -> bool {
    if granted.contains(Permission::WILDCARD) || granted.contains(required) {
        return true;
    }

    // Longest prefix first: a:b:c tries a:b:* then a:*
    let segments: Vec<&str> = Permission::tokenize(required).collect();
    let mut candidate = String::with_capacity(required.len() + 1);
    for prefix_len in (1..segments.len()).rev() {
        candidate.clear();
        for segment in &segments[..prefix_len] {
            candidate.push_str(segment);
            candidate.push(Permission::SEPARATOR);
        }
        candidate.push_str(Permission::WILDCARD);
        if granted.contains(candidate.as_str()) {
            return true;
        }
    }

    false
}

/// Whether `granted` satisfies at least one of `required`.
pub fn matches_any<S: AsRef<str>>(granted: &PermissionSet, required: &[S]) -> bool {
    required.iter().any(|p| matches(granted, p.as_ref()))
}

/// Whether `granted` satisfies every one of `required`; vacuously true when empty.
pub fn matches_all<S: AsRef<str>>(granted: &PermissionSet, required: &[S]) -> bool {
    required.iter().all(|p| matches(granted, p.as_ref()))
}

/// The first of `required` that `granted` does not satisfy.
pub fn first_unmatched<'a, S: AsRef<str>>(granted: &PermissionSet, required: &'a [S]) -> Option<&'a str> {
    required
        .iter()
        .map(|p| p.as_ref())
        .find(|p| !matches(granted, p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(perms: &[&str]) -> PermissionSet {
        perms.iter().copied().map(Permission::from).collect()
    }

    #[test]
    fn test_universal_grant() {
        let granted = set(&["*"]);
        assert!(matches(&granted, "product:create"));
        assert!(matches(&granted, "anything"));
        assert!(matches(&granted, "a:b:c:d"));
    }

    #[test]
    fn test_exact_match() {
        let granted = set(&["sale:view:own"]);
        assert!(matches(&granted, "sale:view:own"));
        assert!(!matches(&granted, "sale:view"));
        assert!(!matches(&granted, "sale:view:all"));
    }

    #[test]
    fn test_resource_wildcard() {
        let granted = set(&["product:*"]);
        assert!(matches(&granted, "product:create"));
        assert!(matches(&granted, "product:update:marketing"));
        assert!(!matches(&granted, "sale:create"));
        assert!(!matches(&granted, "products:create"));
        // A wildcard does not grant its bare resource
        assert!(!matches(&granted, "product"));
    }

    #[test]
    fn test_nested_wildcard() {
        let granted = set(&["organization:settings:*"]);
        assert!(matches(&granted, "organization:settings:update"));
        assert!(!matches(&granted, "organization:delete"));

        let owner = set(&["organization:*"]);
        assert!(matches(&owner, "organization:settings:update"));
        assert!(!matches(&owner, "product:create"));
    }

    #[test]
    fn test_colonless_wildcard_is_literal() {
        let granted = set(&["categories*"]);
        assert!(!matches(&granted, "categories:view"));
        assert!(!matches(&granted, "categories"));
        assert!(matches(&granted, "categories*"));
    }

    #[test]
    fn test_single_segment_requirement() {
        let granted = set(&["report:*"]);
        assert!(!matches(&granted, "report"));
        assert!(matches(&set(&["report"]), "report"));
    }

    #[test]
    fn test_empty_set_denies() {
        assert!(!matches(&PermissionSet::new(), "chat:view"));
    }

    #[test]
    fn test_any_and_all() {
        let granted = set(&["product:*", "sale:create"]);
        assert!(matches_any(&granted, &["member:delete", "sale:create"]));
        assert!(!matches_any(&granted, &["member:delete", "audit:view"]));
        assert!(matches_all(&granted, &["product:view", "sale:create"]));
        assert!(!matches_all(&granted, &["product:view", "sale:cancel"]));
        assert!(matches_all::<&str>(&granted, &[]));
        assert!(!matches_any::<&str>(&granted, &[]));

        assert_eq!(
            first_unmatched(&granted, &["product:view", "sale:cancel", "audit:view"]),
            Some("sale:cancel")
        );
        assert_eq!(first_unmatched(&granted, &["product:view"]), None);
    }
}
