//! Type-safe cache key generation.
//!
//! Every authorization cache family has a fixed prefix and a default TTL:
//!
//! | Family | Key | TTL |
//! |---|---|---|
//! | auth context | `auth:context:{member}:{org}` | 5 min |
//! | member data | `member:data:{user}:{org}` | 10 min |
//! | permission set | `permissions:{member}:{org}` | 15 min |
//! | failed attempts | `auth:failed-attempts:{member}:{permission}` | 1 h |
//! | ban flag | `auth:ban:{member}` | 24 h |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Key Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Enumeration of cache key families with associated default TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Fully resolved auth context (shortest TTL)
    AuthContext,

    /// Member role and custom roles, keyed by user
    MemberData,

    /// Effective permission set
    Permissions,

    /// Denial counter per (member, permission)
    FailedAttempts,

    /// Temporary ban flag
    Ban,
}

impl KeyType {
    /// Get the default TTL for this key type.
    pub const fn default_ttl(&self) -> Duration {
        match self {
            Self::AuthContext => Duration::from_secs(300),
            Self::MemberData => Duration::from_secs(600),
            Self::Permissions => Duration::from_secs(900),
            Self::FailedAttempts => Duration::from_secs(3600),
            Self::Ban => Duration::from_secs(86_400),
        }
    }

    /// Get the key type prefix for namespacing.
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::AuthContext => "auth:context",
            Self::MemberData => "member:data",
            Self::Permissions => "permissions",
            Self::FailedAttempts => "auth:failed-attempts",
            Self::Ban => "auth:ban",
        }
    }

    /// Families that are scoped to an organization and cleared on invalidation.
    pub const fn organization_scoped() -> [KeyType; 3] {
        [Self::AuthContext, Self::MemberData, Self::Permissions]
    }

    /// Glob pattern matching every key of this family for one organization.
    ///
    /// Only meaningful for the organization-scoped families, whose last
    /// segment is the organization id.
    pub fn organization_pattern(&self, organization_id: &str) -> String {
        format!("{}:*:{}", self.prefix(), escape_glob(organization_id))
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Escape glob metacharacters so an identifier only matches itself.
pub fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Key
// ═══════════════════════════════════════════════════════════════════════════════

/// A type-safe cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    key_type: KeyType,
    segments: Vec<String>,
}

impl CacheKey {
    /// Create a new cache key with the given type and no segments.
    pub fn new(key_type: KeyType) -> Self {
        Self {
            key_type,
            segments: Vec::new(),
        }
    }

    /// Add a key segment.
    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// `auth:context:{member}:{org}`
    pub fn auth_context(member_id: &str, organization_id: &str) -> Self {
        Self::new(KeyType::AuthContext)
            .with_segment(member_id)
            .with_segment(organization_id)
    }

    /// `member:data:{user}:{org}`
    pub fn member_data(user_id: &str, organization_id: &str) -> Self {
        Self::new(KeyType::MemberData)
            .with_segment(user_id)
            .with_segment(organization_id)
    }

    /// `permissions:{member}:{org}`
    pub fn permissions(member_id: &str, organization_id: &str) -> Self {
        Self::new(KeyType::Permissions)
            .with_segment(member_id)
            .with_segment(organization_id)
    }

    /// `auth:failed-attempts:{member}:{permission}`
    pub fn failed_attempts(member_id: &str, permission: &str) -> Self {
        Self::new(KeyType::FailedAttempts)
            .with_segment(member_id)
            .with_segment(permission)
    }

    /// `auth:ban:{member}`
    pub fn ban(member_id: &str) -> Self {
        Self::new(KeyType::Ban).with_segment(member_id)
    }

    /// Get the key type.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Default TTL of the key's family.
    pub fn ttl(&self) -> Duration {
        self.key_type.default_ttl()
    }

    /// Build the cache key string.
    pub fn build(&self) -> String {
        let mut key = String::from(self.key_type.prefix());
        for segment in &self.segments {
            key.push(':');
            key.push_str(segment);
        }
        key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
