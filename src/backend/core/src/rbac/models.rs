//! RBAC data models: identifiers, permission strings, roles and members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identity-provider user identifier.
    UserId
);

string_id!(
    /// Membership identifier; one per (user, organization).
    MemberId
);

string_id!(
    /// Tenant identifier.
    OrganizationId
);

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// A colon-separated permission string such as `sale:view:own`.
///
/// A trailing `*` segment grants everything below its prefix (`product:*`),
/// and a bare `*` grants everything. Permission strings are opaque beyond
/// their segments; no catalog membership is required.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    pub const WILDCARD: &'static str = "*";

    pub fn new(permission: impl Into<String>) -> Self {
        Self(permission.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub const SEPARATOR: char = ':';

    /// Split into colon-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        Self::tokenize(&self.0)
    }

    /// Split a raw permission string into its segments.
    pub fn tokenize(raw: &str) -> impl Iterator<Item = &str> + '_ {
        raw.split(Self::SEPARATOR)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Permission {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Permission {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Member Role
// ═══════════════════════════════════════════════════════════════════════════════

/// Built-in role held by every organization member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Owner,
    Admin,
    Manager,
    Employee,
    Cashier,
    Reporter,
    Customer,
    Guest,
}

impl MemberRole {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Admin => "ADMIN",
            Self::Manager => "MANAGER",
            Self::Employee => "EMPLOYEE",
            Self::Cashier => "CASHIER",
            Self::Reporter => "REPORTER",
            Self::Customer => "CUSTOMER",
            Self::Guest => "GUEST",
        }
    }

    /// Owners hold every permission without consulting the matcher.
    pub const fn is_owner(&self) -> bool {
        matches!(self, Self::Owner)
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a role name is not one of the built-in roles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown member role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for MemberRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(Self::Owner),
            "ADMIN" => Ok(Self::Admin),
            "MANAGER" => Ok(Self::Manager),
            "EMPLOYEE" => Ok(Self::Employee),
            "CASHIER" => Ok(Self::Cashier),
            "REPORTER" => Ok(Self::Reporter),
            "CUSTOMER" => Ok(Self::Customer),
            "GUEST" => Ok(Self::Guest),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Custom Roles and Members
// ═══════════════════════════════════════════════════════════════════════════════

/// Organization-defined bundle of permission strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRole {
    pub id: String,
    pub name: String,
    pub permissions: Vec<Permission>,
}

impl CustomRole {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        permissions: impl IntoIterator<Item = impl Into<Permission>>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }
}

/// An active membership of a user in an organization, with its custom roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: MemberRole,
    pub is_active: bool,
    pub custom_roles: Vec<CustomRole>,
}

/// Member snapshot stored under `member:data:{user}:{org}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMemberData {
    pub id: MemberId,
    pub role: MemberRole,
    pub custom_roles: Vec<CustomRole>,
    pub last_updated: DateTime<Utc>,
}

impl CachedMemberData {
    pub fn from_member(member: &Member) -> Self {
        Self {
            id: member.id.clone(),
            role: member.role,
            custom_roles: member.custom_roles.clone(),
            last_updated: Utc::now(),
        }
    }

    /// Whether the snapshot is younger than `max_age`.
    ///
    /// Snapshots stamped in the future (clock skew) count as fresh.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        match Utc::now().signed_duration_since(self.last_updated).to_std() {
            Ok(age) => age < max_age,
            Err(_) => true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
