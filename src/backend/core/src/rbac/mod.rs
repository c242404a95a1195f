//! Multi-tenant role-based access control.
//!
//! This module provides:
//! - **Models**: identifiers, permission strings, built-in and custom roles
//! - **Catalog**: the static role → permission table
//! - **Matcher**: wildcard permission matching
//! - **Resolver**: cached member context resolution
//! - **Tracker**: failed-attempt counting and escalating bans
//! - **Audit**: fire-and-forget audit trail of denials
//! - **Enforcer**: the entrypoint tying the above together
//! - **Middleware**: Axum layer and extractor
//!
//! # Usage
//!
//! ```rust,ignore
//! use warden_core::rbac::{AuthRequest, Enforcer};
//!
//! let enforcer = Enforcer::new(cache, store.clone(), store, config.authz);
//! let request = AuthRequest::for_user("user-1", "org-1");
//! let ctx = enforcer.require_permission(&request, "product:create").await?;
//! ```

pub mod audit;
pub mod catalog;
pub mod context;
pub mod enforcer;
pub mod error;
pub mod matcher;
pub mod middleware;
pub mod models;
pub mod resolver;
pub mod tracker;

pub use audit::{AuditAction, AuditLogEntry, AuditLogger};
pub use context::AuthContext;
pub use enforcer::Enforcer;
pub use error::{AccessError, PermissionDenial};
pub use matcher::PermissionSet;
pub use middleware::{CallerIdentity, RequirePermissionLayer, RequirePermissionService};
pub use models::{
    CachedMemberData, CustomRole, Member, MemberId, MemberRole, OrganizationId, Permission, UserId,
};
pub use resolver::{AuthRequest, MemberContextResolver};
pub use tracker::{AbuseTracker, AttemptStatus, DenialRecord};
