#![allow(clippy::result_large_err)]
//! # Warden Core
//!
//! Multi-tenant authorization: resolves what a member may do in an
//! organization, enforces it, and bans members who keep probing.
//!
//! ## Architecture
//!
//! - **Cache**: typed JSON cache over in-memory or Redis backends, with atomic counters
//! - **RBAC**: permission catalog, wildcard matcher, context resolver, abuse tracker, audit log
//! - **Store**: durable member/ban/audit interfaces with in-memory and PostgreSQL implementations
//! - **API**: Axum routes and a tower layer enforcing permissions per request
//! - **Telemetry**: structured logging with tracing-subscriber

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod rbac;
pub mod store;
pub mod telemetry;

pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, Result, WardenError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{build_router, AppContext};
    pub use crate::cache::{Cache, CacheBackend, CacheKey, InMemoryBackend, KeyType, RedisBackend};
    pub use crate::config::{AuthzConfig, Config};
    pub use crate::error::{ErrorCode, Result, WardenError};
    pub use crate::rbac::{
        AccessError, AttemptStatus, AuthContext, AuthRequest, CallerIdentity, Enforcer, Member,
        MemberId, MemberRole, OrganizationId, Permission, RequirePermissionLayer, UserId,
    };
    pub use crate::store::{AuditStore, InMemoryStore, MemberStore};
}
