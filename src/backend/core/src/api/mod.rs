//! HTTP surface of the authorization core.
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | GET | `/health` | store and cache connectivity |
//! | GET | `/v1/organizations/:org_id/context` | resolve the caller's context |
//! | GET | `/v1/organizations/:org_id/permissions/:permission` | enforce one permission |
//! | DELETE | `/v1/organizations/:org_id/members/:member_id/cache` | invalidate one member |
//! | DELETE | `/v1/organizations/:org_id/cache` | invalidate an organization |
//! | DELETE | `/v1/organizations/:org_id/members/:member_id/ban` | lift a ban (`member:update`) |
//!
//! The caller is identified by the `x-user-id` header, which the trusted
//! session gateway in front of this service sets.

mod handlers;
pub mod middleware;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cache::Cache;
use crate::config::{AuthzConfig, Config};
use crate::db::Database;
use crate::error::Result;
use crate::rbac::Enforcer;
use crate::store::{AuditStore, MemberStore};

pub use handlers::PermissionCheckResponse;

/// Shared dependencies of the service, created once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub enforcer: Enforcer,
    pub cache: Cache,
    pub database: Option<Database>,
}

impl AppContext {
    /// Connect PostgreSQL and Redis, run migrations, build the enforcer.
    pub async fn connect(config: &Config) -> Result<Self> {
        let database = Database::new(&config.database).await?;
        database.migrate().await?;
        info!("Connected to database");

        let cache = Cache::redis((&config.redis).into()).await?;
        info!(backend = cache.backend_name(), "Connected to cache");

        let store = Arc::new(database.clone());
        let enforcer = Enforcer::new(cache.clone(), store.clone(), store, config.authz.clone());

        Ok(Self {
            enforcer,
            cache,
            database: Some(database),
        })
    }

    /// Assemble a context from already-built parts; no database health check.
    pub fn from_parts(
        cache: Cache,
        members: Arc<dyn MemberStore>,
        audit: Arc<dyn AuditStore>,
        config: AuthzConfig,
    ) -> Self {
        Self {
            enforcer: Enforcer::new(cache.clone(), members, audit, config),
            cache,
            database: None,
        }
    }
}

/// Build the API router.
pub fn build_router(state: AppContext) -> Router {
    let organizations = Router::new()
        .route("/:org_id/context", get(handlers::get_context))
        .route("/:org_id/permissions/:permission", get(handlers::check_permission))
        .route("/:org_id/cache", delete(handlers::invalidate_organization_cache))
        .route(
            "/:org_id/members/:member_id/cache",
            delete(handlers::invalidate_member_cache),
        )
        .route("/:org_id/members/:member_id/ban", delete(handlers::clear_member_ban));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1/organizations", organizations)
        .layer(axum_middleware::from_fn(middleware::caller_identity))
        .layer(axum_middleware::from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
