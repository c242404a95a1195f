//! API request handlers.
//!
//! Authorization failures render through `AccessError`'s `IntoResponse`, all
//! other failures through `WardenError`'s.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Serialize;

use super::AppContext;
use crate::error::WardenError;
use crate::rbac::{AccessError, AuthContext, AuthRequest, CallerIdentity, MemberId, OrganizationId};

fn auth_request(identity: Option<Extension<CallerIdentity>>, org_id: String) -> AuthRequest {
    AuthRequest::new(identity.map(|Extension(id)| id.user_id), OrganizationId::from(org_id))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct ComponentStatus {
    healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentStatus {
    fn from_result(result: crate::error::Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                healthy: true,
                error: None,
            },
            Err(e) => Self {
                healthy: false,
                error: Some(e.user_message().to_string()),
            },
        }
    }
}

pub async fn health_check(State(state): State<AppContext>) -> impl IntoResponse {
    let cache = ComponentStatus::from_result(state.cache.ping().await);
    let database = match &state.database {
        Some(db) => ComponentStatus::from_result(db.ping().await),
        None => ComponentStatus {
            healthy: true,
            error: None,
        },
    };

    // The cache degrades gracefully; only the store decides readiness
    let status = if database.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if database.healthy && cache.healthy { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "components": {
                "cache": cache,
                "database": database,
            }
        })),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authorization
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionCheckResponse {
    pub granted: bool,
    pub permission: String,
    pub context: AuthContext,
}

/// GET /v1/organizations/:org_id/context
pub async fn get_context(
    State(state): State<AppContext>,
    identity: Option<Extension<CallerIdentity>>,
    Path(org_id): Path<String>,
) -> Result<Json<AuthContext>, AccessError> {
    let request = auth_request(identity, org_id);
    state
        .enforcer
        .create_auth_context(&request)
        .await?
        .map(Json)
        .ok_or(AccessError::Unauthenticated)
}

/// GET /v1/organizations/:org_id/permissions/:permission
pub async fn check_permission(
    State(state): State<AppContext>,
    identity: Option<Extension<CallerIdentity>>,
    Path((org_id, permission)): Path<(String, String)>,
) -> Result<Json<PermissionCheckResponse>, AccessError> {
    let request = auth_request(identity, org_id);
    let context = state.enforcer.require_permission(&request, &permission).await?;
    Ok(Json(PermissionCheckResponse {
        granted: true,
        permission,
        context,
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache and Ban Administration
// ═══════════════════════════════════════════════════════════════════════════════

/// DELETE /v1/organizations/:org_id/members/:member_id/cache
pub async fn invalidate_member_cache(
    State(state): State<AppContext>,
    Path((org_id, member_id)): Path<(String, String)>,
) -> StatusCode {
    state
        .enforcer
        .invalidate_auth_cache(&MemberId::from(member_id), &OrganizationId::from(org_id))
        .await;
    StatusCode::NO_CONTENT
}

/// DELETE /v1/organizations/:org_id/cache
pub async fn invalidate_organization_cache(
    State(state): State<AppContext>,
    Path(org_id): Path<String>,
) -> StatusCode {
    state
        .enforcer
        .invalidate_organization_auth_cache(&OrganizationId::from(org_id))
        .await;
    StatusCode::NO_CONTENT
}

/// DELETE /v1/organizations/:org_id/members/:member_id/ban
///
/// The caller needs `member:update` in the same organization.
pub async fn clear_member_ban(
    State(state): State<AppContext>,
    identity: Option<Extension<CallerIdentity>>,
    Path((org_id, member_id)): Path<(String, String)>,
) -> Result<StatusCode, AccessError> {
    let request = auth_request(identity, org_id);
    state.enforcer.require_permission(&request, "member:update").await?;

    let member_id = MemberId::from(member_id);
    if state
        .enforcer
        .clear_member_ban(&member_id, request.organization_id())
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(WardenError::not_found("member", member_id.as_str()).into())
    }
}
