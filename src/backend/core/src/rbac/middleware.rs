//! Axum authorization middleware that enforces permissions on requests.
//!
//! The layer reads the [`CallerIdentity`] placed in request extensions by the
//! upstream session gateway and the organization from the
//! `x-organization-id` header, runs the [`Enforcer`], and on success injects
//! the resolved [`AuthContext`] for handlers to extract.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use super::context::AuthContext;
use super::enforcer::Enforcer;
use super::error::AccessError;
use super::models::{OrganizationId, Permission, UserId};
use super::resolver::AuthRequest;

/// Header carrying the organization a request acts in.
pub const ORGANIZATION_HEADER: &str = "x-organization-id";

// ═══════════════════════════════════════════════════════════════════════════════
// Caller identity
// ═══════════════════════════════════════════════════════════════════════════════

/// Authenticated caller, as established by the session provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: UserId,
}

impl CallerIdentity {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Organization named by the `x-organization-id` header, if any.
pub fn organization_from_headers(headers: &HeaderMap) -> Option<OrganizationId> {
    headers
        .get(ORGANIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(OrganizationId::from)
}

/// Build the per-request [`AuthRequest`] from extensions and headers.
///
/// `None` when the organization header is absent.
pub fn auth_request_from(request: &Request<Body>) -> Option<AuthRequest> {
    let organization_id = organization_from_headers(request.headers())?;
    let user_id = request
        .extensions()
        .get::<CallerIdentity>()
        .map(|identity| identity.user_id.clone());
    Some(AuthRequest::new(user_id, organization_id))
}

// ═══════════════════════════════════════════════════════════════════════════════
// AuthContext extractor
// ═══════════════════════════════════════════════════════════════════════════════

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthContext>().cloned().ok_or_else(|| {
            let body = serde_json::json!({
                "success": false,
                "error": {
                    "code": "MISSING_AUTH_CONTEXT",
                    "message": "Authorization context not available. Ensure the permission layer is applied.",
                }
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that wraps services with permission enforcement.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/products", post(create_product))
///     .layer(RequirePermissionLayer::new(enforcer.clone(), "product:create"));
/// ```
#[derive(Clone)]
pub struct RequirePermissionLayer {
    enforcer: Enforcer,
    permission: Permission,
}

impl RequirePermissionLayer {
    pub fn new(enforcer: Enforcer, permission: impl Into<Permission>) -> Self {
        Self {
            enforcer,
            permission: permission.into(),
        }
    }
}

impl<S> Layer<S> for RequirePermissionLayer {
    type Service = RequirePermissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePermissionService {
            inner,
            enforcer: self.enforcer.clone(),
            permission: self.permission.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Service that enforces a required permission per request.
#[derive(Clone)]
pub struct RequirePermissionService<S> {
    inner: S,
    enforcer: Enforcer,
    permission: Permission,
}

impl<S> Service<Request<Body>> for RequirePermissionService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let enforcer = self.enforcer.clone();
        let permission = self.permission.clone();
        // Take the service that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let auth_request = match auth_request_from(&request) {
                Some(auth_request) => auth_request,
                None => return Ok(AccessError::Unauthenticated.into_response()),
            };

            match enforcer
                .require_permission(&auth_request, permission.as_str())
                .await
            {
                Ok(context) => {
                    request.extensions_mut().insert(context);
                    inner.call(request).await
                }
                Err(e) => Ok(e.into_response()),
            }
        })
    }
}
