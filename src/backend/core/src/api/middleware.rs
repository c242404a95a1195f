//! Request middleware for the authorization API.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::rbac::CallerIdentity;

/// Header carrying the authenticated user id, set by the session gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Turn the gateway's `x-user-id` header into a [`CallerIdentity`] extension.
///
/// Requests without the header proceed anonymously.
pub async fn caller_identity(mut req: Request, next: Next) -> Response {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    if let Some(user_id) = user_id {
        req.extensions_mut().insert(CallerIdentity::new(user_id));
    }

    next.run(req).await
}

/// Echo or mint `x-request-id` on every response.
pub async fn request_id(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut response = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&request_id) {
        let _ = response
            .headers_mut()
            .try_insert(HeaderName::from_static("x-request-id"), val);
    }
    response
}
