//! Authorization failures and their HTTP rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use super::models::Permission;
use super::tracker::AttemptStatus;
use crate::error::{ErrorCode, WardenError};

/// What the caller was denied and how close they are to a ban.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDenial {
    pub permission: Permission,
    pub attempts: u32,
    pub is_banned: bool,
    pub status: AttemptStatus,
    /// Set when this denial is the one that applied the ban.
    pub escalated: bool,
    max_attempts: u32,
}

impl PermissionDenial {
    /// Denial produced by the attempt tracker.
    pub fn counted(
        permission: impl Into<Permission>,
        attempts: u32,
        status: AttemptStatus,
        max_attempts: u32,
    ) -> Self {
        Self {
            permission: permission.into(),
            attempts,
            is_banned: status.is_banned(),
            status,
            escalated: status.is_banned(),
            max_attempts,
        }
    }

    /// Denial for a member who was already banned before this check.
    pub fn already_banned(permission: impl Into<Permission>, max_attempts: u32) -> Self {
        Self {
            permission: permission.into(),
            attempts: max_attempts,
            is_banned: true,
            status: AttemptStatus::Banned,
            escalated: false,
            max_attempts,
        }
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Client-facing explanation, escalating with the attempt count.
    pub fn client_message(&self) -> String {
        match self.status {
            AttemptStatus::Banned => "Access Denied. You have been temporarily banned for making too many \
                unauthorized requests. Please contact your organization administrator to be unbanned."
                .to_string(),
            AttemptStatus::FinalWarning => format!(
                "Warning: Permission denied. You have {} attempt(s) left before your account is \
                 temporarily banned. Please contact an administrator if you believe this is an error.",
                self.remaining_attempts()
            ),
            AttemptStatus::Warned { .. } => format!(
                "Permission denied. You have {} attempt(s) left. Please contact your organization \
                 administrator if you need access.",
                self.remaining_attempts()
            ),
            AttemptStatus::Ok => "You do not have permission to perform this action. Please contact \
                your organization administrator."
                .to_string(),
        }
    }
}

/// Why an authorization check did not grant.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Unauthorized: You must be logged in and a member of the organization to perform this action.")]
    Unauthenticated,

    #[error("{}", banned_message(.0))]
    Banned(PermissionDenial),

    #[error("Forbidden: You do not have the required permission: '{}'", .0.permission)]
    Forbidden(PermissionDenial),

    #[error(transparent)]
    Infrastructure(#[from] WardenError),
}

fn banned_message(denial: &PermissionDenial) -> String {
    if denial.escalated {
        format!(
            "Forbidden: You do not have the required permission: '{}'. You are now banned.",
            denial.permission
        )
    } else {
        "Access blocked: Your account is temporarily restricted due to too many failed \
         authorization attempts."
            .to_string()
    }
}

impl AccessError {
    /// Denial details for Banned and Forbidden.
    pub fn denial(&self) -> Option<&PermissionDenial> {
        match self {
            Self::Banned(denial) | Self::Forbidden(denial) => Some(denial),
            _ => None,
        }
    }

    pub fn is_banned(&self) -> bool {
        matches!(self, Self::Banned(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Banned(_) | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Infrastructure(e) => e.http_status(),
        }
    }

    /// Short label used for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Banned(_) => "banned",
            Self::Forbidden(_) => "forbidden",
            Self::Infrastructure(_) => "error",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DenialDetails<'a> {
    attempts: u32,
    is_banned: bool,
    remaining_attempts: u32,
    required_permission: &'a str,
}

fn denial_response(code: ErrorCode, denial: &PermissionDenial) -> Response {
    let details = DenialDetails {
        attempts: denial.attempts,
        is_banned: denial.is_banned,
        remaining_attempts: denial.remaining_attempts(),
        required_permission: denial.permission.as_str(),
    };
    let body = serde_json::json!({
        "success": false,
        "error": {
            "code": code,
            "message": denial.client_message(),
            "details": details,
        }
    });
    (code.http_status(), Json(body)).into_response()
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        match self {
            Self::Infrastructure(e) => e.into_response(),
            Self::Banned(denial) => denial_response(ErrorCode::Banned, &denial),
            Self::Forbidden(denial) => denial_response(ErrorCode::Forbidden, &denial),
            Self::Unauthenticated => {
                let body = serde_json::json!({
                    "success": false,
                    "error": {
                        "code": ErrorCode::Unauthorized,
                        "message": Self::Unauthenticated.to_string(),
                    }
                });
                (ErrorCode::Unauthorized.http_status(), Json(body)).into_response()
            }
        }
    }
}
