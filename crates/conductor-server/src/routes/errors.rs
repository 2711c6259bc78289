//! Maps each `ConductorError` variant onto an HTTP status and a stable
//! error code: policy denial and validation failures are 4xx, capability
//! and internal failures are 5xx. Never leaks a raw stack trace.

use axum::{http::StatusCode, response::IntoResponse, Json};
use conductor::ConductorError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub struct ApiError(pub StatusCode, pub ErrorResponse);

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<ConductorError> for ApiError {
    fn from(err: ConductorError) -> Self {
        let status = match &err {
            ConductorError::PolicyDenied { .. } => StatusCode::FORBIDDEN,
            ConductorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ConductorError::TaskNotFound(_)
            | ConductorError::RoomNotFound(_)
            | ConductorError::ApprovalNotFound(_) => StatusCode::NOT_FOUND,
            ConductorError::ApprovalAlreadyResolved(_) => StatusCode::CONFLICT,
            ConductorError::NoRoomAvailable(_) | ConductorError::PrivacyLocalOnly => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ConductorError::DepthExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ConductorError::UnknownInstrument(_) | ConductorError::InvalidLoopProposal(_) => {
                StatusCode::BAD_REQUEST
            }
            ConductorError::Capability(_) | ConductorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let name = match &err {
            ConductorError::Capability(_) => "capability_error",
            ConductorError::DepthExceeded { .. } => "depth_exceeded",
            ConductorError::PolicyDenied { .. } => "policy_denied",
            ConductorError::ApprovalNotFound(_) => "approval_not_found",
            ConductorError::ApprovalAlreadyResolved(_) => "approval_already_resolved",
            ConductorError::TaskNotFound(_) => "task_not_found",
            ConductorError::RoomNotFound(_) => "room_not_found",
            ConductorError::NoRoomAvailable(_) => "no_room_available",
            ConductorError::PrivacyLocalOnly => "privacy_local_only",
            ConductorError::UnknownInstrument(_) => "unknown_instrument",
            ConductorError::InvalidLoopProposal(_) => "invalid_loop_proposal",
            ConductorError::InvalidInput(_) => "invalid_input",
            ConductorError::Internal(_) => "internal_error",
        };
        ApiError(
            status,
            ErrorResponse {
                error: name.to_string(),
                message: err.to_string(),
            },
        )
    }
}
