use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use super::schema::ApiResponse;
use crate::error::ApprovalError;

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code,
            message: message.into(),
        }
    }
}

impl From<ApprovalError> for AppError {
    fn from(err: ApprovalError) -> Self {
        let status = match &err {
            ApprovalError::FlowNotConfigured(_) | ApprovalError::FlowHasNoSteps(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApprovalError::FlowNotFound(_) | ApprovalError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            ApprovalError::RecordAlreadyClosed { .. }
            | ApprovalError::DuplicateEnabledFlow { .. }
            | ApprovalError::Contention { .. } => StatusCode::CONFLICT,
            ApprovalError::InvalidFlow(_)
            | ApprovalError::InvalidSelector(_)
            | ApprovalError::InvalidAction(_) => StatusCode::BAD_REQUEST,
            ApprovalError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %err, "approval request failed");
        }
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::error(self.code, self.message))).into_response()
    }
}
