use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use sea_orm::DbErr;
use serde::Serialize;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`,
    /// `INVALID_ACTIVITY`, `POLICY_VIOLATION`, `TOKEN_MISSING`,
    /// `TOKEN_INVALID`, `PERMISSION_DENIED`, `NOT_FOUND`, `CONFLICT`,
    /// `ALREADY_COMPLETED`, `STORAGE_UNAVAILABLE`, `INTERNAL_ERROR`.
    #[schema(example = "POLICY_VIOLATION")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Maximum 3 files allowed")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    /// Malformed variant-specific activity fields.
    InvalidActivity(String),
    /// File count/kind/size outside the activity's allowed envelope.
    PolicyViolation(String),
    TokenMissing,
    TokenInvalid,
    PermissionDenied,
    NotFound(String),
    Conflict(String),
    /// Participant already holds a completion mark on the activity.
    AlreadyCompleted,
    /// Object store unreachable or an individual object missing. Internal
    /// detail is logged, never returned to the caller.
    StorageUnavailable(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::InvalidActivity(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "INVALID_ACTIVITY",
                    message: msg,
                },
            ),
            AppError::PolicyViolation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    code: "POLICY_VIOLATION",
                    message: msg,
                },
            ),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_MISSING",
                    message: "Authentication required".into(),
                },
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_INVALID",
                    message: "Invalid or expired token".into(),
                },
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "PERMISSION_DENIED",
                    message: "Insufficient permissions".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "CONFLICT",
                    message: msg,
                },
            ),
            AppError::AlreadyCompleted => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "ALREADY_COMPLETED",
                    message: "Activity already marked as completed".into(),
                },
            ),
            AppError::StorageUnavailable(detail) => {
                tracing::error!("Storage error: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorBody {
                        code: "STORAGE_UNAVAILABLE",
                        message: "File storage is temporarily unavailable".into(),
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::StorageUnavailable(err.to_string())
    }
}
