//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::approval::ApprovalError;
use crate::booking::BookingError;
use crate::chat::ChatError;
use crate::core_state::CoreError;
use crate::identity::IdentityError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
///
/// Conflict and NotFound stay distinct on the wire; clients show
/// "already taken" and "no such slot" differently.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    AuthRequired,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Staff role required")]
    Forbidden,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::AuthRequired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
            ),
            ApiError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid or expired token".to_string(),
            ),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid email or password".to_string(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Staff role required".to_string(),
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail.clone()),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<crate::db::DatabaseError> for ApiError {
    fn from(err: crate::db::DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::AlreadyBooked => {
                ApiError::Conflict("You already have an active booking".into())
            }
            BookingError::SlotUnavailable => {
                ApiError::Conflict("This slot is taken or does not exist".into())
            }
            BookingError::SlotReserved => {
                ApiError::Conflict("A reserved slot cannot be deleted".into())
            }
            BookingError::NotFound => ApiError::NotFound("Slot not found".into()),
            BookingError::Unauthorized => ApiError::Forbidden,
            BookingError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ApprovalError> for ApiError {
    fn from(err: ApprovalError) -> Self {
        match err {
            ApprovalError::NotFound => ApiError::NotFound("Slot not found".into()),
            ApprovalError::NotBooked => {
                ApiError::Conflict("This slot is already confirmed or was never booked".into())
            }
            ApprovalError::Unauthorized => ApiError::Forbidden,
            ApprovalError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyContent => ApiError::BadRequest("Message cannot be empty".into()),
            ChatError::Unauthorized => ApiError::Forbidden,
            ChatError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidToken => ApiError::InvalidToken,
            IdentityError::InvalidCredentials => ApiError::InvalidCredentials,
            IdentityError::EmailTaken => ApiError::Conflict("Email already registered".into()),
            IdentityError::Validation(detail) => ApiError::BadRequest(detail),
            IdentityError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}
