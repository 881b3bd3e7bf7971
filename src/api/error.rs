use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::error;

use crate::intake::IntakeError;
use crate::users::UsernameError;

/// JSON error body `{ "error": ..., "code": ... }` with a status
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_failed", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn user_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "user_not_found", "User not found")
    }

    /// Log the detail, answer with the generic message only
    pub fn internal(context: &str, detail: impl std::fmt::Display, message: &str) -> Self {
        error!(error = %detail, "{} failed", context);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
            "code": self.code,
        });
        (self.status, Json(body)).into_response()
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = self.to_string();

        match self {
            IntakeError::Validation(_) => ApiError::bad_request(message).into_response(),
            IntakeError::UserNotFound => ApiError::user_not_found().into_response(),
            IntakeError::Duplicate {
                existing_contribution_id,
            } => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": message,
                    "code": code,
                    "existing_contribution_id": existing_contribution_id,
                })),
            )
                .into_response(),
            IntakeError::RateLimited { retry_after } => {
                let wait_secs = (retry_after - Utc::now()).num_seconds().max(0);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": message,
                        "code": code,
                        "retry_after": retry_after,
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert("Retry-After", HeaderValue::from(wait_secs));
                response
            }
            // Detail was logged where the failure happened
            IntakeError::Internal(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, code, message).into_response()
            }
        }
    }
}

impl From<UsernameError> for ApiError {
    fn from(err: UsernameError) -> Self {
        match err {
            UsernameError::TooShort | UsernameError::TooLong | UsernameError::InvalidCharacters => {
                ApiError::bad_request(err.to_string())
            }
            UsernameError::Taken => {
                ApiError::new(StatusCode::CONFLICT, "username_taken", err.to_string())
            }
            UsernameError::UnknownUser => ApiError::user_not_found(),
            UsernameError::Store(detail) => {
                ApiError::internal("Set username", detail, "Failed to set username")
            }
        }
    }
}
