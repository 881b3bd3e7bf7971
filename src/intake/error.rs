use chrono::{DateTime, Utc};
use thiserror::Error;

/// Terminal outcomes of a submission other than acceptance
///
/// `Internal` keeps the underlying detail for logs only; its `Display` is
/// the generic message callers see.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("{0}")]
    Validation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("This data has already been submitted. You cannot earn points for the same data twice.")]
    Duplicate {
        existing_contribution_id: Option<String>,
    },

    #[error("You have already submitted similar data in the last 24 hours. Please wait before submitting again.")]
    RateLimited { retry_after: DateTime<Utc> },

    #[error("Failed to submit contribution")]
    Internal(String),
}

impl IntakeError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            IntakeError::Validation(_) => "validation_failed",
            IntakeError::UserNotFound => "user_not_found",
            IntakeError::Duplicate { .. } => "duplicate_submission",
            IntakeError::RateLimited { .. } => "rate_limited",
            IntakeError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_detail_is_not_displayed() {
        let err = IntakeError::Internal("connection refused on 10.0.0.5:5432".to_string());
        assert_eq!(err.to_string(), "Failed to submit contribution");
        assert_eq!(err.code(), "internal_error");
    }
}
