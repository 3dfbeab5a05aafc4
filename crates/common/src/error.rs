//! Error types for the enrollment engine.

use std::borrow::Cow;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A guarded edit or a workflow transition is not allowed in the current status.
    #[error("Cannot {action} while participant status is {status}")]
    InvalidState {
        /// The attempted action, e.g. "submit" or "edit identity".
        action: Cow<'static, str>,
        /// The status the participant was in when the action was attempted.
        status: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build an optimistic-concurrency conflict for an entity.
    #[must_use]
    pub fn stale_version(entity: &str, id: &str) -> Self {
        Self::Conflict(format!(
            "{entity} {id} was modified by another request; re-fetch and retry"
        ))
    }

    /// Build an invalid-state error for a disallowed action.
    pub fn invalid_state(action: impl Into<Cow<'static, str>>, status: impl ToString) -> Self {
        Self::InvalidState {
            action: action.into(),
            status: status.to_string(),
        }
    }

    /// Build a validation error scoped to a single field.
    #[must_use]
    pub fn field(field: &'static str, code: &'static str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, field_error(code, message));
        Self::Validation(errors)
    }

    /// Wrap a database error with the operation that produced it.
    pub fn db<E: std::fmt::Display>(operation: &'static str) -> impl FnOnce(E) -> Self {
        move |e| Self::Database(format!("{operation}: {e}"))
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidState { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 5xx Server Errors
            Self::Database(_) | Self::Storage(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unprocessable(_) => "UNPROCESSABLE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

/// Build a single [`ValidationError`] with a human-readable message.
#[must_use]
pub fn field_error(code: &'static str, message: impl Into<String>) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Owned(message.into()));
    error
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = match &self {
            Self::Validation(errors) => json!({
                "error": {
                    "code": code,
                    "message": "Validation failed",
                    "fields": errors.field_errors(),
                }
            }),
            _ => json!({
                "error": {
                    "code": code,
                    "message": self.to_string(),
                }
            }),
        };

        (status, Json(body)).into_response()
    }
}

// === From implementations ===

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        Self::Validation(err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
