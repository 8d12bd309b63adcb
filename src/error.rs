/// Unified error types for Lectern
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum LmsError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transient store failures (network, backend unavailable, injected faults)
    #[error("Store error: {0}")]
    Store(String),

    /// Referenced invoice, content unit, course or chapter does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A lesson or quiz without a resolvable parent course
    #[error("Owning course missing: {0}")]
    OwningEntityMissing(String),

    /// Invoice status change not defined by the state machine
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Conflict errors (e.g., duplicate invoice number)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LmsError {
    /// Short machine-readable code, also used as the metrics label
    pub fn code(&self) -> &'static str {
        match self {
            LmsError::Database(_) => "Database",
            LmsError::Store(_) => "StoreUnavailable",
            LmsError::NotFound(_) => "NotFound",
            LmsError::OwningEntityMissing(_) => "OwningEntityMissing",
            LmsError::InvalidTransition { .. } => "InvalidTransition",
            LmsError::Validation(_) => "InvalidRequest",
            LmsError::Authentication(_) => "AuthenticationRequired",
            LmsError::Authorization(_) => "Forbidden",
            LmsError::Conflict(_) => "Conflict",
            LmsError::Internal(_) => "InternalServerError",
            LmsError::Io(_) => "InternalServerError",
        }
    }

    /// True for failures of the backing store rather than of the request
    pub fn is_transient(&self) -> bool {
        matches!(self, LmsError::Database(_) | LmsError::Store(_))
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert LmsError to HTTP response
impl IntoResponse for LmsError {
    fn into_response(self) -> Response {
        let status = match &self {
            LmsError::NotFound(_) => StatusCode::NOT_FOUND,
            LmsError::OwningEntityMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LmsError::InvalidTransition { .. } => StatusCode::CONFLICT,
            LmsError::Validation(_) => StatusCode::BAD_REQUEST,
            LmsError::Authentication(_) => StatusCode::UNAUTHORIZED,
            LmsError::Authorization(_) => StatusCode::FORBIDDEN,
            LmsError::Conflict(_) => StatusCode::CONFLICT,
            LmsError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            LmsError::Database(_) | LmsError::Internal(_) | LmsError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            // Don't leak details
            LmsError::Database(_) | LmsError::Internal(_) | LmsError::Io(_) => {
                tracing::error!("Request failed: {}", self);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type LmsResult<T> = Result<T, LmsError>;
