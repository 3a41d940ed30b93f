//! Error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::query::{CastError, QueryError};
use crate::store::{StoreError, StoreErrorKind};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the service
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Structured document store error
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A request value could not be cast to the field's type
    #[error("{0}")]
    Cast(#[from] CastError),

    /// The list query could not be compiled
    #[error("{0}")]
    Query(#[from] QueryError),

    /// Request body failed validation (422)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Optional error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            status: status.as_u16(),
        }
    }

    /// Create error response with a code
    pub fn with_code(
        status: StatusCode,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            status: status.as_u16(),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error {
    /// HTTP status this error renders with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Store(e) => match e.kind {
                StoreErrorKind::ConnectionFailed => StatusCode::SERVICE_UNAVAILABLE,
                StoreErrorKind::InvalidQuery => StatusCode::BAD_REQUEST,
                StoreErrorKind::DuplicateKey => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Cast(_) | Error::Query(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = match self {
            Error::Config(e) => {
                tracing::error!("Configuration error: {}", e);
                ErrorResponse::with_code(status, "CONFIG_ERROR", "Service misconfigured")
            }

            Error::Store(ref e) => {
                tracing::error!(
                    operation = %e.operation,
                    kind = %e.kind,
                    collection = ?e.collection,
                    retriable = e.is_retriable(),
                    "Store error: {}", e.message
                );

                let code = format!("DATABASE_{}", e.kind.to_string().to_uppercase());
                let user_message = match e.kind {
                    StoreErrorKind::ConnectionFailed => "Database unavailable".to_string(),
                    StoreErrorKind::InvalidQuery => format!("Invalid query: {}", e.message),
                    StoreErrorKind::DuplicateKey => "Duplicate value for a unique field".to_string(),
                    _ => "Database operation failed".to_string(),
                };
                ErrorResponse::with_code(status, code, user_message)
            }

            Error::Cast(e) => {
                tracing::debug!(path = %e.path, value = %e.value, kind = %e.kind, "Cast error");
                ErrorResponse::with_code(status, "CAST_ERROR", e.to_string())
            }

            Error::Query(e) => ErrorResponse::with_code(status, "INVALID_QUERY", e.to_string()),

            Error::Validation(msg) => ErrorResponse::with_code(status, "VALIDATION_ERROR", msg),

            Error::NotFound(msg) => ErrorResponse::with_code(status, "NOT_FOUND", msg),

            Error::Conflict(msg) => ErrorResponse::with_code(status, "CONFLICT", msg),

            Error::BadRequest(msg) => ErrorResponse::with_code(status, "BAD_REQUEST", msg),

            Error::Io(e) => {
                tracing::error!("I/O error: {}", e);
                ErrorResponse::with_code(status, "IO_ERROR", "I/O operation failed")
            }

            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ErrorResponse::with_code(status, "INTERNAL_ERROR", "Internal server error")
            }
        };

        (status, Json(error_response)).into_response()
    }
}

// Manual From implementations for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FieldKind;
    use crate::store::StoreOperation;

    #[test]
    fn test_store_error_status_mapping() {
        let unavailable: Error = StoreError::connection_failed("refused").into();
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let invalid: Error = StoreError::invalid_query(StoreOperation::Find, "bad").into();
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let other: Error = StoreError::database_error(StoreOperation::Insert, "boom").into();
        assert_eq!(other.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_cast_error_is_bad_request() {
        let error: Error = CastError::new("_id", "abc", FieldKind::ObjectId).into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_client_error_statuses() {
        assert_eq!(
            Error::Validation("name is required".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(Error::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_response_skips_missing_code() {
        let body = ErrorResponse::new(StatusCode::NOT_FOUND, "gone");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "gone", "status": 404 }));
    }
}
