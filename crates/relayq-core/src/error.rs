//! Unified error types for the API and server layers.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Application-level error for relayq.
///
/// Engine errors are mapped into this type at the crate boundary so that the
/// HTTP layer can translate them into status codes and response bodies.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or wrong API credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Backing store unreachable or failing
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Store(_) | Self::Timeout(_) => 503,
            Self::Configuration(_) | Self::Internal(_) | Self::Other(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Store(_) => "STORE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if the caller may retry the request later.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Serializable error body for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Request trace ID for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl ErrorResponse {
    /// Creates a new error response from a `RelayError`.
    #[must_use]
    pub fn from_error(error: &RelayError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            trace_id: None,
        }
    }

    /// Sets the trace ID.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

impl From<&RelayError> for ErrorResponse {
    fn from(error: &RelayError) -> Self {
        Self::from_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(RelayError::not_found("Job", "abc").status_code(), 404);
        assert_eq!(RelayError::validation("type is required").status_code(), 400);
        assert_eq!(RelayError::unauthorized("bad key").status_code(), 401);
        assert_eq!(RelayError::Store("down".to_string()).status_code(), 503);
        assert_eq!(RelayError::internal("oops").status_code(), 500);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(RelayError::not_found("Job", 1).error_code(), "NOT_FOUND");
        assert_eq!(RelayError::validation("x").error_code(), "VALIDATION_ERROR");
        assert_eq!(RelayError::Store("x".to_string()).error_code(), "STORE_ERROR");
        assert_eq!(RelayError::internal("x").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(RelayError::Store("connection refused".to_string()).is_retriable());
        assert!(RelayError::Timeout("slow".to_string()).is_retriable());
        assert!(!RelayError::validation("bad").is_retriable());
        assert!(!RelayError::not_found("Job", "1").is_retriable());
    }

    #[test]
    fn test_not_found_message() {
        let err = RelayError::not_found("Job", "123");
        let msg = err.to_string();
        assert!(msg.contains("Job") && msg.contains("123"));
    }

    #[test]
    fn test_error_response_from_error() {
        let err = RelayError::validation("payload too large");
        let body = ErrorResponse::from_error(&err).with_trace_id("req-1");
        assert_eq!(body.code, "VALIDATION_ERROR");
        assert!(body.message.contains("payload too large"));
        assert_eq!(body.trace_id.as_deref(), Some("req-1"));
    }
}
