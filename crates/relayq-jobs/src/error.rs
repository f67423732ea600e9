//! Job engine error types.

use relayq_core::RelayError;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job engine errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rejected input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Handler registration or lookup failure.
    #[error("Handler error: {0}")]
    Handler(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JobError> for RelayError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Redis(e) => RelayError::Store(e.to_string()),
            JobError::Pool(e) => RelayError::Store(e.to_string()),
            JobError::Validation(msg) => RelayError::Validation(msg),
            JobError::Configuration(msg) => RelayError::Configuration(msg),
            JobError::Serialization(e) => RelayError::Internal(format!("JSON serialization error: {}", e)),
            JobError::Handler(msg) | JobError::Internal(msg) => RelayError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_relay_error_store() {
        let err = JobError::Redis(redis::RedisError::from((redis::ErrorKind::IoError, "refused")));
        let relay: RelayError = err.into();
        assert_eq!(relay.status_code(), 503);
        assert_eq!(relay.error_code(), "STORE_ERROR");
    }

    #[test]
    fn test_into_relay_error_validation() {
        let relay: RelayError = JobError::Validation("job type is required".into()).into();
        assert_eq!(relay.status_code(), 400);
    }

    #[test]
    fn test_into_relay_error_serialization_is_internal() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let relay: RelayError = JobError::Serialization(err).into();
        assert_eq!(relay.status_code(), 500);
    }
}
