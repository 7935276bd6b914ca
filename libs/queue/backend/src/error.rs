//! Error types for backend operations.
//!
//! Every variant carries a stable machine-readable code (`code()`); callers
//! branch on `is_retryable()` rather than matching provider internals.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur during backend operations.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Not an error for reservation callers; reserve returns empty instead.
    #[error("queue '{0}' has no pending jobs")]
    QueueEmpty(String),

    #[error("queue '{0}' does not exist")]
    QueueNotFound(String),

    #[error("job '{0}' not found")]
    JobNotFound(Uuid),

    #[error("job '{0}' was already acknowledged")]
    JobAlreadyAcked(Uuid),

    #[error("job '{0}' is reserved by another consumer")]
    JobProcessing(Uuid),

    #[error("backend '{0}' is not registered")]
    BackendNotFound(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("{backend} does not support {operation}")]
    OperationNotSupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("invalid job data: {0}")]
    InvalidJobData(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("consumer group '{0}' already exists")]
    ConsumerGroupExists(String),

    #[error("stream '{0}' does not exist")]
    StreamNotFound(String),

    /// Redis connection or command error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    /// Stable machine-readable code for logs and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::QueueEmpty(_) => "QUEUE_EMPTY",
            Self::QueueNotFound(_) => "QUEUE_NOT_FOUND",
            Self::JobNotFound(_) => "JOB_NOT_FOUND",
            Self::JobAlreadyAcked(_) => "JOB_ALREADY_ACKED",
            Self::JobProcessing(_) => "JOB_PROCESSING",
            Self::BackendNotFound(_) => "BACKEND_NOT_FOUND",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::OperationNotSupported { .. } => "OPERATION_NOT_SUPPORTED",
            Self::InvalidJobData(_) => "INVALID_JOB_DATA",
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::ConsumerGroupExists(_) => "CONSUMER_GROUP_EXISTS",
            Self::StreamNotFound(_) => "STREAM_NOT_FOUND",
            Self::Redis(e) => {
                if redis_error_is_timeout(e) {
                    "TIMEOUT"
                } else if redis_error_is_connection(e) {
                    "CONNECTION_FAILED"
                } else {
                    "CONNECTION_FAILED"
                }
            }
            Self::Serialization(_) => "INVALID_JOB_DATA",
        }
    }

    /// Whether automatic retry with backoff is appropriate.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) | Self::Timeout(_) => true,
            Self::Redis(_) => true,
            Self::QueueEmpty(_) => true,
            _ => false,
        }
    }

    /// Check if this is a connection-level failure that might recover.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) => true,
            Self::Redis(e) => redis_error_is_connection(e),
            _ => false,
        }
    }

    /// Check if this is a blocking-read timeout (normal, not an error).
    ///
    /// When a blocking read hits its window without messages, the driver
    /// reports a timeout. Reservation paths treat it as an empty result.
    pub fn is_block_timeout(&self) -> bool {
        match self {
            Self::Redis(e) => redis_error_is_timeout(e) && !redis_error_is_connection(e),
            Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Check if this is a consumer group missing error (NOGROUP).
    pub fn is_nogroup_error(&self) -> bool {
        match self {
            Self::Redis(e) => e.to_string().contains("NOGROUP"),
            Self::StreamNotFound(_) => true,
            _ => false,
        }
    }
}

fn redis_error_is_connection(e: &redis::RedisError) -> bool {
    let err_str = e.to_string().to_lowercase();
    err_str.contains("connection")
        || err_str.contains("disconnected")
        || err_str.contains("broken pipe")
        || err_str.contains("reset by peer")
        || err_str.contains("refused")
        || err_str.contains("eof")
        || err_str.contains("io error")
}

fn redis_error_is_timeout(e: &redis::RedisError) -> bool {
    let err_str = e.to_string().to_lowercase();
    err_str.contains("timeout") || err_str.contains("timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(BackendError::QueueEmpty("q".into()).code(), "QUEUE_EMPTY");
        assert_eq!(
            BackendError::JobNotFound(Uuid::nil()).code(),
            "JOB_NOT_FOUND"
        );
        assert_eq!(
            BackendError::OperationNotSupported {
                backend: "list",
                operation: "replay",
            }
            .code(),
            "OPERATION_NOT_SUPPORTED"
        );
        assert_eq!(
            BackendError::InvalidConfiguration("x".into()).code(),
            "INVALID_CONFIGURATION"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::Timeout("read".into()).is_retryable());
        assert!(BackendError::ConnectionFailed("down".into()).is_retryable());
        assert!(!BackendError::JobAlreadyAcked(Uuid::nil()).is_retryable());
        assert!(!BackendError::InvalidJobData("bad".into()).is_retryable());
        assert!(
            !BackendError::OperationNotSupported {
                backend: "list",
                operation: "consumer groups",
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = BackendError::OperationNotSupported {
            backend: "list",
            operation: "replay",
        };
        assert_eq!(err.to_string(), "list does not support replay");
    }
}
