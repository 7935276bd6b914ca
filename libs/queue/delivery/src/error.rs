//! Error types for the delivery layer.

use thiserror::Error;
use uuid::Uuid;

pub type DeliveryResult<T> = Result<T, DeliveryError>;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("outbox row '{0}' not found")]
    RowNotFound(Uuid),

    #[error("dedup store error: {0}")]
    Dedup(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("backend error: {0}")]
    Backend(#[from] queue_backend::BackendError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeliveryError {
    /// Stable machine-readable code for logs and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RowNotFound(_) => "JOB_NOT_FOUND",
            Self::Dedup(_) => "CONNECTION_FAILED",
            Self::Database(_) => "CONNECTION_FAILED",
            Self::Redis(_) => "CONNECTION_FAILED",
            Self::Backend(e) => e.code(),
            Self::Serialization(_) => "INVALID_JOB_DATA",
        }
    }

    /// Relay-side classification: everything except bad data retries forever
    /// with capped backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Serialization(_) => false,
            Self::RowNotFound(_) => false,
            Self::Backend(e) => e.is_retryable(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(DeliveryError::RowNotFound(Uuid::nil()).code(), "JOB_NOT_FOUND");
        assert_eq!(DeliveryError::Dedup("down".into()).code(), "CONNECTION_FAILED");
    }

    #[test]
    fn test_retryable() {
        assert!(DeliveryError::Dedup("down".into()).is_retryable());
        assert!(!DeliveryError::RowNotFound(Uuid::nil()).is_retryable());
    }
}
