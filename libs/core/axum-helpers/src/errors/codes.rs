//! Type-safe error codes for API responses.
//!
//! This module provides a single source of truth for error codes used across
//! the queue services. Each error code includes:
//! - String representation for client consumption (e.g., "QUEUE_NOT_FOUND")
//! - Integer code for logging and monitoring (e.g., 2002)
//! - Default human-readable message
//! - The HTTP status it maps to
//!
//! # Example
//!
//! ```rust
//! use axum_helpers::errors::ErrorCode;
//!
//! let code = ErrorCode::QueueNotFound;
//! assert_eq!(code.as_str(), "QUEUE_NOT_FOUND");
//! assert_eq!(code.http_status(), axum::http::StatusCode::NOT_FOUND);
//! ```

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standardized error codes for API responses.
///
/// This enum provides a type-safe way to represent error codes across the
/// services. It combines string identifiers (for clients), integer codes
/// (for monitoring), and default messages (for consistency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Client errors (1000-1999)
    /// Request validation failed
    ValidationError,

    /// Requested resource was not found
    NotFound,

    /// Request conflicts with current resource state
    Conflict,

    /// An unexpected internal server error occurred
    InternalError,

    // Backend errors (2000-2999)
    /// No backend registered under the requested name
    BackendNotFound,

    /// Queue does not exist on the backend
    QueueNotFound,

    /// Job id is unknown to the backend
    JobNotFound,

    /// Job was already acknowledged
    JobAlreadyAcked,

    /// Job is reserved by another consumer
    JobProcessing,

    /// Queue has no pending jobs (not an error for reservation callers)
    QueueEmpty,

    /// Job payload failed to decode
    InvalidJobData,

    /// Backend does not support the requested operation
    OperationNotSupported,

    /// Consumer group already exists
    ConsumerGroupExists,

    /// Stream key is missing
    StreamNotFound,

    // Infrastructure errors (3000-3999)
    /// Connection to the data store failed
    ConnectionFailed,

    /// Operation timed out
    Timeout,

    // Admission errors (4000-4999)
    /// Circuit breaker is open for this job class
    CircuitBreakerOpen,

    /// Token bucket exhausted for this queue
    RateLimited,

    // Configuration errors (5000-5999)
    /// Configuration failed validation
    InvalidConfiguration,

    // Migration errors (6000-6999)
    /// A migration is already active for this queue
    MigrationInProgress,

    /// Migration aborted
    MigrationFailed,
}

impl ErrorCode {
    /// Get the string representation for client consumption.
    ///
    /// This returns a SCREAMING_SNAKE_CASE identifier that clients can use
    /// to programmatically handle specific error types.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::InternalError => "INTERNAL_ERROR",
            Self::BackendNotFound => "BACKEND_NOT_FOUND",
            Self::QueueNotFound => "QUEUE_NOT_FOUND",
            Self::JobNotFound => "JOB_NOT_FOUND",
            Self::JobAlreadyAcked => "JOB_ALREADY_ACKED",
            Self::JobProcessing => "JOB_PROCESSING",
            Self::QueueEmpty => "QUEUE_EMPTY",
            Self::InvalidJobData => "INVALID_JOB_DATA",
            Self::OperationNotSupported => "OPERATION_NOT_SUPPORTED",
            Self::ConsumerGroupExists => "CONSUMER_GROUP_EXISTS",
            Self::StreamNotFound => "STREAM_NOT_FOUND",
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            Self::RateLimited => "RATE_LIMITED",
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
            Self::MigrationInProgress => "MIGRATION_IN_PROGRESS",
            Self::MigrationFailed => "MIGRATION_FAILED",
        }
    }

    /// Get the integer code for logging and monitoring.
    ///
    /// Ranges:
    /// - 1000-1999: client errors
    /// - 2000-2999: backend errors
    /// - 3000-3999: infrastructure errors
    /// - 4000-4999: admission control
    /// - 5000-5999: configuration
    /// - 6000-6999: migration
    pub fn code(&self) -> i32 {
        match self {
            Self::ValidationError => 1001,
            Self::NotFound => 1002,
            Self::Conflict => 1003,
            Self::InternalError => 1004,

            Self::BackendNotFound => 2001,
            Self::QueueNotFound => 2002,
            Self::JobNotFound => 2003,
            Self::JobAlreadyAcked => 2004,
            Self::JobProcessing => 2005,
            Self::QueueEmpty => 2006,
            Self::InvalidJobData => 2007,
            Self::OperationNotSupported => 2008,
            Self::ConsumerGroupExists => 2009,
            Self::StreamNotFound => 2010,

            Self::ConnectionFailed => 3001,
            Self::Timeout => 3002,

            Self::CircuitBreakerOpen => 4001,
            Self::RateLimited => 4002,

            Self::InvalidConfiguration => 5001,

            Self::MigrationInProgress => 6001,
            Self::MigrationFailed => 6002,
        }
    }

    /// Get the default user-facing error message.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::ValidationError => "Request validation failed",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Request conflicts with current resource state",
            Self::InternalError => "An internal server error occurred",
            Self::BackendNotFound => "Backend is not registered",
            Self::QueueNotFound => "Queue does not exist",
            Self::JobNotFound => "Job does not exist",
            Self::JobAlreadyAcked => "Job was already acknowledged",
            Self::JobProcessing => "Job is currently reserved",
            Self::QueueEmpty => "Queue has no pending jobs",
            Self::InvalidJobData => "Job payload could not be decoded",
            Self::OperationNotSupported => "Backend does not support this operation",
            Self::ConsumerGroupExists => "Consumer group already exists",
            Self::StreamNotFound => "Stream does not exist",
            Self::ConnectionFailed => "Connection to the data store failed",
            Self::Timeout => "Operation timed out",
            Self::CircuitBreakerOpen => "Circuit breaker is open",
            Self::RateLimited => "Rate limit exceeded",
            Self::InvalidConfiguration => "Configuration failed validation",
            Self::MigrationInProgress => "A migration is already active for this queue",
            Self::MigrationFailed => "Migration failed",
        }
    }

    /// HTTP status code this error maps to.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::ValidationError | Self::InvalidJobData | Self::InvalidConfiguration => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound
            | Self::BackendNotFound
            | Self::QueueNotFound
            | Self::JobNotFound
            | Self::StreamNotFound => StatusCode::NOT_FOUND,
            Self::Conflict
            | Self::JobAlreadyAcked
            | Self::JobProcessing
            | Self::ConsumerGroupExists
            | Self::MigrationInProgress => StatusCode::CONFLICT,
            Self::QueueEmpty => StatusCode::NO_CONTENT,
            Self::OperationNotSupported => StatusCode::NOT_IMPLEMENTED,
            Self::ConnectionFailed | Self::MigrationFailed | Self::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::CircuitBreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Whether automatic retry with backoff is appropriate.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailed | Self::RateLimited
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
