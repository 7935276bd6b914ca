pub mod codes;
pub mod responses;

pub use codes::ErrorCode;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Standard error response structure.
///
/// This structure is returned for all error responses, providing consistent
/// error information to clients:
/// - `error`: Human-readable error message
/// - `code`: Machine-readable error identifier (e.g., "QUEUE_NOT_FOUND")
/// - `status`: HTTP status code
/// - `timestamp`: When the error was produced
/// - `details`: Optional structured details (e.g., validation field errors)
/// - `request_id`: Correlation id when the caller supplied one
///
/// # JSON Example
///
/// ```json
/// {
///   "error": "Queue does not exist",
///   "code": "QUEUE_NOT_FOUND",
///   "status": 404,
///   "timestamp": "2025-06-01T12:00:00Z"
/// }
/// ```
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
    /// Machine-readable error identifier for programmatic handling
    pub code: ErrorCode,
    /// HTTP status code
    pub status: u16,
    /// When the error was produced
    pub timestamp: DateTime<Utc>,
    /// Optional structured error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Correlation id, echoed from the request when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Application error type that converts into the standard JSON envelope.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            request_id: None,
        }
    }

    /// Build from a code alone, using its default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();

        // 5xx messages may carry internals; log them and keep the body generic
        let message = if status.is_server_error() {
            tracing::error!(code = %self.code, error = %self.message, "request failed");
            self.code.default_message().to_string()
        } else {
            self.message
        };

        let body = ErrorResponse {
            error: message,
            code: self.code,
            status: status.as_u16(),
            timestamp: Utc::now(),
            details: self.details,
            request_id: self.request_id,
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let messages: Vec<serde_json::Value> = errs
                    .iter()
                    .map(|err| {
                        serde_json::json!({
                            "code": err.code,
                            "message": err.message,
                            "params": err.params,
                        })
                    })
                    .collect();
                (field.to_string(), serde_json::json!(messages))
            })
            .collect::<serde_json::Map<_, _>>();

        Self::from_code(ErrorCode::ValidationError)
            .with_details(serde_json::Value::Object(details))
    }
}

/// Convenience alias used by handler signatures.
pub type ApiResult<T> = Result<T, ApiError>;

/// Fallback handler producing the standard envelope for unknown routes.
pub async fn not_found_handler() -> Response {
    ApiError::from_code(ErrorCode::NotFound).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::new(ErrorCode::QueueNotFound, "queue 'emails' does not exist");
        assert_eq!(
            err.to_string(),
            "QUEUE_NOT_FOUND: queue 'emails' does not exist"
        );
    }

    #[test]
    fn test_from_code_uses_default_message() {
        let err = ApiError::from_code(ErrorCode::MigrationInProgress);
        assert_eq!(err.message, "A migration is already active for this queue");
    }

    #[tokio::test]
    async fn test_into_response_sets_status() {
        let response = ApiError::from_code(ErrorCode::RateLimited).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_server_error_message_is_masked() {
        let response =
            ApiError::new(ErrorCode::InternalError, "secret connection string").into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "An internal server error occurred");
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["status"], 500);
        assert!(body["timestamp"].is_string());
    }
}
