//! Reusable OpenAPI response types for consistent API documentation.

use super::ErrorResponse;
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToResponse;

#[derive(ToResponse)]
#[response(
    description = "Internal Server Error",
    content_type = "application/json",
    example = json!({
        "error": "An internal server error occurred",
        "code": "INTERNAL_ERROR",
        "status": 500,
        "timestamp": "2025-06-01T12:00:00Z"
    })
)]
pub struct InternalServerErrorResponse(pub ErrorResponse);

#[derive(ToResponse)]
#[response(
    description = "Bad Request - Validation Error",
    content_type = "application/json",
    example = json!({
        "error": "Request validation failed",
        "code": "VALIDATION_ERROR",
        "status": 400,
        "timestamp": "2025-06-01T12:00:00Z",
        "details": {
            "max_retries": [{
                "code": "range",
                "message": "must be at least 0",
                "params": {"value": -1}
            }]
        }
    })
)]
pub struct BadRequestValidationResponse(pub ErrorResponse);

#[derive(ToResponse)]
#[response(
    description = "Resource not found",
    content_type = "application/json",
    example = json!({
        "error": "Resource not found",
        "code": "NOT_FOUND",
        "status": 404,
        "timestamp": "2025-06-01T12:00:00Z"
    })
)]
pub struct NotFoundResponse(pub ErrorResponse);

#[derive(ToResponse)]
#[response(
    description = "Conflict - state machine refused the transition",
    content_type = "application/json",
    example = json!({
        "error": "Request conflicts with current resource state",
        "code": "CONFLICT",
        "status": 409,
        "timestamp": "2025-06-01T12:00:00Z"
    })
)]
pub struct ConflictResponse(pub ErrorResponse);
