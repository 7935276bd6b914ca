//! Liveness endpoint.

use axum::Json;
use axum_helpers::health::{liveness, HealthResponse};
use core_config::AppInfo;

/// Liveness probe; always healthy when the process answers.
pub async fn health(app_info: AppInfo) -> Json<HealthResponse> {
    liveness(app_info.name, app_info.version)
}
