//! Health and readiness endpoint helpers.
//!
//! Services compose their `/health` and `/ready` routes from these pieces so
//! Kubernetes probes get a uniform shape across the fleet.

use axum::{http::StatusCode, Json};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Liveness response body.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always "healthy" if the process can answer at all
    pub status: &'static str,
    pub name: String,
    pub version: String,
}

/// Build a liveness response for the given app identity.
pub fn liveness(name: impl Into<String>, version: impl Into<String>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: name.into(),
        version: version.into(),
    })
}

/// A boxed future for readiness checks with a string error
pub type HealthCheckFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

/// Runs multiple readiness checks concurrently and returns aggregated results.
///
/// Returns 200 with per-service status when everything is up, 503 otherwise.
///
/// # Example
/// ```ignore
/// let checks: Vec<(&str, HealthCheckFuture)> = vec![
///     ("redis", Box::pin(async { ping_redis(conn).await.map_err(|e| e.to_string()) })),
///     ("postgres", Box::pin(async { ping_db(db).await.map_err(|e| e.to_string()) })),
/// ];
/// run_health_checks(checks).await
/// ```
pub async fn run_health_checks(
    checks: Vec<(&str, HealthCheckFuture<'_>)>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let names: Vec<_> = checks.iter().map(|(name, _)| *name).collect();
    let futures: Vec<_> = checks.into_iter().map(|(_, check)| check).collect();
    let results = join_all(futures).await;

    let mut status_map = HashMap::new();
    let mut failures = Vec::new();

    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(()) => {
                status_map.insert(name.to_string(), json!({"up": true}));
            }
            Err(reason) => {
                status_map.insert(name.to_string(), json!({"up": false, "reason": reason}));
                failures.push(name.to_string());
            }
        }
    }

    let body = json!({
        "ready": failures.is_empty(),
        "services": status_map,
    });

    if failures.is_empty() {
        Ok((StatusCode::OK, Json(body)))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(body)))
    }
}
