//! Worker admin endpoints.
//!
//! - Liveness: `/health`, `/healthz`
//! - Readiness: `/ready` (verifies the store answers)
//! - Queue stats: `/queues`
//! - Prometheus metrics: `/metrics`
//! - DLQ admin: `/admin/dlq/{queue}` (stats), `/admin/dlq/{queue}/jobs`
//!   (list), `/admin/dlq/{queue}/requeue` (one or all), and
//!   `/admin/dlq/{queue}/purge`

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_helpers::errors::{ApiError, ApiResult, ErrorCode};
use axum_helpers::health::{liveness, run_health_checks, HealthCheckFuture, HealthResponse};
use queue_backend::{dlq_name, QueueBackend};
use queue_worker::{DlqManager, DlqStats, WorkerError};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Shared state of the worker admin surface.
#[derive(Clone)]
pub struct AdminState {
    pub backend: Arc<dyn QueueBackend>,
    pub dlq: Arc<DlqManager>,
    pub redis: ConnectionManager,
    pub app_name: &'static str,
    pub app_version: &'static str,
}

/// Build the admin router.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready))
        .route("/queues", get(queue_stats))
        .route("/metrics", get(observability::metrics_handler))
        .route("/admin/dlq/{queue}", get(dlq_stats))
        .route("/admin/dlq/{queue}/jobs", get(dlq_jobs))
        .route("/admin/dlq/{queue}/requeue", post(dlq_requeue))
        .route("/admin/dlq/{queue}/purge", post(dlq_purge))
        .with_state(state)
}

fn worker_error(e: WorkerError) -> ApiError {
    let code = match e.code() {
        "QUEUE_NOT_FOUND" => ErrorCode::QueueNotFound,
        "JOB_NOT_FOUND" => ErrorCode::JobNotFound,
        "CONNECTION_FAILED" => ErrorCode::ConnectionFailed,
        "TIMEOUT" => ErrorCode::Timeout,
        _ => ErrorCode::InternalError,
    };
    ApiError::new(code, e.to_string())
}

async fn health(State(state): State<AdminState>) -> Json<HealthResponse> {
    liveness(state.app_name, state.app_version)
}

async fn ready(
    State(state): State<AdminState>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let mut conn = state.redis.clone();
    let checks: Vec<(&str, HealthCheckFuture)> = vec![(
        "redis",
        Box::pin(async move {
            redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        }),
    )];
    run_health_checks(checks).await
}

/// Depth report of one queue.
#[derive(Serialize)]
struct QueueDepth {
    queue: String,
    pending: usize,
    dead_lettered: usize,
}

async fn queue_stats(State(state): State<AdminState>) -> ApiResult<Json<Vec<QueueDepth>>> {
    let mut report = Vec::new();
    let queues = state
        .backend
        .queues()
        .await
        .map_err(|e| worker_error(e.into()))?;

    for queue in queues {
        if queue.ends_with(queue_backend::DLQ_SUFFIX) {
            continue;
        }
        let pending = state
            .backend
            .len(&queue)
            .await
            .map_err(|e| worker_error(e.into()))?;
        let dead_lettered = state
            .backend
            .len(&dlq_name(&queue))
            .await
            .map_err(|e| worker_error(e.into()))?;

        observability::queue::set_depth(&queue, pending as f64);
        observability::queue::set_dlq_size(&queue, dead_lettered as f64);
        report.push(QueueDepth {
            queue,
            pending,
            dead_lettered,
        });
    }

    Ok(Json(report))
}

async fn dlq_stats(
    State(state): State<AdminState>,
    Path(queue): Path<String>,
) -> ApiResult<Json<DlqStats>> {
    let stats = state.dlq.stats(&queue).await.map_err(worker_error)?;
    Ok(Json(stats))
}

#[derive(Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn dlq_jobs(
    State(state): State<AdminState>,
    Path(queue): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<queue_backend::Job>>> {
    let jobs = state
        .dlq
        .list(&queue, params.limit.unwrap_or(50))
        .await
        .map_err(worker_error)?;
    Ok(Json(jobs))
}

#[derive(Deserialize)]
struct RequeueParams {
    /// Requeue only this job; otherwise up to `limit` entries
    job_id: Option<Uuid>,
    limit: Option<usize>,
}

async fn dlq_requeue(
    State(state): State<AdminState>,
    Path(queue): Path<String>,
    Query(params): Query<RequeueParams>,
) -> ApiResult<Json<Value>> {
    match params.job_id {
        Some(job_id) => {
            let found = state
                .dlq
                .requeue_job(&queue, job_id)
                .await
                .map_err(worker_error)?;
            if !found {
                return Err(ApiError::new(
                    ErrorCode::JobNotFound,
                    format!("job '{}' is not in the DLQ of '{}'", job_id, queue),
                ));
            }
            Ok(Json(serde_json::json!({ "requeued": 1 })))
        }
        None => {
            let count = state
                .dlq
                .requeue(&queue, params.limit.unwrap_or(100))
                .await
                .map_err(worker_error)?;
            Ok(Json(serde_json::json!({ "requeued": count })))
        }
    }
}

async fn dlq_purge(
    State(state): State<AdminState>,
    Path(queue): Path<String>,
) -> ApiResult<Json<Value>> {
    let count = state.dlq.purge(&queue).await.map_err(worker_error)?;
    Ok(Json(serde_json::json!({ "purged": count })))
}
