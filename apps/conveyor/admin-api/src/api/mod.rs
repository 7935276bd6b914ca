//! Router assembly and OpenAPI documentation.

pub mod changes;
pub mod health;
pub mod presets;
pub mod simulations;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use axum_helpers::errors::{ApiError, ErrorCode};
use core_config::AppInfo;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI documentation for the admin surface
#[derive(OpenApi)]
#[openapi(
    paths(
        simulations::create_simulation,
        simulations::list_simulations,
        simulations::get_simulation,
        simulations::get_simulation_charts,
        changes::create_change,
        changes::get_change,
        changes::list_changes,
        changes::approve_change,
        changes::apply_change,
        changes::rollback_change,
        presets::list_policy_presets,
        presets::list_traffic_presets,
    ),
    components(
        schemas(
            simulations::CreateSimulationRequest,
            simulations::ChartSeries,
            changes::CreateChangeRequest,
            axum_helpers::ErrorResponse,
        ),
        responses(
            axum_helpers::errors::responses::NotFoundResponse,
            axum_helpers::errors::responses::BadRequestValidationResponse,
            axum_helpers::errors::responses::ConflictResponse,
            axum_helpers::errors::responses::InternalServerErrorResponse,
        )
    ),
    tags(
        (name = "simulations", description = "Queueing-model simulations"),
        (name = "changes", description = "Staged policy rollout"),
        (name = "presets", description = "Named policy and traffic presets")
    )
)]
pub struct ApiDoc;

/// Build the full admin router.
pub fn router(state: AppState, app_info: AppInfo) -> Router {
    Router::new()
        .route("/simulations", post(simulations::create_simulation).get(simulations::list_simulations))
        .route("/simulations/{id}", get(simulations::get_simulation))
        .route("/simulations/{id}/charts", get(simulations::get_simulation_charts))
        .route("/changes", post(changes::create_change).get(changes::list_changes))
        .route("/changes/{id}", get(changes::get_change))
        .route("/changes/{id}/approve", post(changes::approve_change))
        .route("/changes/{id}/apply", post(changes::apply_change))
        .route("/changes/{id}/rollback", post(changes::rollback_change))
        .route("/presets/policies", get(presets::list_policy_presets))
        .route("/presets/traffic", get(presets::list_traffic_presets))
        .with_state(state)
        .route("/health", get(move || async move { health::health(app_info).await }))
        .route("/metrics", get(observability::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(axum_helpers::errors::not_found_handler)
        .layer(axum::middleware::from_fn(observability::metrics_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Map policy-layer errors onto the standard JSON envelope.
pub fn policy_error(e: policy_sim::PolicyError) -> ApiError {
    let code = match e.code() {
        "INVALID_CONFIGURATION" => ErrorCode::InvalidConfiguration,
        "QUEUE_NOT_FOUND" => ErrorCode::QueueNotFound,
        "JOB_NOT_FOUND" => ErrorCode::NotFound,
        _ => ErrorCode::InternalError,
    };
    // State-machine refusals surface as conflicts
    if matches!(e, policy_sim::PolicyError::InvalidTransition { .. }) {
        return ApiError::conflict(e.to_string());
    }
    ApiError::new(code, e.to_string())
}
