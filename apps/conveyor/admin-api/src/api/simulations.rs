//! Simulation endpoints.

use crate::api::policy_error;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use axum_helpers::errors::{ApiError, ApiResult};
use axum_helpers::ValidatedJson;
use policy_sim::{
    Policy, Simulation, SimulationStatus, Simulator, SimulatorConfig, TrafficPattern,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Request body for running a simulation.
///
/// Policy and traffic can each come from an inline definition or a preset
/// name; inline wins when both are present.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSimulationRequest {
    /// Queue the policy applies to
    #[validate(length(min = 1))]
    pub queue: String,
    pub policy: Option<Policy>,
    /// One of `conservative`, `balanced`, `aggressive`
    pub policy_preset: Option<String>,
    pub traffic: Option<TrafficPattern>,
    /// One of `steady`, `spike`, `seasonal`, `bursty`
    pub traffic_preset: Option<String>,
    pub config: Option<SimulatorConfig>,
}

impl CreateSimulationRequest {
    fn resolve(self) -> Result<(Policy, TrafficPattern, SimulatorConfig), ApiError> {
        let policy = match (self.policy, self.policy_preset.as_deref()) {
            (Some(policy), _) => Policy {
                queue: self.queue.clone(),
                ..policy
            },
            (None, Some(name)) => policy_sim::policy_preset(name, &self.queue)
                .ok_or_else(|| ApiError::validation(format!("unknown policy preset '{}'", name)))?,
            (None, None) => Policy::new(&self.queue),
        };

        let traffic = match (self.traffic, self.traffic_preset.as_deref()) {
            (Some(traffic), _) => traffic,
            (None, Some(name)) => policy_sim::traffic_preset(name)
                .ok_or_else(|| ApiError::validation(format!("unknown traffic preset '{}'", name)))?,
            (None, None) => policy_sim::traffic_preset("steady").expect("steady preset exists"),
        };

        Ok((policy, traffic, self.config.unwrap_or_default()))
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub status: Option<SimulationStatus>,
}

/// Run a simulation and store the result
#[utoipa::path(
    post,
    path = "/simulations",
    tag = "simulations",
    request_body = CreateSimulationRequest,
    responses(
        (status = 201, description = "Simulation completed", body = Simulation),
        (status = 400, response = axum_helpers::errors::responses::BadRequestValidationResponse)
    )
)]
pub async fn create_simulation(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateSimulationRequest>,
) -> ApiResult<impl IntoResponse> {
    let (policy, traffic, config) = request.resolve()?;

    let simulation = Simulator::run(policy, traffic, config).map_err(policy_error)?;
    tracing::info!(simulation_id = %simulation.id, "Simulation completed");

    state.simulations.insert(simulation.clone());
    Ok((StatusCode::CREATED, Json(simulation)))
}

/// List simulations, newest first
#[utoipa::path(
    get,
    path = "/simulations",
    tag = "simulations",
    params(
        ("limit" = Option<usize>, Query, description = "Maximum results (default 50)"),
        ("status" = Option<String>, Query, description = "Filter by status")
    ),
    responses(
        (status = 200, description = "Simulations", body = Vec<Simulation>)
    )
)]
pub async fn list_simulations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Simulation>> {
    Json(state.simulations.list(query.limit.unwrap_or(50), query.status))
}

/// Fetch one simulation
#[utoipa::path(
    get,
    path = "/simulations/{id}",
    tag = "simulations",
    params(("id" = Uuid, Path, description = "Simulation id")),
    responses(
        (status = 200, description = "Simulation", body = Simulation),
        (status = 404, response = axum_helpers::errors::responses::NotFoundResponse)
    )
)]
pub async fn get_simulation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Simulation>> {
    let simulation = state.simulations.get(id).map_err(policy_error)?;
    Ok(Json(simulation))
}

/// Chart-ready series extracted from a simulation timeline.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChartSeries {
    pub simulation_id: Uuid,
    /// (t seconds, backlog) pairs
    #[schema(value_type = Vec<Vec<f64>>)]
    pub backlog: Vec<(f64, u64)>,
    /// (t seconds, jobs/s) pairs
    #[schema(value_type = Vec<Vec<f64>>)]
    pub arrival_rate: Vec<(f64, f64)>,
    /// (t seconds, seconds) pairs
    #[schema(value_type = Vec<Vec<f64>>)]
    pub wait: Vec<(f64, f64)>,
    /// (t seconds, ratio) pairs
    #[schema(value_type = Vec<Vec<f64>>)]
    pub utilization: Vec<(f64, f64)>,
}

/// Chart series for a completed simulation
#[utoipa::path(
    get,
    path = "/simulations/{id}/charts",
    tag = "simulations",
    params(("id" = Uuid, Path, description = "Simulation id")),
    responses(
        (status = 200, description = "Chart series", body = ChartSeries),
        (status = 404, response = axum_helpers::errors::responses::NotFoundResponse),
        (status = 409, response = axum_helpers::errors::responses::ConflictResponse)
    )
)]
pub async fn get_simulation_charts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ChartSeries>> {
    let simulation = state.simulations.get(id).map_err(policy_error)?;

    if simulation.status != SimulationStatus::Completed {
        return Err(ApiError::conflict(format!(
            "simulation {} is {:?}; charts require a completed run",
            id, simulation.status
        )));
    }

    Ok(Json(ChartSeries {
        simulation_id: id,
        backlog: simulation.timeline.iter().map(|s| (s.t_s, s.backlog)).collect(),
        arrival_rate: simulation
            .timeline
            .iter()
            .map(|s| (s.t_s, s.arrival_rate))
            .collect(),
        wait: simulation.timeline.iter().map(|s| (s.t_s, s.wait_s)).collect(),
        utilization: simulation
            .timeline
            .iter()
            .map(|s| (s.t_s, s.utilization))
            .collect(),
    }))
}
