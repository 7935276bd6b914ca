//! Policy change endpoints.
//!
//! The `X-User-ID` header identifies the actor recorded in the audit trail;
//! requests without it are attributed to "anonymous".

use crate::api::policy_error;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use axum_helpers::errors::ApiResult;
use axum_helpers::ValidatedJson;
use policy_sim::{Policy, PolicyChange};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const USER_HEADER: &str = "x-user-id";

fn actor(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous")
        .to_string()
}

/// Request body for proposing a policy change.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateChangeRequest {
    pub policy: Policy,
    /// Simulations already reviewed for this change
    #[serde(default)]
    pub simulation_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// Propose a policy change
#[utoipa::path(
    post,
    path = "/changes",
    tag = "changes",
    request_body = CreateChangeRequest,
    responses(
        (status = 201, description = "Change proposed", body = PolicyChange),
        (status = 400, response = axum_helpers::errors::responses::BadRequestValidationResponse)
    )
)]
pub async fn create_change(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<CreateChangeRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor(&headers);
    let change = state
        .changes
        .propose(request.policy, &actor)
        .map_err(policy_error)?;

    let mut change = change;
    for simulation_id in request.simulation_ids {
        // Attaching validates the simulation exists in this deployment's
        // store only implicitly; ids are operator-supplied references
        change = state
            .changes
            .attach_simulation(change.id, simulation_id, &actor)
            .map_err(policy_error)?;
    }

    Ok((StatusCode::CREATED, Json(change)))
}

/// Fetch one change with its audit trail
#[utoipa::path(
    get,
    path = "/changes/{id}",
    tag = "changes",
    params(("id" = Uuid, Path, description = "Change id")),
    responses(
        (status = 200, description = "Change", body = PolicyChange),
        (status = 404, response = axum_helpers::errors::responses::NotFoundResponse)
    )
)]
pub async fn get_change(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PolicyChange>> {
    let change = state.changes.get(id).map_err(policy_error)?;
    Ok(Json(change))
}

/// List changes, newest first
#[utoipa::path(
    get,
    path = "/changes",
    tag = "changes",
    params(("limit" = Option<usize>, Query, description = "Maximum results (default 50)")),
    responses(
        (status = 200, description = "Changes", body = Vec<PolicyChange>)
    )
)]
pub async fn list_changes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<PolicyChange>> {
    Json(state.changes.list(query.limit.unwrap_or(50)))
}

/// Approve a proposed change (requires at least one attached simulation)
#[utoipa::path(
    post,
    path = "/changes/{id}/approve",
    tag = "changes",
    params(("id" = Uuid, Path, description = "Change id")),
    responses(
        (status = 200, description = "Change approved", body = PolicyChange),
        (status = 404, response = axum_helpers::errors::responses::NotFoundResponse),
        (status = 409, response = axum_helpers::errors::responses::ConflictResponse)
    )
)]
pub async fn approve_change(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<PolicyChange>> {
    let change = state
        .changes
        .approve(id, &actor(&headers))
        .map_err(policy_error)?;
    Ok(Json(change))
}

/// Apply an approved change, publishing the new policy version
#[utoipa::path(
    post,
    path = "/changes/{id}/apply",
    tag = "changes",
    params(("id" = Uuid, Path, description = "Change id")),
    responses(
        (status = 200, description = "Change applied", body = PolicyChange),
        (status = 404, response = axum_helpers::errors::responses::NotFoundResponse),
        (status = 409, response = axum_helpers::errors::responses::ConflictResponse)
    )
)]
pub async fn apply_change(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<PolicyChange>> {
    let change = state
        .changes
        .apply(id, &actor(&headers))
        .map_err(policy_error)?;
    Ok(Json(change))
}

/// Roll back an applied change, restoring the previous values
#[utoipa::path(
    post,
    path = "/changes/{id}/rollback",
    tag = "changes",
    params(("id" = Uuid, Path, description = "Change id")),
    responses(
        (status = 200, description = "Change rolled back", body = PolicyChange),
        (status = 404, response = axum_helpers::errors::responses::NotFoundResponse),
        (status = 409, response = axum_helpers::errors::responses::ConflictResponse)
    )
)]
pub async fn rollback_change(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<PolicyChange>> {
    let change = state
        .changes
        .rollback(id, &actor(&headers))
        .map_err(policy_error)?;
    Ok(Json(change))
}
