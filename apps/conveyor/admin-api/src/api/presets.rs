//! Preset enumeration endpoints.

use axum::Json;
use serde_json::{json, Value};

/// List the named policy presets
#[utoipa::path(
    get,
    path = "/presets/policies",
    tag = "presets",
    responses(
        (status = 200, description = "Preset names with their settings", body = Object)
    )
)]
pub async fn list_policy_presets() -> Json<Value> {
    let presets: Vec<Value> = policy_sim::POLICY_PRESETS
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "policy": policy_sim::policy_preset(name, "example-queue"),
            })
        })
        .collect();
    Json(json!({ "presets": presets }))
}

/// List the named traffic presets
#[utoipa::path(
    get,
    path = "/presets/traffic",
    tag = "presets",
    responses(
        (status = 200, description = "Preset names with their patterns", body = Object)
    )
)]
pub async fn list_traffic_presets() -> Json<Value> {
    let presets: Vec<Value> = policy_sim::TRAFFIC_PRESETS
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "traffic": policy_sim::traffic_preset(name),
            })
        })
        .collect();
    Json(json!({ "presets": presets }))
}
