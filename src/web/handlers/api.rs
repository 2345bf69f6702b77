use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Valves;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct PipelineInfo {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub valves: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
    pub pipeline: PipelineInfo,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub data: Vec<ModelInfo>,
    pub object: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub pipelines: Vec<String>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": true }))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    let created = state.startup_time.timestamp();

    let data = state
        .registry
        .iter()
        .map(|pipeline| ModelInfo {
            id: pipeline.id.clone(),
            name: pipeline.name.clone(),
            object: "model",
            created,
            owned_by: "t2q-pipelines",
            pipeline: PipelineInfo {
                kind: "pipe",
                valves: true,
            },
        })
        .collect();

    Json(ModelList {
        data,
        object: "list",
    })
}

pub async fn get_valves(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
) -> Result<Json<Valves>, (StatusCode, String)> {
    let pipeline = state.registry.get(&pipeline_id).ok_or_else(|| not_found(&pipeline_id))?;

    Ok(Json(pipeline.valves().await))
}

pub async fn update_valves(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
    Json(updates): Json<serde_json::Value>,
) -> Result<Json<Valves>, (StatusCode, String)> {
    let pipeline = state.registry.get(&pipeline_id).ok_or_else(|| not_found(&pipeline_id))?;

    let valves = pipeline.valves().await.with_updates(&updates).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid valves: {}", e),
        )
    })?;

    let updated = pipeline.on_valves_updated(valves).await.map_err(|e| {
        error!("Failed to apply valves to {}: {}", pipeline_id, e);
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to update valves: {}", e),
        )
    })?;

    info!("Valves for {} updated", pipeline_id);
    Ok(Json(updated))
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        pipelines: state.registry.iter().map(|p| p.id.clone()).collect(),
    })
}

pub(crate) fn not_found(pipeline_id: &str) -> (StatusCode, String) {
    (
        StatusCode::NOT_FOUND,
        format!("Pipeline {} not found", pipeline_id),
    )
}
