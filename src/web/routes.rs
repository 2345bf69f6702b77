use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// Liveness, reachable without credentials
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(handlers::api::health))
}

// Pipelines-server protocol spoken by the chat host
pub fn pipeline_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Pipelines exposed as models
        .route("/models", get(handlers::api::list_models))
        .route("/v1/models", get(handlers::api::list_models))

        // Message handling
        .route("/chat/completions", post(handlers::chat::chat_completions))
        .route("/v1/chat/completions", post(handlers::chat::chat_completions))

        // Valves
        .route("/{pipeline_id}/valves", get(handlers::api::get_valves))
        .route("/{pipeline_id}/valves/update", post(handlers::api::update_valves))

        // System status
        .route("/status", get(handlers::api::system_status))
}
