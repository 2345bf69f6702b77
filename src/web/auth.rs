use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

/// Requires `Authorization: Bearer <web.api_key>` when a key is configured.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    if let Some(expected) = &state.config.web.api_key {
        let provided = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        if provided != Some(expected.as_str()) {
            warn!("Rejected request to {} with missing or invalid API key", request.uri().path());
            return Err((StatusCode::UNAUTHORIZED, "Invalid API key".to_string()));
        }
    }

    Ok(next.run(request).await)
}
