use axum::{extract::State, Json};
use crate::models::HealthResponse;
use crate::state::AppState;
use tracing::debug;

/// Health check endpoint, reports the number of live collaboration sessions
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.registry.len().await;
    debug!("Health check requested ({} active sessions)", sessions);
    Json(HealthResponse {
        status: "ok".to_string(),
        message: format!("Server is running with {} active collaboration sessions", sessions),
    })
}
