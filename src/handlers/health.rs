use axum::{Json, extract::State};
use std::sync::Arc;

use crate::models::HealthResponse;
use crate::state::AppState;

// Liveness plus key presence, always 200 while the process is up
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: chrono::Utc::now().to_rfc3339(),
        api_key_configured: state.api_key().is_some(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
