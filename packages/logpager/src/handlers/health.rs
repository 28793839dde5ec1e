use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::session::sessions_started;

/// Liveness probe plus a little context about what is being served.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "target": state.target.to_string(),
        "sessions_started": sessions_started(),
    }))
}
