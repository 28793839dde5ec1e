use axum::{
    Json,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, info};

use crate::AppState;
use crate::backend::Target;
use crate::error::BackendError;
use crate::session::Session;

/// Open the target file, then upgrade. The file is opened first so a bad
/// path or an unreachable host is reported as a plain HTTP error.
pub async fn log_websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let session = match Session::open(&state.target, &state.ssh, state.session.clone()).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to open {}: {}", state.target, e);
            let status = open_error_status(&state.target, &e);
            return (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response();
        }
    };

    info!("Accepted connection for {}", session.id());
    ws.on_upgrade(move |socket| session.serve(socket))
}

/// Remote setup failures are upstream problems, local ones are ours.
fn open_error_status(target: &Target, error: &BackendError) -> StatusCode {
    // A refused TCP connect to the remote host still surfaces as I/O
    if error.is_remote() || matches!(target, Target::Remote { .. }) {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
