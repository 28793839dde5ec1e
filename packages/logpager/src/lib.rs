//! Page through and search a log file from the browser.
//!
//! Every WebSocket connection on `/log` gets its own [`session::Session`]
//! over a [`backend::FileBackend`] for the configured [`backend::Target`],
//! which is either a local path or a file reached over SFTP.

pub mod backend;
pub mod config;
pub mod error;
pub mod handlers;
pub mod search;
pub mod session;
mod views;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

use crate::backend::Target;
use crate::config::{SessionConfig, SshConfig};

#[derive(Clone)]
pub struct AppState {
    pub target: Arc<Target>,
    pub session: SessionConfig,
    pub ssh: SshConfig,
}

impl AppState {
    pub fn new(target: Target, session: SessionConfig, ssh: SshConfig) -> Self {
        Self {
            target: Arc::new(target),
            session,
            ssh,
        }
    }
}

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(views::index_page))
        .route("/log", get(handlers::log_websocket_handler))
        .route("/health", get(handlers::health_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .with_state(state)
}
