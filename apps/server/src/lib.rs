//! Synapse HTTP/WebSocket server.
//!
//! Exposes the training orchestrator over REST for session management and prediction,
//! and over WebSocket for live training progress.

pub mod config;
pub mod error;
pub mod routes;
pub mod ws;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use std::sync::Arc;
use synapse_orchestrator::Orchestrator;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use config::ServerConfig;
pub use error::{ApiError, ConfigError};

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Builds the application router with CORS for `allowed_origins` and request tracing.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::root))
        .route("/api/health", get(routes::health))
        .route("/api/train", get(routes::list_sessions))
        .route("/api/train/start", post(routes::start_session))
        .route("/api/train/:session_id", axum::routing::delete(routes::delete_session))
        .route("/api/train/:session_id/status", get(routes::session_status))
        .route("/api/train/:session_id/predict", post(routes::predict))
        .route("/ws/train/:session_id", get(ws::training_socket))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
