//! Request/response endpoints.

use crate::AppState;
use crate::error::ApiError;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use chrono::Utc;
use serde_json::{Value, json};
use synapse_orchestrator::{SessionCreated, SessionId, SessionStatus, SessionSummary};
use synapse_training::TrainingConfig;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Synapse training API is running",
        "version": VERSION,
        "status": "healthy",
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": VERSION,
        "active_sessions": state.orchestrator.active_sessions().await,
        "sessions": state.orchestrator.session_count().await,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Creates a session from a JSON `TrainingConfig`. Unknown fields are rejected.
pub async fn start_session(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<SessionCreated>, ApiError> {
    let config = TrainingConfig::from_json(&body)?;
    let created = state.orchestrator.create_session(config).await?;
    info!(
        session_id = %created.session_id,
        class_count = created.class_count,
        "Training session initialized"
    );
    Ok(Json(created))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.orchestrator.list().await)
}

pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    Ok(Json(state.orchestrator.status(&SessionId::from(session_id)).await?))
}

pub async fn predict(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<Vec<Vec<f64>>>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(rows) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let predictions = state.orchestrator.predict(&SessionId::from(session_id), &rows).await?;
    Ok(Json(json!({ "predictions": predictions })))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = SessionId::from(session_id);
    state.orchestrator.delete(&id).await?;
    Ok(Json(json!({ "message": format!("Session {id} deleted successfully") })))
}
