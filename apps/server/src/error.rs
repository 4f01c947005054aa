//! HTTP error mapping and configuration errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::path::PathBuf;
use synapse_orchestrator::OrchestrationError;
use synapse_training::TrainingError;
use thiserror::Error;
use tracing::error;

/// Errors loading the server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Error returned by HTTP handlers, rendered as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error("{0}")]
    BadRequest(String),
}

impl From<TrainingError> for ApiError {
    fn from(e: TrainingError) -> Self {
        Self::Orchestration(e.into())
    }
}

impl ApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Orchestration(e) => match e {
                OrchestrationError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                OrchestrationError::SessionBusy(_) | OrchestrationError::InvalidTransition { .. } => {
                    StatusCode::CONFLICT
                }
                OrchestrationError::ModelNotReady { .. } => StatusCode::BAD_REQUEST,
                OrchestrationError::TrainingFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
                OrchestrationError::Training(t) => match t {
                    TrainingError::InvalidConfig(_) | TrainingError::DatasetFormat(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    TrainingError::DatasetNotFound(_) => StatusCode::NOT_FOUND,
                    TrainingError::DatasetBackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                },
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = self.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %detail, "Request failed");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
