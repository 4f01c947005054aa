// Error types for session orchestration

use crate::lifecycle::SessionState;
use crate::session::SessionId;
use synapse_training::TrainingError;
use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// No session with this identifier exists
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// An observer is already bound to the session
    #[error("Session {0} already has an observer attached")]
    SessionBusy(SessionId),

    /// Prediction requested before training completed
    #[error("Model for session {id} is not trained yet (state: {state})")]
    ModelNotReady {
        /// Session identifier
        id: SessionId,
        /// State the session was in
        state: SessionState,
    },

    /// Lifecycle transition rejected by the state machine
    #[error("Invalid transition for session {id}: {from} -> {to}")]
    InvalidTransition {
        /// Session identifier
        id: SessionId,
        /// Current state
        from: SessionState,
        /// Requested state
        to: SessionState,
    },

    /// Compilation or fitting failed
    #[error("Training failed: {0}")]
    TrainingFailure(String),

    /// Configuration, dataset or runtime error from the training layer
    #[error(transparent)]
    Training(#[from] TrainingError),
}
