//! Training-session orchestrator for Synapse.
//!
//! Owns session state and drives training runs: an in-memory [`SessionStore`], the
//! per-session [`ProgressChannel`] and the [`Orchestrator`] that ties them to a
//! [`synapse_training::TrainingRuntime`].

pub mod channel;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod orchestrator;
pub mod session;
pub mod store;

pub use channel::{Observer, ProgressChannel};
pub use events::{EpochMetrics, ProgressEvent, TaskMetric};
pub use lifecycle::SessionState;
pub use orchestrator::{Orchestrator, OrchestratorConfig, SessionCreated};
pub use session::{MetricRecord, Session, SessionId, SessionStatus, SessionSummary};
pub use store::SessionStore;

// Re-export orchestration error separately to keep `Result` unambiguous
pub use error::OrchestrationError;
