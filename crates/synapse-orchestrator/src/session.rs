use crate::lifecycle::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use synapse_training::{Architecture, CompiledModel, DatasetSplit, EpochLogs, TrainingConfig};
use uuid::Uuid;

/// Identifier for a training session. Generated once and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Metrics recorded at one epoch boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// 1-based epoch number.
    pub epoch: usize,
    #[serde(flatten)]
    pub logs: EpochLogs,
}

impl MetricRecord {
    #[must_use]
    pub fn new(epoch: usize, logs: EpochLogs) -> Self {
        Self { epoch, logs }
    }
}

/// One configured-and-optionally-trained run.
pub struct Session {
    pub id: SessionId,
    pub config: TrainingConfig,
    pub architecture: Arc<Architecture>,
    pub data: Arc<DatasetSplit>,
    pub state: SessionState,
    pub history: Vec<MetricRecord>,
    pub error: Option<String>,
    /// Trained model, present only once the session is `completed`.
    pub model: Option<Arc<dyn CompiledModel>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("dataset_id", &self.config.dataset_id)
            .field("state", &self.state)
            .field("epochs_recorded", &self.history.len())
            .field("has_model", &self.model.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(
        config: TrainingConfig,
        architecture: Architecture,
        data: DatasetSplit,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            config,
            architecture: Arc::new(architecture),
            data: Arc::new(data),
            state: SessionState::Initialized,
            history: Vec::new(),
            error: None,
            model: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id.clone(),
            status: self.state,
            dataset_id: self.config.dataset_id.clone(),
            epochs: self.config.epochs,
            history: self.history.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            status: self.state,
            dataset_id: self.config.dataset_id.clone(),
            epochs_completed: self.history.len(),
            created_at: self.created_at,
        }
    }
}

/// Snapshot returned by status polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub status: SessionState,
    pub dataset_id: String,
    /// Configured epoch count.
    pub epochs: u32,
    pub history: Vec<MetricRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub status: SessionState,
    pub dataset_id: String,
    pub epochs_completed: usize,
    pub created_at: DateTime<Utc>,
}
