//! In-memory session registry.
//!
//! The map itself is only locked long enough to look up, insert or remove a session
//! handle. Every state change then takes that session's own lock, so distinct sessions
//! never serialize behind each other.

use crate::error::{OrchestrationError, Result};
use crate::lifecycle::SessionState;
use crate::session::{MetricRecord, Session, SessionId, SessionStatus, SessionSummary};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use synapse_training::{Architecture, CompiledModel, DatasetSplit, TrainingConfig};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

type SessionHandle = Arc<Mutex<Session>>;

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("session_count", &self.sessions.try_read().map(|s| s.len()).unwrap_or(0))
            .finish()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session in state `initialized` and returns its fresh identifier.
    pub async fn create(
        &self,
        config: TrainingConfig,
        architecture: Architecture,
        data: DatasetSplit,
    ) -> SessionId {
        let session = Session::new(config, architecture, data);
        let id = session.id.clone();
        self.sessions.write().await.insert(id.clone(), Arc::new(Mutex::new(session)));
        info!(session_id = %id, "Session created");
        id
    }

    pub async fn handle(&self, id: &SessionId) -> Result<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestrationError::SessionNotFound(id.clone()))
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn state(&self, id: &SessionId) -> Result<SessionState> {
        let handle = self.handle(id).await?;
        let state = handle.lock().await.state;
        Ok(state)
    }

    pub async fn status(&self, id: &SessionId) -> Result<SessionStatus> {
        let handle = self.handle(id).await?;
        let status = handle.lock().await.status();
        Ok(status)
    }

    pub async fn delete(&self, id: &SessionId) -> Result<()> {
        match self.sessions.write().await.remove(id) {
            Some(_) => {
                info!(session_id = %id, "Session deleted");
                Ok(())
            }
            None => Err(OrchestrationError::SessionNotFound(id.clone())),
        }
    }

    /// Moves the session to `to`, returning the previous state.
    pub async fn transition(&self, id: &SessionId, to: SessionState) -> Result<SessionState> {
        let handle = self.handle(id).await?;
        let mut session = handle.lock().await;
        Self::apply_transition(&mut session, to)
    }

    fn apply_transition(session: &mut Session, to: SessionState) -> Result<SessionState> {
        let from = session.state;
        if !from.can_transition_to(to) {
            warn!(session_id = %session.id, from = ?from, to = ?to, "Invalid state transition");
            return Err(OrchestrationError::InvalidTransition { id: session.id.clone(), from, to });
        }
        info!(session_id = %session.id, from = ?from, to = ?to, "State transition");
        session.state = to;
        session.touch();
        Ok(from)
    }

    /// Appends an epoch record while the session is training.
    ///
    /// Returns `false` when the record was dropped: the session left `training`, or the
    /// epoch is not the next one in sequence.
    pub async fn append_metric(&self, id: &SessionId, record: MetricRecord) -> Result<bool> {
        let handle = self.handle(id).await?;
        let mut session = handle.lock().await;
        if session.state != SessionState::Training {
            debug!(session_id = %id, state = ?session.state, "Dropping metric for idle session");
            return Ok(false);
        }
        if record.epoch != session.history.len() + 1 {
            warn!(
                session_id = %id,
                epoch = record.epoch,
                recorded = session.history.len(),
                "Dropping out-of-sequence metric"
            );
            return Ok(false);
        }
        session.history.push(record);
        session.touch();
        Ok(true)
    }

    /// `training -> completed`, storing the trained model for prediction.
    pub async fn complete(&self, id: &SessionId, model: Arc<dyn CompiledModel>) -> Result<()> {
        let handle = self.handle(id).await?;
        let mut session = handle.lock().await;
        Self::apply_transition(&mut session, SessionState::Completed)?;
        session.model = Some(model);
        Ok(())
    }

    /// `training -> error`, keeping the failure message for status queries.
    pub async fn fail(&self, id: &SessionId, message: impl Into<String>) -> Result<()> {
        let handle = self.handle(id).await?;
        let mut session = handle.lock().await;
        Self::apply_transition(&mut session, SessionState::Error)?;
        session.error = Some(message.into());
        Ok(())
    }

    /// The trained model and the scaler it expects, only for `completed` sessions.
    pub async fn model(
        &self,
        id: &SessionId,
    ) -> Result<(Arc<dyn CompiledModel>, Arc<DatasetSplit>)> {
        let handle = self.handle(id).await?;
        let session = handle.lock().await;
        match (&session.model, session.state) {
            (Some(model), SessionState::Completed) => Ok((Arc::clone(model), Arc::clone(&session.data))),
            (_, state) => Err(OrchestrationError::ModelNotReady { id: id.clone(), state }),
        }
    }

    /// Summaries ordered by creation time.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.lock().await.summary());
        }
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use synapse_training::{Activation, BuiltinResolver, OptimizerKind, Regularizer};

    pub(crate) fn iris_config(epochs: u32) -> TrainingConfig {
        TrainingConfig {
            dataset_id: "iris".to_string(),
            model_type: "classification".to_string(),
            num_layers: 2,
            num_neurons: 8,
            learning_rate: 0.01,
            regularization_rate: 0.0,
            train_test_split: 0.8,
            regularizer: Regularizer::None,
            optimizer: OptimizerKind::Adam,
            activation: Activation::Relu,
            epochs,
            batch_size: 16,
            seed: 42,
        }
    }

    async fn create_iris(store: &SessionStore) -> SessionId {
        let config = iris_config(5);
        let data = DatasetSplit::prepare(&BuiltinResolver::iris().unwrap(), 0.8, 42).unwrap();
        let arch = Architecture::build(data.input_width(), data.output_width(), &config).unwrap();
        store.create(config, arch, data).await
    }

    fn record(epoch: usize) -> MetricRecord {
        MetricRecord::new(epoch, [("loss".to_string(), 1.0)].into_iter().collect())
    }

    #[tokio::test]
    async fn test_create_starts_initialized() {
        let store = SessionStore::new();
        let id = create_iris(&store).await;
        assert_eq!(store.state(&id).await.unwrap(), SessionState::Initialized);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let store = SessionStore::new();
        let id = SessionId::from("missing");
        assert!(matches!(store.state(&id).await, Err(OrchestrationError::SessionNotFound(_))));
        assert!(matches!(store.delete(&id).await, Err(OrchestrationError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_transitions_are_monotonic() {
        let store = SessionStore::new();
        let id = create_iris(&store).await;

        assert!(store.transition(&id, SessionState::Completed).await.is_err());
        store.transition(&id, SessionState::Training).await.unwrap();
        store.transition(&id, SessionState::Cancelled).await.unwrap();

        let err = store.transition(&id, SessionState::Training).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::InvalidTransition { from: SessionState::Cancelled, .. }
        ));
    }

    #[tokio::test]
    async fn test_metrics_only_append_in_sequence_while_training() {
        let store = SessionStore::new();
        let id = create_iris(&store).await;

        assert!(!store.append_metric(&id, record(1)).await.unwrap());
        store.transition(&id, SessionState::Training).await.unwrap();
        assert!(store.append_metric(&id, record(1)).await.unwrap());
        assert!(!store.append_metric(&id, record(3)).await.unwrap());
        assert!(store.append_metric(&id, record(2)).await.unwrap());

        assert_eq!(store.status(&id).await.unwrap().history.len(), 2);
    }

    #[tokio::test]
    async fn test_model_requires_completed_state() {
        let store = SessionStore::new();
        let id = create_iris(&store).await;

        for step in [None, Some(SessionState::Training)] {
            if let Some(to) = step {
                store.transition(&id, to).await.unwrap();
            }
            assert!(matches!(
                store.model(&id).await,
                Err(OrchestrationError::ModelNotReady { .. })
            ));
        }

        store.fail(&id, "boom").await.unwrap();
        let status = store.status(&id).await.unwrap();
        assert_eq!(status.status, SessionState::Error);
        assert_eq!(status.error.as_deref(), Some("boom"));
        assert!(matches!(
            store.model(&id).await,
            Err(OrchestrationError::ModelNotReady { state: SessionState::Error, .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_session() {
        let store = SessionStore::new();
        let id = create_iris(&store).await;
        store.delete(&id).await.unwrap();
        assert!(!store.contains(&id).await);
        assert!(store.is_empty().await);
    }
}
