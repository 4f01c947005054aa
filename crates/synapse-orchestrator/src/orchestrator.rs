//! Training orchestrator.
//!
//! Each started session gets a driver task. The driver waits for a worker permit, runs
//! compile + fit on the blocking pool, and pumps epoch logs from the worker through a
//! bounded queue into the session history and the live progress channel. Cancellation
//! is cooperative: the worker only sees it at the next epoch boundary.

use crate::channel::{Observer, ProgressChannel};
use crate::error::{OrchestrationError, Result};
use crate::events::{EpochMetrics, ProgressEvent};
use crate::lifecycle::SessionState;
use crate::session::{MetricRecord, SessionId, SessionStatus, SessionSummary};
use crate::store::SessionStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use synapse_training::{
    Architecture, CompileOptions, CompiledModel, DatasetLoader, DatasetSplit, EpochControl,
    EpochLogs, FitParams, History, Objective, TrainingConfig, TrainingResult, TrainingRuntime,
};
use tokio::sync::{RwLock, Semaphore, mpsc, watch};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Sessions allowed to train at the same time; later ones wait for a slot.
    pub max_concurrent_sessions: usize,
    /// Capacity of the per-session queue between the training worker and the event pump.
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_concurrent_sessions: 4, event_buffer: 64 }
    }
}

/// Reply to a successful session creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
    pub message: String,
    pub model_summary: String,
    /// `[training rows, features]`
    pub input_shape: [usize; 2],
    pub output_shape: [usize; 1],
    pub class_count: usize,
}

struct RunningSession {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

type RunningMap = Arc<RwLock<HashMap<SessionId, RunningSession>>>;

pub struct Orchestrator {
    config: OrchestratorConfig,
    loader: Arc<DatasetLoader>,
    runtime: Arc<dyn TrainingRuntime>,
    store: Arc<SessionStore>,
    channel: Arc<ProgressChannel>,
    workers: Arc<Semaphore>,
    running: RunningMap,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("runtime", &self.runtime.name())
            .field("tiers", &self.loader.tier_names())
            .field("store", &self.store)
            .field("running", &self.running.try_read().map(|r| r.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        loader: DatasetLoader,
        runtime: Arc<dyn TrainingRuntime>,
    ) -> Self {
        Self {
            config,
            loader: Arc::new(loader),
            runtime,
            store: Arc::new(SessionStore::new()),
            channel: Arc::new(ProgressChannel::new(config.event_buffer)),
            workers: Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1))),
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validates `config`, resolves and splits its dataset, builds the architecture and
    /// registers an `initialized` session. Nothing is registered if any step fails.
    pub async fn create_session(&self, config: TrainingConfig) -> Result<SessionCreated> {
        config.validate()?;

        let dataset = self.loader.resolve(&config.dataset_id).await?;
        let data = DatasetSplit::prepare(&dataset, config.train_test_split, config.seed)?;
        let architecture = Architecture::build(data.input_width(), data.output_width(), &config)?;

        let model_summary = architecture.summary();
        let input_shape = [data.x_train.len(), data.input_width()];
        let output_shape = [architecture.output_width()];
        let class_count = data.class_count;

        let session_id = self.store.create(config, architecture, data).await;
        Ok(SessionCreated {
            session_id,
            message: "Training session initialized successfully".to_string(),
            model_summary,
            input_shape,
            output_shape,
            class_count,
        })
    }

    /// Binds the live progress channel for an existing session.
    pub async fn attach(&self, id: &SessionId) -> Result<Observer> {
        if !self.store.contains(id).await {
            return Err(OrchestrationError::SessionNotFound(id.clone()));
        }
        self.channel.bind(id).await
    }

    /// Moves an `initialized` session to `training` and hands it to a worker.
    pub async fn start_training(&self, id: &SessionId) -> Result<()> {
        let handle = self.store.handle(id).await?;
        let (config, architecture, data) = {
            let session = handle.lock().await;
            (session.config.clone(), Arc::clone(&session.architecture), Arc::clone(&session.data))
        };

        self.store.transition(id, SessionState::Training).await?;
        self.channel.publish(id, ProgressEvent::started(config.epochs)).await;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        self.running
            .write()
            .await
            .insert(id.clone(), RunningSession { cancel: cancel.clone(), done: done_rx });

        let run = TrainingRun {
            id: id.clone(),
            config,
            architecture,
            data,
            runtime: Arc::clone(&self.runtime),
            store: Arc::clone(&self.store),
            channel: Arc::clone(&self.channel),
            event_buffer: self.config.event_buffer.max(1),
            cancel,
        };
        let workers = Arc::clone(&self.workers);
        let channel = Arc::clone(&self.channel);
        let running = Arc::clone(&self.running);
        let session_id = id.clone();

        tokio::spawn(async move {
            run.execute(workers).await;
            channel.unbind(&session_id).await;
            running.write().await.remove(&session_id);
            let _ = done_tx.send(true);
        });

        info!(session_id = %id, runtime = self.runtime.name(), "Training scheduled");
        Ok(())
    }

    /// Releases the observer. A running session is flagged for cancellation and becomes
    /// `cancelled` once its worker reaches the next epoch boundary.
    pub async fn detach(&self, id: &SessionId) {
        self.channel.unbind(id).await;
        if let Some(running) = self.running.read().await.get(id) {
            if !running.cancel.is_cancelled() {
                info!(session_id = %id, "Observer detached mid-training, cancelling");
                running.cancel.cancel();
            }
        }
    }

    /// Waits until the session's worker has finished, returning the resulting state.
    pub async fn wait_for_completion(&self, id: &SessionId) -> Result<SessionState> {
        let done = self.running.read().await.get(id).map(|r| r.done.clone());
        if let Some(mut done) = done {
            // A closed sender means the driver is already gone.
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.store.state(id).await
    }

    pub async fn status(&self, id: &SessionId) -> Result<SessionStatus> {
        self.store.status(id).await
    }

    /// Runs inference with the trained model after applying the session's fitted scaler.
    pub async fn predict(&self, id: &SessionId, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let (model, data) = self.store.model(id).await?;
        let scaled = data.scaler.transform(rows)?;
        debug!(session_id = %id, rows = rows.len(), "Running prediction");
        Ok(model.predict(&scaled)?)
    }

    /// Removes the session, cancelling its worker if one is still running.
    pub async fn delete(&self, id: &SessionId) -> Result<()> {
        if let Some(running) = self.running.read().await.get(id) {
            running.cancel.cancel();
        }
        self.channel.unbind(id).await;
        self.store.delete(id).await
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        self.store.list().await
    }

    pub async fn session_count(&self) -> usize {
        self.store.len().await
    }

    /// Sessions that are training or waiting for a worker slot.
    pub async fn active_sessions(&self) -> usize {
        self.running.read().await.len()
    }

    /// Cancels every running session and waits for the workers to return.
    pub async fn shutdown(&self) {
        let pending: Vec<(SessionId, watch::Receiver<bool>)> = {
            let running = self.running.read().await;
            running
                .iter()
                .map(|(id, r)| {
                    r.cancel.cancel();
                    (id.clone(), r.done.clone())
                })
                .collect()
        };
        info!(sessions = pending.len(), "Shutting down orchestrator");
        for (id, mut done) in pending {
            let _ = done.wait_for(|finished| *finished).await;
            debug!(session_id = %id, "Worker stopped");
        }
    }
}

/// Everything one driver task needs, detached from the orchestrator.
struct TrainingRun {
    id: SessionId,
    config: TrainingConfig,
    architecture: Arc<Architecture>,
    data: Arc<DatasetSplit>,
    runtime: Arc<dyn TrainingRuntime>,
    store: Arc<SessionStore>,
    channel: Arc<ProgressChannel>,
    event_buffer: usize,
    cancel: CancellationToken,
}

impl TrainingRun {
    async fn execute(self, workers: Arc<Semaphore>) {
        let permit = tokio::select! {
            permit = workers.acquire_owned() => permit,
            () = self.cancel.cancelled() => {
                self.finish_cancelled().await;
                return;
            }
        };
        let Ok(_permit) = permit else {
            self.finish_failed("Training worker pool is closed".to_string()).await;
            return;
        };

        let metric_name = Objective::for_architecture(&self.architecture).metric_name();
        let (events_tx, mut events_rx) = mpsc::channel::<(usize, EpochLogs)>(self.event_buffer);

        let worker = {
            let runtime = Arc::clone(&self.runtime);
            let architecture = Arc::clone(&self.architecture);
            let data = Arc::clone(&self.data);
            let options = CompileOptions::from_config(&self.config);
            let params = FitParams::from_config(&self.config);
            let cancel = self.cancel.clone();
            task::spawn_blocking(move || {
                fit_blocking(runtime.as_ref(), &architecture, &data, &options, &params, &cancel, &events_tx)
            })
        };
        debug!(session_id = %self.id, "Training worker started");

        while let Some((epoch, logs)) = events_rx.recv().await {
            if self.cancel.is_cancelled() {
                debug!(session_id = %self.id, epoch, "Dropping progress for cancelled session");
                continue;
            }
            match self.store.append_metric(&self.id, MetricRecord::new(epoch, logs.clone())).await {
                Ok(true) => {
                    debug!(session_id = %self.id, epoch, "Epoch completed");
                    let event = ProgressEvent::epoch_update(epoch, &logs, metric_name);
                    self.channel.publish(&self.id, event).await;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(session_id = %self.id, error = %e, "Session vanished mid-training");
                    self.cancel.cancel();
                }
            }
        }

        let outcome = worker.await;
        if self.cancel.is_cancelled() {
            self.finish_cancelled().await;
            return;
        }
        match outcome {
            Ok(Ok((model, history))) => self.finish_completed(model, &history, metric_name).await,
            Ok(Err(e)) => {
                self.finish_failed(OrchestrationError::TrainingFailure(e.to_string()).to_string())
                    .await;
            }
            Err(e) => {
                self.finish_failed(format!("Training worker panicked: {e}")).await;
            }
        }
    }

    async fn finish_completed(
        &self,
        model: Box<dyn CompiledModel>,
        history: &History,
        metric_name: &str,
    ) {
        if let Err(e) = self.store.complete(&self.id, Arc::from(model)).await {
            warn!(session_id = %self.id, error = %e, "Could not record completed training");
            return;
        }
        let last = history.last().cloned().unwrap_or_default();
        info!(session_id = %self.id, epochs = history.len(), "Training completed");
        self.channel
            .publish(&self.id, ProgressEvent::complete(EpochMetrics::from_logs(&last, metric_name)))
            .await;
    }

    async fn finish_failed(&self, message: String) {
        error!(session_id = %self.id, error = %message, "Training failed");
        if let Err(e) = self.store.fail(&self.id, message.clone()).await {
            debug!(session_id = %self.id, error = %e, "Could not record training failure");
        }
        self.channel.publish(&self.id, ProgressEvent::error(message)).await;
    }

    async fn finish_cancelled(&self) {
        if let Err(e) = self.store.transition(&self.id, SessionState::Cancelled).await {
            debug!(session_id = %self.id, error = %e, "Could not mark session cancelled");
        }
    }
}

/// Compile and fit on the current (blocking) thread, forwarding each epoch's logs.
///
/// The callback stops training once `cancel` fires or the pump has gone away.
fn fit_blocking(
    runtime: &dyn TrainingRuntime,
    architecture: &Architecture,
    data: &DatasetSplit,
    options: &CompileOptions,
    params: &FitParams,
    cancel: &CancellationToken,
    events: &mpsc::Sender<(usize, EpochLogs)>,
) -> TrainingResult<(Box<dyn CompiledModel>, History)> {
    let mut model = runtime.compile(architecture, options)?;
    let mut on_epoch = |epoch: usize, logs: &EpochLogs| {
        if cancel.is_cancelled() || events.blocking_send((epoch, logs.clone())).is_err() {
            EpochControl::Stop
        } else {
            EpochControl::Continue
        }
    };
    let history = model.fit(data, params, &mut on_epoch)?;
    Ok((model, history))
}
