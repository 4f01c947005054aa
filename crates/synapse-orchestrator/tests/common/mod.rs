//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use synapse_orchestrator::{Observer, Orchestrator, OrchestratorConfig, ProgressEvent};
use synapse_training::{
    Architecture, BuiltinResolver, CompileOptions, CompiledModel, DatasetLoader, DatasetSplit,
    DenseRuntime, EpochCallback, EpochControl, EpochLogs, FitParams, History, TrainingConfig,
    TrainingError, TrainingResult, TrainingRuntime,
};

pub fn iris_config(epochs: u32) -> TrainingConfig {
    TrainingConfig::from_json(&format!(
        r#"{{
            "dataset_id": "iris",
            "model_type": "classification",
            "num_layers": 2,
            "num_neurons": 8,
            "learning_rate": 0.01,
            "regularization_rate": 0.0,
            "train_test_split": 0.8,
            "regularizer": "none",
            "optimizer": "adam",
            "activation": "relu",
            "epochs": {epochs},
            "batch_size": 16
        }}"#
    ))
    .unwrap()
}

pub fn builtin_loader() -> DatasetLoader {
    DatasetLoader::new(vec![Box::new(BuiltinResolver)])
}

pub fn dense_orchestrator() -> Orchestrator {
    Orchestrator::new(OrchestratorConfig::default(), builtin_loader(), Arc::new(DenseRuntime))
}

/// Next event, failing the test if none arrives within a few seconds.
pub async fn next_event(observer: &mut Observer) -> Option<ProgressEvent> {
    tokio::time::timeout(Duration::from_secs(30), observer.recv())
        .await
        .expect("timed out waiting for a progress event")
}

/// Runtime whose model waits for one gate signal before finishing each epoch.
///
/// Once the gate sender is dropped every remaining epoch runs without waiting.
pub struct GatedRuntime {
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl GatedRuntime {
    pub fn new() -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (Self { gate: Mutex::new(Some(rx)) }, tx)
    }
}

impl TrainingRuntime for GatedRuntime {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn compile(
        &self,
        _architecture: &Architecture,
        _options: &CompileOptions,
    ) -> TrainingResult<Box<dyn CompiledModel>> {
        let gate = self.gate.lock().unwrap().take();
        Ok(Box::new(GatedModel { gate: Mutex::new(gate) }))
    }
}

struct GatedModel {
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl CompiledModel for GatedModel {
    fn fit(
        &mut self,
        _data: &DatasetSplit,
        params: &FitParams,
        on_epoch: &mut EpochCallback<'_>,
    ) -> TrainingResult<History> {
        let mut history = History::default();
        for epoch in 1..=params.epochs {
            if let Ok(Some(gate)) = self.gate.get_mut() {
                let _ = gate.recv();
            }
            let value = 1.0 / epoch as f64;
            let logs: EpochLogs = [
                ("loss".to_string(), value),
                ("val_loss".to_string(), value),
                ("accuracy".to_string(), 1.0 - value),
                ("val_accuracy".to_string(), 1.0 - value),
            ]
            .into_iter()
            .collect();
            history.epochs.push(logs.clone());
            if on_epoch(epoch, &logs) == EpochControl::Stop {
                history.stopped_early = epoch < params.epochs;
                break;
            }
        }
        Ok(history)
    }

    fn predict(&self, rows: &[Vec<f64>]) -> TrainingResult<Vec<Vec<f64>>> {
        Ok(rows.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }

    fn metric_name(&self) -> &'static str {
        "accuracy"
    }
}

/// Runtime that cannot compile anything.
pub struct FailingRuntime;

impl TrainingRuntime for FailingRuntime {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn compile(
        &self,
        _architecture: &Architecture,
        _options: &CompileOptions,
    ) -> TrainingResult<Box<dyn CompiledModel>> {
        Err(TrainingError::Runtime("compile exploded".to_string()))
    }
}
