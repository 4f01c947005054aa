//! Numeric training runtime seam.
//!
//! The orchestrator only depends on [`TrainingRuntime`] and [`CompiledModel`]: compile an
//! [`Architecture`](crate::architecture::Architecture), run a blocking `fit` that reports
//! once per completed epoch, then `predict`. [`DenseRuntime`] is the built-in
//! implementation.

mod dense;
mod network;
mod objective;
mod optimizer;

pub use dense::{DenseModel, DenseRuntime};
pub use objective::Objective;

use crate::architecture::Architecture;
use crate::config::{OptimizerKind, TrainingConfig};
use crate::dataset::DatasetSplit;
use crate::error::TrainingResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric name to scalar value for one completed epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpochLogs(BTreeMap<String, f64>);

impl EpochLogs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for EpochLogs {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Returned by the epoch callback to continue or end training at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochControl {
    Continue,
    Stop,
}

/// Epoch-boundary callback. Invoked with the 1-indexed epoch number.
pub type EpochCallback<'a> = dyn FnMut(usize, &EpochLogs) -> EpochControl + Send + 'a;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompileOptions {
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    pub seed: u64,
}

impl CompileOptions {
    #[must_use]
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            optimizer: config.optimizer,
            learning_rate: config.learning_rate,
            seed: config.seed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitParams {
    pub epochs: usize,
    pub batch_size: usize,
}

impl FitParams {
    #[must_use]
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            epochs: config.epochs as usize,
            batch_size: config.batch_size as usize,
        }
    }
}

/// Per-epoch logs of a finished `fit` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    pub epochs: Vec<EpochLogs>,
    /// True when the callback ended training before the configured epoch count.
    pub stopped_early: bool,
}

impl History {
    #[must_use]
    pub fn last(&self) -> Option<&EpochLogs> {
        self.epochs.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

/// Turns an architecture plus loss/optimizer choice into a trainable model.
pub trait TrainingRuntime: Send + Sync {
    fn name(&self) -> &'static str;

    fn compile(
        &self,
        architecture: &Architecture,
        options: &CompileOptions,
    ) -> TrainingResult<Box<dyn CompiledModel>>;
}

/// A compiled model. `fit` blocks the calling thread for the whole run.
pub trait CompiledModel: Send + Sync {
    /// Train on `data`, calling `on_epoch` once per completed epoch.
    ///
    /// Returns after all epochs, after the callback returns [`EpochControl::Stop`],
    /// or with an error on numeric failure.
    fn fit(
        &mut self,
        data: &DatasetSplit,
        params: &FitParams,
        on_epoch: &mut EpochCallback<'_>,
    ) -> TrainingResult<History>;

    /// Inference on already-scaled rows. Classification models return class
    /// probabilities, regression models a single value per row.
    fn predict(&self, rows: &[Vec<f64>]) -> TrainingResult<Vec<Vec<f64>>>;

    /// Name of the task-specific secondary metric (`accuracy` or `mae`).
    fn metric_name(&self) -> &'static str;
}
