use serde::{Deserialize, Serialize};
use synapse_training::EpochLogs;

/// Structured progress message delivered to the attached observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    TrainingStarted {
        message: String,
        epochs: u32,
    },
    EpochUpdate {
        /// 1-based epoch number.
        epoch: usize,
        #[serde(flatten)]
        metrics: EpochMetrics,
    },
    TrainingComplete {
        message: String,
        final_metrics: EpochMetrics,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    #[must_use]
    pub fn started(epochs: u32) -> Self {
        Self::TrainingStarted { message: "Training started".to_string(), epochs }
    }

    #[must_use]
    pub fn epoch_update(epoch: usize, logs: &EpochLogs, metric_name: &str) -> Self {
        Self::EpochUpdate { epoch, metrics: EpochMetrics::from_logs(logs, metric_name) }
    }

    #[must_use]
    pub fn complete(final_metrics: EpochMetrics) -> Self {
        Self::TrainingComplete {
            message: "Training completed successfully".to_string(),
            final_metrics,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Terminal events end the stream for a session.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TrainingComplete { .. } | Self::Error { .. })
    }
}

/// Train and held-out loss with the task-appropriate secondary metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub loss: f64,
    pub val_loss: f64,
    #[serde(flatten)]
    pub task: TaskMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskMetric {
    Accuracy { accuracy: f64, val_accuracy: f64 },
    Mae { mae: f64, val_mae: f64 },
}

impl EpochMetrics {
    /// Missing keys read as zero; `metric_name` picks accuracy or mean absolute error.
    #[must_use]
    pub fn from_logs(logs: &EpochLogs, metric_name: &str) -> Self {
        let get = |key: &str| logs.get(key).unwrap_or_default();
        let task = if metric_name == "accuracy" {
            TaskMetric::Accuracy { accuracy: get("accuracy"), val_accuracy: get("val_accuracy") }
        } else {
            TaskMetric::Mae { mae: get("mae"), val_mae: get("val_mae") }
        };
        Self { loss: get("loss"), val_loss: get("val_loss"), task }
    }
}
