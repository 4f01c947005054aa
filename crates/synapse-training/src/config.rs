use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::warn;

/// Declarative description of one training run, validated once at session creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    pub dataset_id: String,
    /// Client-side label; the task type is derived from the dataset's class-count.
    pub model_type: String,
    pub num_layers: u32,
    pub num_neurons: u32,
    pub learning_rate: f64,
    pub regularization_rate: f64,
    /// Fraction of rows used for training; the rest is held out for validation.
    pub train_test_split: f64,
    pub regularizer: Regularizer,
    pub optimizer: OptimizerKind,
    pub activation: Activation,
    #[serde(default = "default_epochs")]
    pub epochs: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_epochs() -> u32 {
    100
}

fn default_batch_size() -> u32 {
    32
}

fn default_seed() -> u64 {
    42
}

impl TrainingConfig {
    /// Parse a JSON submission, reporting malformed input as `InvalidConfig`.
    pub fn from_json(json: &str) -> TrainingResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TrainingError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.dataset_id.trim().is_empty() {
            return Err(TrainingError::InvalidConfig("dataset_id is required".to_string()));
        }
        if self.num_layers == 0 {
            return Err(TrainingError::InvalidConfig("num_layers must be >= 1".to_string()));
        }
        if self.num_neurons == 0 {
            return Err(TrainingError::InvalidConfig("num_neurons must be >= 1".to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidConfig("learning_rate must be > 0".to_string()));
        }
        if !self.regularization_rate.is_finite() || self.regularization_rate < 0.0 {
            return Err(TrainingError::InvalidConfig(
                "regularization_rate must be >= 0".to_string(),
            ));
        }
        if self.regularizer == Regularizer::Dropout && self.regularization_rate >= 1.0 {
            return Err(TrainingError::InvalidConfig(
                "dropout rate must be < 1".to_string(),
            ));
        }
        if !self.train_test_split.is_finite()
            || self.train_test_split <= 0.0
            || self.train_test_split >= 1.0
        {
            return Err(TrainingError::InvalidConfig(
                "train_test_split must be strictly between 0 and 1".to_string(),
            ));
        }
        if self.epochs == 0 {
            return Err(TrainingError::InvalidConfig("epochs must be >= 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidConfig("batch_size must be >= 1".to_string()));
        }
        Ok(())
    }

    /// The regularization hook shared by every hidden layer.
    #[must_use]
    pub fn regularization(&self) -> Regularization {
        self.regularizer.hook(self.regularization_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regularizer {
    None,
    L1,
    L2,
    #[serde(rename = "l1_l2")]
    L1L2,
    Dropout,
    BatchNorm,
}

impl Regularizer {
    #[must_use]
    pub fn hook(self, rate: f64) -> Regularization {
        match self {
            Self::None => Regularization::None,
            Self::L1 => Regularization::Penalty { l1: rate, l2: 0.0 },
            Self::L2 => Regularization::Penalty { l1: 0.0, l2: rate },
            Self::L1L2 => Regularization::Penalty { l1: rate, l2: rate },
            Self::Dropout => Regularization::Dropout { rate },
            Self::BatchNorm => Regularization::BatchNorm,
        }
    }
}

/// A resolved regularization mechanism. Weight penalties attach to the dense kernel;
/// dropout and batch normalization become separate post-layer descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regularization {
    None,
    Penalty { l1: f64, l2: f64 },
    Dropout { rate: f64 },
    BatchNorm,
}

impl Regularization {
    #[must_use]
    pub fn penalty(&self) -> Option<(f64, f64)> {
        match self {
            Self::Penalty { l1, l2 } => Some((*l1, *l2)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Adam,
    Sgd,
    Rmsprop,
    Adagrad,
    Adamw,
}

impl OptimizerKind {
    /// Case-insensitive lookup; unrecognized names fall back to Adam.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "adam" => Self::Adam,
            "sgd" => Self::Sgd,
            "rmsprop" => Self::Rmsprop,
            "adagrad" => Self::Adagrad,
            "adamw" => Self::Adamw,
            other => {
                warn!(optimizer = %other, "Unknown optimizer, falling back to adam");
                Self::Adam
            }
        }
    }
}

impl<'de> Deserialize<'de> for OptimizerKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
    Linear,
    Elu,
    Selu,
    Softplus,
    Softsign,
    Swish,
    Gelu,
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Linear => "linear",
            Self::Elu => "elu",
            Self::Selu => "selu",
            Self::Softplus => "softplus",
            Self::Softsign => "softsign",
            Self::Swish => "swish",
            Self::Gelu => "gelu",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
pub(crate) fn sample_config(dataset_id: &str) -> TrainingConfig {
    TrainingConfig {
        dataset_id: dataset_id.to_string(),
        model_type: "mlp".to_string(),
        num_layers: 2,
        num_neurons: 8,
        learning_rate: 0.01,
        regularization_rate: 0.0,
        train_test_split: 0.8,
        regularizer: Regularizer::None,
        optimizer: OptimizerKind::Adam,
        activation: Activation::Relu,
        epochs: 5,
        batch_size: 16,
        seed: 42,
    }
}
