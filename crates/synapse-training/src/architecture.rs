//! Model builder: turns a `TrainingConfig` into an immutable layer description.
//!
//! This is the single place where architecture shape is decided. The runtime compiles
//! whatever it is handed; the orchestrator never re-derives widths or activations.

use crate::config::{Activation, Regularization, TrainingConfig};
use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Kernel penalty attached to a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightPenalty {
    pub l1: f64,
    pub l2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputActivation {
    /// Raw linear output (regression).
    Linear,
    /// Normalized class probabilities.
    Softmax,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerDescriptor {
    Dense {
        units: usize,
        activation: Activation,
        #[serde(skip_serializing_if = "Option::is_none")]
        penalty: Option<WeightPenalty>,
    },
    Dropout {
        rate: f64,
    },
    BatchNorm,
    Output {
        units: usize,
        activation: OutputActivation,
    },
}

impl LayerDescriptor {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Dense { .. } | Self::Output { .. } => "Dense",
            Self::Dropout { .. } => "Dropout",
            Self::BatchNorm => "BatchNormalization",
        }
    }
}

/// Ordered layer sequence for a feed-forward network, independent of trained weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    pub input_width: usize,
    pub layers: Vec<LayerDescriptor>,
}

impl Architecture {
    /// Derive the architecture for `config`.
    ///
    /// Emits `num_layers` hidden dense layers of `num_neurons` units sharing one
    /// regularization hook. Dropout and batch normalization are inserted as post-layer
    /// descriptors after every hidden layer instead of a kernel penalty. The output layer
    /// is linear with one unit when `output_width == 1`, softmax with `output_width`
    /// units otherwise.
    pub fn build(
        input_width: usize,
        output_width: usize,
        config: &TrainingConfig,
    ) -> TrainingResult<Self> {
        if config.num_layers == 0 {
            return Err(TrainingError::InvalidConfig("num_layers must be >= 1".to_string()));
        }
        if config.num_neurons == 0 {
            return Err(TrainingError::InvalidConfig("num_neurons must be >= 1".to_string()));
        }
        if input_width == 0 {
            return Err(TrainingError::InvalidConfig("input width must be >= 1".to_string()));
        }
        if output_width == 0 {
            return Err(TrainingError::InvalidConfig("output width must be >= 1".to_string()));
        }

        let regularization = config.regularization();
        let penalty = regularization.penalty().map(|(l1, l2)| WeightPenalty { l1, l2 });
        let post_layer = match regularization {
            Regularization::Dropout { rate } => Some(LayerDescriptor::Dropout { rate }),
            Regularization::BatchNorm => Some(LayerDescriptor::BatchNorm),
            Regularization::None | Regularization::Penalty { .. } => None,
        };

        let mut layers = Vec::new();
        for _ in 0..config.num_layers {
            layers.push(LayerDescriptor::Dense {
                units: config.num_neurons as usize,
                activation: config.activation,
                penalty,
            });
            if let Some(extra) = &post_layer {
                layers.push(extra.clone());
            }
        }

        let activation = if output_width == 1 {
            OutputActivation::Linear
        } else {
            OutputActivation::Softmax
        };
        layers.push(LayerDescriptor::Output { units: output_width, activation });

        Ok(Self { input_width, layers })
    }

    #[must_use]
    pub fn hidden_layer_count(&self) -> usize {
        self.layers.iter().filter(|l| matches!(l, LayerDescriptor::Dense { .. })).count()
    }

    #[must_use]
    pub fn output_width(&self) -> usize {
        match self.layers.last() {
            Some(LayerDescriptor::Output { units, .. }) => *units,
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_classification(&self) -> bool {
        matches!(
            self.layers.last(),
            Some(LayerDescriptor::Output { activation: OutputActivation::Softmax, .. })
        )
    }

    /// Per-layer `(output width, parameter count)`, following the layer order.
    #[must_use]
    pub fn layer_shapes(&self) -> Vec<(usize, usize)> {
        let mut width = self.input_width;
        self.layers
            .iter()
            .map(|layer| match layer {
                LayerDescriptor::Dense { units, .. } | LayerDescriptor::Output { units, .. } => {
                    let params = width * units + units;
                    width = *units;
                    (width, params)
                }
                LayerDescriptor::Dropout { .. } => (width, 0),
                // gamma, beta, moving mean, moving variance
                LayerDescriptor::BatchNorm => (width, 4 * width),
            })
            .collect()
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layer_shapes().iter().map(|(_, p)| p).sum()
    }

    /// Human-readable table of layers, output shapes and parameter counts.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let rule = "_".repeat(64);
        let _ = writeln!(out, "Model: \"sequential\"");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{:<32}{:<20}{:>12}", "Layer (type)", "Output Shape", "Param #");
        let _ = writeln!(out, "{}", "=".repeat(64));

        let mut counters = std::collections::HashMap::<&str, usize>::new();
        for (layer, (width, params)) in self.layers.iter().zip(self.layer_shapes()) {
            let type_name = layer.type_name();
            let base = match layer {
                LayerDescriptor::Dense { .. } | LayerDescriptor::Output { .. } => "dense",
                LayerDescriptor::Dropout { .. } => "dropout",
                LayerDescriptor::BatchNorm => "batch_normalization",
            };
            let n = counters.entry(base).or_insert(0);
            let name = if *n == 0 { base.to_string() } else { format!("{base}_{n}") };
            *n += 1;

            let _ = writeln!(
                out,
                "{:<32}{:<20}{:>12}",
                format!("{name} ({type_name})"),
                format!("(None, {width})"),
                params
            );
        }
        let _ = writeln!(out, "{}", "=".repeat(64));
        let _ = writeln!(out, "Total params: {}", self.parameter_count());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Regularizer, sample_config};

    #[test]
    fn test_iris_shape() {
        let config = sample_config("iris");
        let arch = Architecture::build(4, 3, &config).unwrap();

        assert_eq!(arch.hidden_layer_count(), 2);
        assert_eq!(arch.output_width(), 3);
        assert!(arch.is_classification());
        assert_eq!(
            arch.layers[0],
            LayerDescriptor::Dense { units: 8, activation: Activation::Relu, penalty: None }
        );
        assert_eq!(
            arch.layers[2],
            LayerDescriptor::Output { units: 3, activation: OutputActivation::Softmax }
        );
        // 4*8+8 + 8*8+8 + 8*3+3
        assert_eq!(arch.parameter_count(), 40 + 72 + 27);
    }

    #[test]
    fn test_regression_output_is_linear_single_unit() {
        let arch = Architecture::build(13, 1, &sample_config("boston")).unwrap();
        assert_eq!(arch.output_width(), 1);
        assert!(!arch.is_classification());
    }

    #[test]
    fn test_dropout_inserts_post_layer_without_penalty() {
        let mut config = sample_config("iris");
        config.num_layers = 3;
        config.regularizer = Regularizer::Dropout;
        config.regularization_rate = 0.25;
        let arch = Architecture::build(4, 3, &config).unwrap();

        assert_eq!(arch.hidden_layer_count(), 3);
        assert_eq!(arch.layers.len(), 3 * 2 + 1);
        assert_eq!(arch.layers[1], LayerDescriptor::Dropout { rate: 0.25 });
        assert!(arch.layers.iter().all(|l| !matches!(
            l,
            LayerDescriptor::Dense { penalty: Some(_), .. }
        )));
    }

    #[test]
    fn test_penalty_is_shared_by_every_hidden_layer() {
        let mut config = sample_config("iris");
        config.regularizer = Regularizer::L2;
        config.regularization_rate = 0.01;
        let arch = Architecture::build(4, 3, &config).unwrap();
        let penalties: Vec<_> = arch
            .layers
            .iter()
            .filter_map(|l| match l {
                LayerDescriptor::Dense { penalty, .. } => Some(*penalty),
                _ => None,
            })
            .collect();
        assert_eq!(penalties, vec![Some(WeightPenalty { l1: 0.0, l2: 0.01 }); 2]);
    }

    #[test]
    fn test_batch_norm_parameter_count() {
        let mut config = sample_config("iris");
        config.num_layers = 1;
        config.regularizer = Regularizer::BatchNorm;
        let arch = Architecture::build(4, 1, &config).unwrap();
        assert_eq!(arch.layers[1], LayerDescriptor::BatchNorm);
        assert_eq!(arch.parameter_count(), 40 + 32 + 9);
    }

    #[test]
    fn test_zero_layers_is_invalid() {
        let mut config = sample_config("iris");
        config.num_layers = 0;
        assert!(matches!(
            Architecture::build(4, 3, &config),
            Err(TrainingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_summary_lists_every_layer() {
        let arch = Architecture::build(4, 3, &sample_config("iris")).unwrap();
        let summary = arch.summary();
        assert!(summary.contains("dense (Dense)"));
        assert!(summary.contains("dense_2 (Dense)"));
        assert!(summary.contains("Total params: 139"));
    }
}
