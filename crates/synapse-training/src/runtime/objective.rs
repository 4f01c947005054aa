use super::network::Matrix;
use crate::architecture::Architecture;

/// Loss and secondary metric pairing, fixed at compile time from the output layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Mean squared error, reported with mean absolute error.
    Regression,
    /// Categorical cross-entropy over softmax, reported with accuracy.
    Classification,
}

/// Batch-mean loss and metric, plus the loss gradient w.r.t. the raw outputs.
#[derive(Debug, Clone)]
pub(crate) struct Evaluation {
    pub loss: f64,
    pub metric: f64,
    pub grad: Matrix,
}

impl Objective {
    /// Softmax outputs train as classification, a linear output as regression.
    #[must_use]
    pub fn for_architecture(architecture: &Architecture) -> Self {
        if architecture.is_classification() {
            Self::Classification
        } else {
            Self::Regression
        }
    }

    #[must_use]
    pub fn metric_name(self) -> &'static str {
        match self {
            Self::Regression => "mae",
            Self::Classification => "accuracy",
        }
    }

    /// `outputs` are raw output-layer values (logits for classification).
    pub(crate) fn evaluate(self, outputs: &[Vec<f64>], targets: &[f64]) -> Evaluation {
        let n = outputs.len().max(1) as f64;
        let mut loss = 0.0;
        let mut metric = 0.0;
        let mut grad = Vec::with_capacity(outputs.len());

        match self {
            Self::Regression => {
                for (row, target) in outputs.iter().zip(targets) {
                    let prediction = row.first().copied().unwrap_or_default();
                    let diff = prediction - target;
                    loss += diff * diff;
                    metric += diff.abs();
                    grad.push(vec![2.0 * diff / n]);
                }
            }
            Self::Classification => {
                for (row, target) in outputs.iter().zip(targets) {
                    let class = *target as usize;
                    let log_probabilities = log_softmax(row);
                    // Non-finite logits propagate into the loss.
                    loss -= log_probabilities.get(class).copied().unwrap_or(f64::NAN);
                    let probabilities: Vec<f64> = log_probabilities.iter().map(|l| l.exp()).collect();
                    if argmax(&probabilities) == class {
                        metric += 1.0;
                    }
                    grad.push(
                        probabilities
                            .iter()
                            .enumerate()
                            .map(|(k, q)| (q - if k == class { 1.0 } else { 0.0 }) / n)
                            .collect(),
                    );
                }
            }
        }

        Evaluation { loss: loss / n, metric: metric / n, grad }
    }
}

fn log_softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let log_sum = logits.iter().map(|z| (z - max).exp()).sum::<f64>().ln() + max;
    logits.iter().map(|z| z - log_sum).collect()
}

pub(crate) fn softmax(logits: &[f64]) -> Vec<f64> {
    log_softmax(logits).into_iter().map(f64::exp).collect()
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i)
}
