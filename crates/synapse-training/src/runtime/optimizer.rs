use crate::config::OptimizerKind;

const BETA_1: f64 = 0.9;
const BETA_2: f64 = 0.999;
const RHO: f64 = 0.9;
const EPSILON: f64 = 1e-7;
const ADAGRAD_INITIAL_ACCUMULATOR: f64 = 0.1;
const ADAMW_WEIGHT_DECAY: f64 = 0.004;

#[derive(Debug, Clone, Default)]
struct Slot {
    first: Vec<f64>,
    second: Vec<f64>,
}

/// Gradient-descent update rules with per-tensor state.
///
/// Each parameter tensor owns a slot index that must stay stable across steps.
#[derive(Debug, Clone)]
pub(crate) struct Optimizer {
    kind: OptimizerKind,
    learning_rate: f64,
    step: i32,
    slots: Vec<Slot>,
}

impl Optimizer {
    pub(crate) fn new(kind: OptimizerKind, learning_rate: f64) -> Self {
        Self { kind, learning_rate, step: 0, slots: Vec::new() }
    }

    /// Advance the step counter once per mini-batch, before any `apply`.
    pub(crate) fn begin_step(&mut self) {
        self.step = self.step.saturating_add(1);
    }

    /// Update `params` in place. `decay` marks kernels subject to decoupled weight decay.
    pub(crate) fn apply(&mut self, slot: usize, params: &mut [f64], grads: &[f64], decay: bool) {
        let kind = self.kind;
        let lr = self.learning_rate;
        let t = self.step.max(1);

        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, Slot::default);
        }
        let state = &mut self.slots[slot];
        if state.first.len() != params.len() {
            let initial = if kind == OptimizerKind::Adagrad { ADAGRAD_INITIAL_ACCUMULATOR } else { 0.0 };
            state.first = vec![0.0; params.len()];
            state.second = vec![initial; params.len()];
        }

        match kind {
            OptimizerKind::Sgd => {
                for (p, g) in params.iter_mut().zip(grads) {
                    *p -= lr * g;
                }
            }
            OptimizerKind::Adam | OptimizerKind::Adamw => {
                let bias_1 = 1.0 - BETA_1.powi(t);
                let bias_2 = 1.0 - BETA_2.powi(t);
                let decoupled = kind == OptimizerKind::Adamw && decay;
                for (i, (p, g)) in params.iter_mut().zip(grads).enumerate() {
                    if decoupled {
                        *p -= lr * ADAMW_WEIGHT_DECAY * *p;
                    }
                    let m = &mut state.first[i];
                    let v = &mut state.second[i];
                    *m = BETA_1 * *m + (1.0 - BETA_1) * g;
                    *v = BETA_2 * *v + (1.0 - BETA_2) * g * g;
                    let m_hat = *m / bias_1;
                    let v_hat = *v / bias_2;
                    *p -= lr * m_hat / (v_hat.sqrt() + EPSILON);
                }
            }
            OptimizerKind::Rmsprop => {
                for (i, (p, g)) in params.iter_mut().zip(grads).enumerate() {
                    let v = &mut state.second[i];
                    *v = RHO * *v + (1.0 - RHO) * g * g;
                    *p -= lr * g / (v.sqrt() + EPSILON);
                }
            }
            OptimizerKind::Adagrad => {
                for (i, (p, g)) in params.iter_mut().zip(grads).enumerate() {
                    let v = &mut state.second[i];
                    *v += g * g;
                    *p -= lr * g / (v.sqrt() + EPSILON);
                }
            }
        }
    }
}
