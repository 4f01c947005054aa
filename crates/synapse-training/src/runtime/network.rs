use super::optimizer::Optimizer;
use crate::architecture::{Architecture, LayerDescriptor, WeightPenalty};
use crate::config::Activation;
use rand::Rng;
use rand::rngs::StdRng;

pub(crate) type Matrix = Vec<Vec<f64>>;

const SELU_LAMBDA: f64 = 1.050_700_987_355_480_5;
const SELU_ALPHA: f64 = 1.673_263_242_354_377_2;
const GELU_COEFF: f64 = 0.044_715;
const BATCH_NORM_MOMENTUM: f64 = 0.99;
const BATCH_NORM_EPSILON: f64 = 1e-3;

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

pub(crate) fn activate(activation: Activation, z: f64) -> f64 {
    match activation {
        Activation::Relu => z.max(0.0),
        Activation::Sigmoid => sigmoid(z),
        Activation::Tanh => z.tanh(),
        Activation::Linear => z,
        Activation::Elu => {
            if z > 0.0 {
                z
            } else {
                z.exp_m1()
            }
        }
        Activation::Selu => {
            if z > 0.0 {
                SELU_LAMBDA * z
            } else {
                SELU_LAMBDA * SELU_ALPHA * z.exp_m1()
            }
        }
        Activation::Softplus => z.max(0.0) + (-z.abs()).exp().ln_1p(),
        Activation::Softsign => z / (1.0 + z.abs()),
        Activation::Swish => z * sigmoid(z),
        Activation::Gelu => {
            let k = (2.0 / std::f64::consts::PI).sqrt();
            0.5 * z * (1.0 + (k * (z + GELU_COEFF * z.powi(3))).tanh())
        }
    }
}

/// d activate(z) / dz
pub(crate) fn derivative(activation: Activation, z: f64) -> f64 {
    match activation {
        Activation::Relu => {
            if z > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Activation::Sigmoid => {
            let s = sigmoid(z);
            s * (1.0 - s)
        }
        Activation::Tanh => 1.0 - z.tanh().powi(2),
        Activation::Linear => 1.0,
        Activation::Elu => {
            if z > 0.0 {
                1.0
            } else {
                z.exp()
            }
        }
        Activation::Selu => {
            if z > 0.0 {
                SELU_LAMBDA
            } else {
                SELU_LAMBDA * SELU_ALPHA * z.exp()
            }
        }
        Activation::Softplus => sigmoid(z),
        Activation::Softsign => 1.0 / (1.0 + z.abs()).powi(2),
        Activation::Swish => {
            let s = sigmoid(z);
            s + z * s * (1.0 - s)
        }
        Activation::Gelu => {
            let k = (2.0 / std::f64::consts::PI).sqrt();
            let t = (k * (z + GELU_COEFF * z.powi(3))).tanh();
            0.5 * (1.0 + t) + 0.5 * z * (1.0 - t * t) * k * (1.0 + 3.0 * GELU_COEFF * z * z)
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Dense {
    inputs: usize,
    units: usize,
    /// `inputs x units`, row-major by input.
    weights: Vec<f64>,
    bias: Vec<f64>,
    /// `None` for the raw output layer.
    activation: Option<Activation>,
    penalty: Option<WeightPenalty>,
    grad_weights: Vec<f64>,
    grad_bias: Vec<f64>,
    cache_input: Matrix,
    cache_pre_activation: Matrix,
}

impl Dense {
    fn new(
        inputs: usize,
        units: usize,
        activation: Option<Activation>,
        penalty: Option<WeightPenalty>,
        rng: &mut StdRng,
    ) -> Self {
        // He-uniform for rectifier-like activations, Glorot-uniform otherwise.
        let fan = match activation {
            Some(Activation::Relu | Activation::Elu | Activation::Swish | Activation::Gelu) => {
                inputs as f64 / 2.0
            }
            _ => (inputs + units) as f64 / 2.0,
        };
        let limit = (3.0 / fan).sqrt();
        let weights = (0..inputs * units).map(|_| rng.gen_range(-limit..limit)).collect();

        Self {
            inputs,
            units,
            weights,
            bias: vec![0.0; units],
            activation,
            penalty,
            grad_weights: vec![0.0; inputs * units],
            grad_bias: vec![0.0; units],
            cache_input: Vec::new(),
            cache_pre_activation: Vec::new(),
        }
    }

    fn linear(&self, x: &[Vec<f64>]) -> Matrix {
        x.iter()
            .map(|row| {
                let mut out = self.bias.clone();
                for (i, v) in row.iter().enumerate() {
                    let w = &self.weights[i * self.units..(i + 1) * self.units];
                    for (o, wv) in out.iter_mut().zip(w) {
                        *o += v * wv;
                    }
                }
                out
            })
            .collect()
    }

    fn activated(&self, z: &Matrix) -> Matrix {
        match self.activation {
            Some(a) => z.iter().map(|row| row.iter().map(|v| activate(a, *v)).collect()).collect(),
            None => z.clone(),
        }
    }

    fn forward_train(&mut self, x: Matrix) -> Matrix {
        let z = self.linear(&x);
        let out = self.activated(&z);
        self.cache_input = x;
        self.cache_pre_activation = z;
        out
    }

    fn backward(&mut self, grad: Matrix) -> Matrix {
        let dz: Matrix = match self.activation {
            Some(a) => grad
                .iter()
                .zip(&self.cache_pre_activation)
                .map(|(g, z)| g.iter().zip(z).map(|(gv, zv)| gv * derivative(a, *zv)).collect())
                .collect(),
            None => grad,
        };

        self.grad_weights.iter_mut().for_each(|g| *g = 0.0);
        self.grad_bias.iter_mut().for_each(|g| *g = 0.0);
        for (x_row, dz_row) in self.cache_input.iter().zip(&dz) {
            for (i, xv) in x_row.iter().enumerate() {
                let gw = &mut self.grad_weights[i * self.units..(i + 1) * self.units];
                for (g, d) in gw.iter_mut().zip(dz_row) {
                    *g += xv * d;
                }
            }
            for (g, d) in self.grad_bias.iter_mut().zip(dz_row) {
                *g += d;
            }
        }
        if let Some(penalty) = self.penalty {
            for (g, w) in self.grad_weights.iter_mut().zip(&self.weights) {
                let sign = if *w == 0.0 { 0.0 } else { w.signum() };
                *g += penalty.l1 * sign + 2.0 * penalty.l2 * w;
            }
        }

        dz.iter()
            .map(|d| {
                (0..self.inputs)
                    .map(|i| {
                        let w = &self.weights[i * self.units..(i + 1) * self.units];
                        w.iter().zip(d).map(|(wv, dv)| wv * dv).sum()
                    })
                    .collect()
            })
            .collect()
    }

    fn penalty_loss(&self) -> f64 {
        self.penalty.map_or(0.0, |p| {
            self.weights.iter().map(|w| p.l1 * w.abs() + p.l2 * w * w).sum()
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Dropout {
    rate: f64,
    mask: Matrix,
}

impl Dropout {
    /// Inverted dropout: surviving activations are scaled by `1 / (1 - rate)`.
    fn forward_train(&mut self, x: Matrix, rng: &mut StdRng) -> Matrix {
        let keep = 1.0 - self.rate;
        self.mask = x
            .iter()
            .map(|row| {
                row.iter()
                    .map(|_| if rng.gen_bool(keep) { 1.0 / keep } else { 0.0 })
                    .collect()
            })
            .collect();
        hadamard(&x, &self.mask)
    }

    fn backward(&self, grad: &Matrix) -> Matrix {
        hadamard(grad, &self.mask)
    }
}

fn hadamard(a: &Matrix, b: &Matrix) -> Matrix {
    a.iter()
        .zip(b)
        .map(|(ra, rb)| ra.iter().zip(rb).map(|(x, y)| x * y).collect())
        .collect()
}

#[derive(Debug, Clone)]
pub(crate) struct BatchNorm {
    gamma: Vec<f64>,
    beta: Vec<f64>,
    moving_mean: Vec<f64>,
    moving_variance: Vec<f64>,
    grad_gamma: Vec<f64>,
    grad_beta: Vec<f64>,
    cache_normalized: Matrix,
    cache_inv_std: Vec<f64>,
}

impl BatchNorm {
    fn new(width: usize) -> Self {
        Self {
            gamma: vec![1.0; width],
            beta: vec![0.0; width],
            moving_mean: vec![0.0; width],
            moving_variance: vec![1.0; width],
            grad_gamma: vec![0.0; width],
            grad_beta: vec![0.0; width],
            cache_normalized: Vec::new(),
            cache_inv_std: Vec::new(),
        }
    }

    fn forward_infer(&self, x: &[Vec<f64>]) -> Matrix {
        x.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, v)| {
                        let inv_std = 1.0 / (self.moving_variance[j] + BATCH_NORM_EPSILON).sqrt();
                        self.gamma[j] * (v - self.moving_mean[j]) * inv_std + self.beta[j]
                    })
                    .collect()
            })
            .collect()
    }

    fn forward_train(&mut self, x: &[Vec<f64>]) -> Matrix {
        let width = self.gamma.len();
        let n = x.len().max(1) as f64;
        let mut mean = vec![0.0; width];
        let mut variance = vec![0.0; width];
        for row in x {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        for row in x {
            for ((s, v), m) in variance.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2) / n;
            }
        }

        for j in 0..width {
            self.moving_mean[j] =
                BATCH_NORM_MOMENTUM * self.moving_mean[j] + (1.0 - BATCH_NORM_MOMENTUM) * mean[j];
            self.moving_variance[j] = BATCH_NORM_MOMENTUM * self.moving_variance[j]
                + (1.0 - BATCH_NORM_MOMENTUM) * variance[j];
        }

        self.cache_inv_std =
            variance.iter().map(|v| 1.0 / (v + BATCH_NORM_EPSILON).sqrt()).collect();
        self.cache_normalized = x
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, v)| (v - mean[j]) * self.cache_inv_std[j])
                    .collect()
            })
            .collect();

        self.cache_normalized
            .iter()
            .map(|row| row.iter().enumerate().map(|(j, h)| self.gamma[j] * h + self.beta[j]).collect())
            .collect()
    }

    fn backward(&mut self, grad: &Matrix) -> Matrix {
        let width = self.gamma.len();
        let n = grad.len().max(1) as f64;
        let mut sum_dh = vec![0.0; width];
        let mut sum_dh_h = vec![0.0; width];
        self.grad_gamma = vec![0.0; width];
        self.grad_beta = vec![0.0; width];

        for (g_row, h_row) in grad.iter().zip(&self.cache_normalized) {
            for j in 0..width {
                let dh = g_row[j] * self.gamma[j];
                sum_dh[j] += dh;
                sum_dh_h[j] += dh * h_row[j];
                self.grad_gamma[j] += g_row[j] * h_row[j];
                self.grad_beta[j] += g_row[j];
            }
        }

        grad.iter()
            .zip(&self.cache_normalized)
            .map(|(g_row, h_row)| {
                (0..width)
                    .map(|j| {
                        let dh = g_row[j] * self.gamma[j];
                        self.cache_inv_std[j] / n * (n * dh - sum_dh[j] - h_row[j] * sum_dh_h[j])
                    })
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Layer {
    Dense(Dense),
    Dropout(Dropout),
    BatchNorm(BatchNorm),
}

/// Trainable weights for an [`Architecture`], evaluated on row-major mini-batches.
#[derive(Debug, Clone)]
pub(crate) struct Network {
    input_width: usize,
    output_width: usize,
    layers: Vec<Layer>,
}

impl Network {
    pub(crate) fn from_architecture(architecture: &Architecture, rng: &mut StdRng) -> Self {
        let mut width = architecture.input_width;
        let mut layers = Vec::with_capacity(architecture.layers.len());

        for descriptor in &architecture.layers {
            let layer = match descriptor {
                LayerDescriptor::Dense { units, activation, penalty } => {
                    let dense = Dense::new(width, *units, Some(*activation), *penalty, rng);
                    width = *units;
                    Layer::Dense(dense)
                }
                LayerDescriptor::Output { units, .. } => {
                    let dense = Dense::new(width, *units, None, None, rng);
                    width = *units;
                    Layer::Dense(dense)
                }
                LayerDescriptor::Dropout { rate } => {
                    Layer::Dropout(Dropout { rate: *rate, mask: Vec::new() })
                }
                LayerDescriptor::BatchNorm => Layer::BatchNorm(BatchNorm::new(width)),
            };
            layers.push(layer);
        }

        Self { input_width: architecture.input_width, output_width: width, layers }
    }

    pub(crate) fn input_width(&self) -> usize {
        self.input_width
    }

    pub(crate) fn output_width(&self) -> usize {
        self.output_width
    }

    pub(crate) fn forward_train(&mut self, x: Matrix, rng: &mut StdRng) -> Matrix {
        self.layers.iter_mut().fold(x, |acc, layer| match layer {
            Layer::Dense(dense) => dense.forward_train(acc),
            Layer::Dropout(dropout) => dropout.forward_train(acc, rng),
            Layer::BatchNorm(norm) => norm.forward_train(&acc),
        })
    }

    pub(crate) fn forward_infer(&self, x: &[Vec<f64>]) -> Matrix {
        self.layers.iter().fold(x.to_vec(), |acc, layer| match layer {
            Layer::Dense(dense) => dense.activated(&dense.linear(&acc)),
            Layer::Dropout(_) => acc,
            Layer::BatchNorm(norm) => norm.forward_infer(&acc),
        })
    }

    pub(crate) fn backward(&mut self, grad: Matrix) {
        self.layers.iter_mut().rev().fold(grad, |acc, layer| match layer {
            Layer::Dense(dense) => dense.backward(acc),
            Layer::Dropout(dropout) => dropout.backward(&acc),
            Layer::BatchNorm(norm) => norm.backward(&acc),
        });
    }

    /// One optimizer step over every trainable tensor, in a fixed slot order.
    pub(crate) fn apply_gradients(&mut self, optimizer: &mut Optimizer) {
        optimizer.begin_step();
        let mut slot = 0;
        for layer in &mut self.layers {
            match layer {
                Layer::Dense(dense) => {
                    optimizer.apply(slot, &mut dense.weights, &dense.grad_weights, true);
                    optimizer.apply(slot + 1, &mut dense.bias, &dense.grad_bias, false);
                    slot += 2;
                }
                Layer::BatchNorm(norm) => {
                    optimizer.apply(slot, &mut norm.gamma, &norm.grad_gamma, false);
                    optimizer.apply(slot + 1, &mut norm.beta, &norm.grad_beta, false);
                    slot += 2;
                }
                Layer::Dropout(_) => {}
            }
        }
    }

    /// Sum of kernel penalties, added to the reported loss.
    pub(crate) fn penalty_loss(&self) -> f64 {
        self.layers
            .iter()
            .map(|layer| match layer {
                Layer::Dense(dense) => dense.penalty_loss(),
                _ => 0.0,
            })
            .sum()
    }
}
