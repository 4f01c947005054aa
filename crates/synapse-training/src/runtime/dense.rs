use super::network::{Matrix, Network};
use super::objective::{Objective, softmax};
use super::optimizer::Optimizer;
use super::{
    CompileOptions, CompiledModel, EpochCallback, EpochControl, EpochLogs, FitParams, History,
    TrainingRuntime,
};
use crate::architecture::Architecture;
use crate::dataset::DatasetSplit;
use crate::error::{TrainingError, TrainingResult};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

/// Built-in CPU runtime for fully connected networks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseRuntime;

impl TrainingRuntime for DenseRuntime {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn compile(
        &self,
        architecture: &Architecture,
        options: &CompileOptions,
    ) -> TrainingResult<Box<dyn CompiledModel>> {
        Ok(Box::new(DenseModel::compile(architecture, options)?))
    }
}

#[derive(Debug, Clone)]
pub struct DenseModel {
    network: Network,
    optimizer: Optimizer,
    objective: Objective,
    rng: StdRng,
}

impl DenseModel {
    pub fn compile(architecture: &Architecture, options: &CompileOptions) -> TrainingResult<Self> {
        if !options.learning_rate.is_finite() || options.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidConfig(format!(
                "learning rate {} is not a positive number",
                options.learning_rate
            )));
        }
        let mut rng = StdRng::seed_from_u64(options.seed);
        let network = Network::from_architecture(architecture, &mut rng);
        let objective = Objective::for_architecture(architecture);
        debug!(
            parameters = architecture.parameter_count(),
            optimizer = ?options.optimizer,
            objective = ?objective,
            "Compiled dense model"
        );
        Ok(Self {
            network,
            optimizer: Optimizer::new(options.optimizer, options.learning_rate),
            objective,
            rng,
        })
    }

    fn check_split(&self, data: &DatasetSplit) -> TrainingResult<()> {
        if data.x_train.is_empty() || data.x_test.is_empty() {
            return Err(TrainingError::Runtime("train and validation splits must be non-empty".to_string()));
        }
        if data.input_width() != self.network.input_width() {
            return Err(TrainingError::Runtime(format!(
                "model expects {} features, data has {}",
                self.network.input_width(),
                data.input_width()
            )));
        }
        let expected = match self.objective {
            Objective::Classification => data.class_count,
            Objective::Regression => 1,
        };
        if expected != self.network.output_width() {
            return Err(TrainingError::Runtime(format!(
                "output layer has {} units but the dataset needs {expected}",
                self.network.output_width()
            )));
        }
        Ok(())
    }

    fn check_rows(&self, rows: &[Vec<f64>]) -> TrainingResult<()> {
        let width = self.network.input_width();
        match rows.iter().position(|r| r.len() != width) {
            Some(i) => Err(TrainingError::InvalidConfig(format!(
                "input row {i} has {} values, expected {width}",
                rows[i].len()
            ))),
            None => Ok(()),
        }
    }

    fn train_epoch(&mut self, data: &DatasetSplit, order: &mut [usize], batch_size: usize) -> (f64, f64) {
        order.shuffle(&mut self.rng);
        let total = order.len() as f64;
        let mut loss = 0.0;
        let mut metric = 0.0;

        for batch in order.chunks(batch_size.max(1)) {
            let x: Matrix = batch.iter().map(|&i| data.x_train[i].clone()).collect();
            let y: Vec<f64> = batch.iter().map(|&i| data.y_train[i]).collect();

            let outputs = self.network.forward_train(x, &mut self.rng);
            let eval = self.objective.evaluate(&outputs, &y);
            self.network.backward(eval.grad);
            self.network.apply_gradients(&mut self.optimizer);

            let weight = batch.len() as f64 / total;
            loss += eval.loss * weight;
            metric += eval.metric * weight;
        }
        (loss + self.network.penalty_loss(), metric)
    }
}

impl CompiledModel for DenseModel {
    fn fit(
        &mut self,
        data: &DatasetSplit,
        params: &FitParams,
        on_epoch: &mut EpochCallback<'_>,
    ) -> TrainingResult<History> {
        self.check_split(data)?;
        let metric_name = self.objective.metric_name();
        let mut order: Vec<usize> = (0..data.x_train.len()).collect();
        let mut history = History::default();

        for epoch in 1..=params.epochs {
            let (loss, metric) = self.train_epoch(data, &mut order, params.batch_size);
            if !loss.is_finite() {
                return Err(TrainingError::Runtime(format!(
                    "loss became non-finite at epoch {epoch}; try a lower learning rate"
                )));
            }

            let val_outputs = self.network.forward_infer(&data.x_test);
            let val = self.objective.evaluate(&val_outputs, &data.y_test);
            let val_loss = val.loss + self.network.penalty_loss();
            if !val_loss.is_finite() {
                return Err(TrainingError::Runtime(format!(
                    "validation loss became non-finite at epoch {epoch}"
                )));
            }

            let mut logs = EpochLogs::new();
            logs.insert("loss", loss);
            logs.insert("val_loss", val_loss);
            logs.insert(metric_name, metric);
            logs.insert(format!("val_{metric_name}"), val.metric);
            history.epochs.push(logs.clone());

            if on_epoch(epoch, &logs) == EpochControl::Stop {
                debug!(epoch, "Training stopped at epoch boundary");
                history.stopped_early = epoch < params.epochs;
                break;
            }
        }
        Ok(history)
    }

    fn predict(&self, rows: &[Vec<f64>]) -> TrainingResult<Vec<Vec<f64>>> {
        self.check_rows(rows)?;
        let outputs = self.network.forward_infer(rows);
        Ok(match self.objective {
            Objective::Classification => outputs.iter().map(|row| softmax(row)).collect(),
            Objective::Regression => outputs,
        })
    }

    fn metric_name(&self) -> &'static str {
        self.objective.metric_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OptimizerKind, Regularizer, TrainingConfig, sample_config};
    use crate::loader::BuiltinResolver;

    fn iris_split() -> DatasetSplit {
        let ds = BuiltinResolver::iris().unwrap();
        DatasetSplit::prepare(&ds, 0.8, 42).unwrap()
    }

    fn compile(config: &TrainingConfig, data: &DatasetSplit) -> Box<dyn CompiledModel> {
        let arch = Architecture::build(data.input_width(), data.output_width(), config).unwrap();
        DenseRuntime.compile(&arch, &CompileOptions::from_config(config)).unwrap()
    }

    #[test]
    fn test_iris_reports_every_epoch_in_order() {
        let data = iris_split();
        let config = sample_config("iris");
        let mut model = compile(&config, &data);

        let mut seen = Vec::new();
        let history = model
            .fit(&data, &FitParams::from_config(&config), &mut |epoch, logs| {
                seen.push((epoch, logs.clone()));
                EpochControl::Continue
            })
            .unwrap();

        assert_eq!(seen.iter().map(|(e, _)| *e).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(history.len(), 5);
        assert!(!history.stopped_early);
        let last = history.last().unwrap();
        for key in ["loss", "val_loss", "accuracy", "val_accuracy"] {
            assert!(last.get(key).is_some(), "missing {key}");
        }
        assert_eq!(model.metric_name(), "accuracy");
    }

    #[test]
    fn test_iris_learns() {
        let data = iris_split();
        let mut config = sample_config("iris");
        config.epochs = 60;
        let mut model = compile(&config, &data);
        let history = model
            .fit(&data, &FitParams::from_config(&config), &mut |_, _| EpochControl::Continue)
            .unwrap();

        let first = history.epochs[0].get("loss").unwrap();
        let last = history.last().unwrap();
        assert!(last.get("loss").unwrap() < first);
        assert!(last.get("val_accuracy").unwrap() > 0.8);
    }

    #[test]
    fn test_stop_ends_training_at_boundary() {
        let data = iris_split();
        let mut config = sample_config("iris");
        config.epochs = 10;
        let mut model = compile(&config, &data);
        let history = model
            .fit(&data, &FitParams::from_config(&config), &mut |epoch, _| {
                if epoch == 3 { EpochControl::Stop } else { EpochControl::Continue }
            })
            .unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.stopped_early);
    }

    #[test]
    fn test_regression_uses_mae_and_single_output() {
        let ds = BuiltinResolver::boston().unwrap();
        let data = DatasetSplit::prepare(&ds, 0.8, 42).unwrap();
        let mut config = sample_config("boston");
        config.epochs = 3;
        config.optimizer = OptimizerKind::Rmsprop;
        config.regularizer = Regularizer::L2;
        config.regularization_rate = 0.001;
        let mut model = compile(&config, &data);

        let history = model
            .fit(&data, &FitParams::from_config(&config), &mut |_, _| EpochControl::Continue)
            .unwrap();
        assert!(history.last().unwrap().get("val_mae").is_some());

        let predictions = model.predict(&data.x_test[..2]).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].len(), 1);
    }

    #[test]
    fn test_every_regularizer_trains() {
        let data = iris_split();
        for regularizer in [
            Regularizer::None,
            Regularizer::L1,
            Regularizer::L2,
            Regularizer::L1L2,
            Regularizer::Dropout,
            Regularizer::BatchNorm,
        ] {
            let mut config = sample_config("iris");
            config.epochs = 2;
            config.regularizer = regularizer;
            config.regularization_rate = 0.01;
            let mut model = compile(&config, &data);
            let history = model
                .fit(&data, &FitParams::from_config(&config), &mut |_, _| EpochControl::Continue)
                .unwrap();
            assert_eq!(history.len(), 2, "{regularizer:?}");
        }
    }

    #[test]
    fn test_predict_returns_probabilities() {
        let data = iris_split();
        let model = compile(&sample_config("iris"), &data);
        let probabilities = model.predict(&data.x_test[..3]).unwrap();
        for row in probabilities {
            assert_eq!(row.len(), 3);
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let data = iris_split();
        let model = compile(&sample_config("iris"), &data);
        assert!(matches!(
            model.predict(&[vec![1.0, 2.0]]),
            Err(TrainingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_divergence_is_runtime_error() {
        let data = iris_split();
        let mut config = sample_config("iris");
        config.optimizer = OptimizerKind::Sgd;
        config.learning_rate = 1e300;
        config.epochs = 3;
        let mut model = compile(&config, &data);
        let err = model
            .fit(&data, &FitParams::from_config(&config), &mut |_, _| EpochControl::Continue)
            .unwrap_err();
        assert!(matches!(err, TrainingError::Runtime(_)));
    }

    #[test]
    fn test_non_finite_validation_loss_is_runtime_error() {
        let ds = BuiltinResolver::boston().unwrap();
        let mut data = DatasetSplit::prepare(&ds, 0.8, 42).unwrap();
        data.y_test[0] = f64::INFINITY;
        let mut config = sample_config("boston");
        config.epochs = 3;
        let mut model = compile(&config, &data);

        let mut epochs_seen = 0;
        let err = model
            .fit(&data, &FitParams::from_config(&config), &mut |_, _| {
                epochs_seen += 1;
                EpochControl::Continue
            })
            .unwrap_err();
        assert!(matches!(err, TrainingError::Runtime(m) if m.contains("validation loss")));
        assert_eq!(epochs_seen, 0);
    }
}
