use super::{DatasetResolver, read_csv_table};
use crate::dataset::Dataset;
use crate::error::TrainingResult;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const IRIS_CSV: &str = include_str!("../../data/iris.csv");

const SYNTHETIC_HOUSING_NAME: &str = "boston-synthetic";
const HOUSING_ROWS: usize = 506;
const HOUSING_SEED: u64 = 506;
const HOUSING_FEATURES: [&str; 13] = [
    "crim", "zn", "indus", "chas", "nox", "rm", "age", "dis", "rad", "tax", "ptratio", "b",
    "lstat",
];

/// Named reference datasets that need no external storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinResolver;

impl BuiltinResolver {
    pub const NAMES: [&'static str; 2] = ["iris", "boston"];

    pub fn iris() -> TrainingResult<Dataset> {
        read_csv_table(IRIS_CSV.as_bytes())?.into_dataset("iris")
    }

    /// Synthetic housing-price regression with a fixed seed, so every call is identical.
    ///
    /// Served under the `boston` identifier but named `boston-synthetic`: the rows follow
    /// the classic housing columns and value ranges, not a real survey.
    pub fn boston() -> TrainingResult<Dataset> {
        let mut rng = StdRng::seed_from_u64(HOUSING_SEED);
        let mut features = Vec::with_capacity(HOUSING_ROWS);
        let mut targets = Vec::with_capacity(HOUSING_ROWS);

        for _ in 0..HOUSING_ROWS {
            let crim: f64 = rng.gen_range(0.0..10.0);
            let zn: f64 = rng.gen_range(0.0..100.0);
            let indus: f64 = rng.gen_range(0.5..28.0);
            let chas = if rng.gen_bool(0.07) { 1.0 } else { 0.0 };
            let nox: f64 = rng.gen_range(0.38..0.87);
            let rm: f64 = rng.gen_range(3.5..8.8);
            let age: f64 = rng.gen_range(3.0..100.0);
            let dis: f64 = rng.gen_range(1.1..12.0);
            let rad = f64::from(rng.gen_range(1_u8..=24));
            let tax: f64 = rng.gen_range(187.0..711.0);
            let ptratio: f64 = rng.gen_range(12.6..22.0);
            let b: f64 = rng.gen_range(0.3..396.9);
            let lstat: f64 = rng.gen_range(1.7..38.0);
            let noise: f64 = rng.gen_range(-2.5..2.5);

            let price = 22.0 + 5.5 * (rm - 6.3) - 0.55 * (lstat - 12.6) - 0.1 * crim
                - 0.9 * (ptratio - 18.5)
                - 8.0 * (nox - 0.55)
                + 2.5 * chas
                - 0.6 * (dis - 3.8)
                + 0.01 * zn
                + noise;

            features.push(vec![crim, zn, indus, chas, nox, rm, age, dis, rad, tax, ptratio, b, lstat]);
            targets.push(price.clamp(5.0, 50.0));
        }

        let names = HOUSING_FEATURES.iter().map(|n| (*n).to_string()).collect();
        Dataset::with_class_count(SYNTHETIC_HOUSING_NAME, names, features, targets, 1)
    }
}

#[async_trait]
impl DatasetResolver for BuiltinResolver {
    fn name(&self) -> &'static str {
        "builtin"
    }

    async fn resolve(&self, dataset_id: &str) -> TrainingResult<Option<Dataset>> {
        match dataset_id {
            "iris" => Self::iris().map(Some),
            "boston" => Self::boston().map(Some),
            _ => Ok(None),
        }
    }
}
