use crate::error::{TrainingError, TrainingResult};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Targets with fewer distinct values than this are treated as class labels.
pub const CLASSIFICATION_THRESHOLD: usize = 20;

/// Bookkeeping columns dropped from tabular sources before features are extracted.
pub const METADATA_COLUMNS: [&str; 3] = ["id", "dataset_id", "created_at"];

/// Feature matrix, target vector and class-count for one dataset.
///
/// `class_count == 1` means regression; anything larger is the number of classes,
/// and targets are then class indices in `0..class_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub class_count: usize,
}

impl Dataset {
    /// Build a dataset, inferring the class-count from the distinct target values.
    pub fn from_rows(
        name: impl Into<String>,
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        targets: Vec<f64>,
    ) -> TrainingResult<Self> {
        let classes = distinct_targets(&targets);
        if classes.len() < CLASSIFICATION_THRESHOLD {
            let targets = encode_classes(&targets, &classes);
            Self::with_class_count(name, feature_names, features, targets, classes.len())
        } else {
            Self::with_class_count(name, feature_names, features, targets, 1)
        }
    }

    /// Build a dataset with an explicit class-count (used by built-in references).
    pub fn with_class_count(
        name: impl Into<String>,
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        targets: Vec<f64>,
        class_count: usize,
    ) -> TrainingResult<Self> {
        let name = name.into();
        if features.is_empty() {
            return Err(TrainingError::DatasetFormat(format!("dataset '{name}' has no rows")));
        }
        if features.len() != targets.len() {
            return Err(TrainingError::DatasetFormat(format!(
                "dataset '{name}' has {} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        let width = feature_names.len();
        if width == 0 {
            return Err(TrainingError::DatasetFormat(format!("dataset '{name}' has no feature columns")));
        }
        if let Some(idx) = features.iter().position(|row| row.len() != width) {
            return Err(TrainingError::DatasetFormat(format!(
                "row {idx} of dataset '{name}' has {} values, expected {width}",
                features[idx].len()
            )));
        }
        if class_count == 0 {
            return Err(TrainingError::DatasetFormat(format!("dataset '{name}' has no targets")));
        }
        Ok(Self { name, feature_names, features, targets, class_count })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    #[must_use]
    pub fn is_classification(&self) -> bool {
        self.class_count > 1
    }
}

fn distinct_targets(targets: &[f64]) -> Vec<f64> {
    let mut values: Vec<f64> = targets.to_vec();
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}

fn encode_classes(targets: &[f64], classes: &[f64]) -> Vec<f64> {
    targets
        .iter()
        .map(|t| classes.iter().position(|c| c == t).unwrap_or_default() as f64)
        .collect()
}

/// Raw tabular data as delivered by a dataset source, before typing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Drop metadata columns, take the last column as target and the rest as features.
    ///
    /// Non-numeric targets are label-encoded in sorted order.
    pub fn into_dataset(self, name: &str) -> TrainingResult<Dataset> {
        let keep: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !METADATA_COLUMNS.contains(&c.as_str()))
            .map(|(i, _)| i)
            .collect();

        if keep.len() < 2 {
            return Err(TrainingError::DatasetFormat(
                "dataset must have at least 2 columns (features + target)".to_string(),
            ));
        }
        if self.rows.is_empty() {
            return Err(TrainingError::DatasetFormat(format!("dataset '{name}' has no rows")));
        }

        let (target_col, feature_cols) = keep.split_last().ok_or_else(|| {
            TrainingError::DatasetFormat("dataset has no target column".to_string())
        })?;
        let feature_names = feature_cols.iter().map(|&i| self.columns[i].clone()).collect();

        let mut features = Vec::with_capacity(self.rows.len());
        let mut raw_targets = Vec::with_capacity(self.rows.len());
        for (r, row) in self.rows.iter().enumerate() {
            let mut values = Vec::with_capacity(feature_cols.len());
            for &c in feature_cols {
                let cell = row.get(c).map_or("", String::as_str).trim();
                let value = cell.parse::<f64>().map_err(|_| {
                    TrainingError::DatasetFormat(format!(
                        "row {r}, column '{}': '{cell}' is not numeric",
                        self.columns[c]
                    ))
                })?;
                values.push(value);
            }
            features.push(values);
            raw_targets.push(row.get(*target_col).map_or("", String::as_str).trim().to_string());
        }

        let numeric: Option<Vec<f64>> =
            raw_targets.iter().map(|t| t.parse::<f64>().ok()).collect();
        let targets = match numeric {
            Some(values) => values,
            None => {
                let labels: BTreeSet<&str> = raw_targets.iter().map(String::as_str).collect();
                let labels: Vec<&str> = labels.into_iter().collect();
                raw_targets
                    .iter()
                    .map(|t| labels.iter().position(|l| *l == t.as_str()).unwrap_or_default() as f64)
                    .collect()
            }
        };

        Dataset::from_rows(name, feature_names, features, targets)
    }
}

/// Per-column standardization fitted during data preparation and reused at prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    #[must_use]
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; width];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut scales = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2) / n;
            }
        }
        // Constant columns are centred but not scaled.
        for s in &mut scales {
            *s = if *s > f64::EPSILON { s.sqrt() } else { 1.0 };
        }
        Self { means, scales }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> TrainingResult<Vec<Vec<f64>>> {
        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                if row.len() != self.width() {
                    return Err(TrainingError::InvalidConfig(format!(
                        "input row {i} has {} values, expected {}",
                        row.len(),
                        self.width()
                    )));
                }
                Ok(row
                    .iter()
                    .zip(self.means.iter().zip(&self.scales))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect())
            })
            .collect()
    }
}

/// Scaled train/held-out partition of a dataset. Never mutated after the split.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit {
    pub x_train: Vec<Vec<f64>>,
    pub y_train: Vec<f64>,
    pub x_test: Vec<Vec<f64>>,
    pub y_test: Vec<f64>,
    pub scaler: StandardScaler,
    pub class_count: usize,
}

impl DatasetSplit {
    /// Fit the scaler on the full matrix, then shuffle deterministically and split.
    ///
    /// `train_fraction` is the share of rows kept for training; the held-out side gets
    /// `ceil((1 - train_fraction) * n)` rows.
    pub fn prepare(dataset: &Dataset, train_fraction: f64, seed: u64) -> TrainingResult<Self> {
        let n = dataset.len();
        let n_test = ((1.0 - train_fraction) * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(TrainingError::InvalidConfig(format!(
                "train_test_split {train_fraction} leaves an empty partition for {n} rows"
            )));
        }

        let scaler = StandardScaler::fit(&dataset.features);
        let scaled = scaler.transform(&dataset.features)?;

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        let (test_idx, train_idx) = order.split_at(n_test);

        let pick_x = |idx: &[usize]| idx.iter().map(|&i| scaled[i].clone()).collect();
        let pick_y = |idx: &[usize]| idx.iter().map(|&i| dataset.targets[i]).collect();

        Ok(Self {
            x_train: pick_x(train_idx),
            y_train: pick_y(train_idx),
            x_test: pick_x(test_idx),
            y_test: pick_y(test_idx),
            scaler,
            class_count: dataset.class_count,
        })
    }

    #[must_use]
    pub fn input_width(&self) -> usize {
        self.scaler.width()
    }

    #[must_use]
    pub fn output_width(&self) -> usize {
        self.class_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows: rows.iter().map(|r| r.iter().map(|v| (*v).to_string()).collect()).collect(),
        }
    }

    #[test]
    fn test_class_count_below_threshold_is_classification() {
        let features = (0_i32..30).map(|i| vec![f64::from(i)]).collect();
        let targets = (0_i32..30).map(|i| f64::from(i % 4) * 10.0).collect();
        let ds = Dataset::from_rows("t", vec!["x".into()], features, targets).unwrap();
        assert_eq!(ds.class_count, 4);
        // Labels are re-indexed to 0..class_count.
        assert!(ds.targets.iter().all(|t| (0.0..4.0).contains(t)));
    }

    #[test]
    fn test_class_count_at_threshold_is_regression() {
        let features = (0_i32..40).map(|i| vec![f64::from(i)]).collect();
        let targets: Vec<f64> = (0_i32..40).map(|i| f64::from(i % 20)).collect();
        let ds = Dataset::from_rows("t", vec!["x".into()], features, targets.clone()).unwrap();
        assert_eq!(ds.class_count, 1);
        assert_eq!(ds.targets, targets);
    }

    #[test]
    fn test_table_drops_metadata_and_encodes_labels() {
        let t = table(
            &["id", "dataset_id", "a", "b", "label", "created_at"],
            &[
                &["1", "d", "1.0", "2.0", "cat", "2024-01-01"],
                &["2", "d", "3.0", "4.0", "dog", "2024-01-01"],
                &["3", "d", "5.0", "6.0", "cat", "2024-01-01"],
            ],
        );
        let ds = t.into_dataset("pets").unwrap();
        assert_eq!(ds.feature_names, vec!["a", "b"]);
        assert_eq!(ds.features[1], vec![3.0, 4.0]);
        assert_eq!(ds.targets, vec![0.0, 1.0, 0.0]);
        assert_eq!(ds.class_count, 2);
    }

    #[test]
    fn test_table_with_single_column_is_format_error() {
        let t = table(&["id", "value"], &[&["1", "2.0"]]);
        assert!(matches!(t.into_dataset("x"), Err(TrainingError::DatasetFormat(_))));
    }

    #[test]
    fn test_table_rejects_non_numeric_feature() {
        let t = table(&["a", "y"], &[&["abc", "1"]]);
        assert!(matches!(t.into_dataset("x"), Err(TrainingError::DatasetFormat(_))));
    }

    #[test]
    fn test_scaler_standardizes_columns() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows);
        let scaled = scaler.transform(&rows).unwrap();
        assert!((scaled[0][0] + 1.0).abs() < 1e-12);
        assert!((scaled[1][0] - 1.0).abs() < 1e-12);
        assert_eq!(scaled[0][1], 0.0);
        assert!(scaler.transform(&[vec![1.0]]).is_err());
    }

    #[test]
    fn test_split_is_deterministic_and_sized() {
        let features: Vec<Vec<f64>> = (0_i32..10).map(|i| vec![f64::from(i)]).collect();
        let targets: Vec<f64> = (0_i32..10).map(f64::from).collect();
        let ds = Dataset::with_class_count("r", vec!["x".into()], features, targets, 1).unwrap();

        let a = DatasetSplit::prepare(&ds, 0.8, 42).unwrap();
        let b = DatasetSplit::prepare(&ds, 0.8, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.x_train.len(), 8);
        assert_eq!(a.x_test.len(), 2);
        assert_eq!(a.input_width(), 1);
    }

    #[test]
    fn test_split_rejects_empty_partition() {
        let ds = Dataset::with_class_count("r", vec!["x".into()], vec![vec![1.0]], vec![1.0], 1)
            .unwrap();
        assert!(DatasetSplit::prepare(&ds, 0.5, 42).is_err());
    }
}
