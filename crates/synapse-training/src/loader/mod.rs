//! Tiered dataset resolution.
//!
//! A [`DatasetLoader`] holds an ordered list of [`DatasetResolver`] strategies. Each
//! resolver answers present or absent for an identifier; the first present result wins.
//! A failing tier (unreachable backend, malformed rows) is logged and skipped. Its error
//! surfaces only when no later tier has the dataset.

mod builtin;
mod local;
mod remote;

pub use builtin::BuiltinResolver;
pub use local::LocalFileResolver;
pub use remote::{DEFAULT_PROBE_TABLES, RemoteStoreConfig, RemoteStoreResolver};

use crate::dataset::{Dataset, Table};
use crate::error::{TrainingError, TrainingResult};
use async_trait::async_trait;
use std::fmt;
use std::io::Read;
use tracing::{debug, info, warn};

/// One tier of dataset resolution.
#[async_trait]
pub trait DatasetResolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Resolve `dataset_id`, returning `Ok(None)` when this tier does not know it.
    async fn resolve(&self, dataset_id: &str) -> TrainingResult<Option<Dataset>>;
}

/// Ordered, stateless collection of resolvers.
pub struct DatasetLoader {
    resolvers: Vec<Box<dyn DatasetResolver>>,
}

impl fmt::Debug for DatasetLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.resolvers.iter().map(|r| r.name()).collect();
        f.debug_struct("DatasetLoader").field("resolvers", &names).finish()
    }
}

impl DatasetLoader {
    #[must_use]
    pub fn new(resolvers: Vec<Box<dyn DatasetResolver>>) -> Self {
        Self { resolvers }
    }

    /// Standard tier order: remote store (when configured), built-ins, local files.
    #[must_use]
    pub fn standard(
        remote: Option<RemoteStoreConfig>,
        local_dir: impl Into<std::path::PathBuf>,
    ) -> Self {
        let mut resolvers: Vec<Box<dyn DatasetResolver>> = Vec::new();
        if let Some(config) = remote {
            resolvers.push(Box::new(RemoteStoreResolver::new(config)));
        }
        resolvers.push(Box::new(BuiltinResolver));
        resolvers.push(Box::new(LocalFileResolver::new(local_dir)));
        Self::new(resolvers)
    }

    #[must_use]
    pub fn tier_names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Resolve `dataset_id` to a dataset.
    ///
    /// # Errors
    ///
    /// The last tier failure (`DatasetBackendUnavailable`, `DatasetFormat`, ...) when no
    /// tier had the dataset, `DatasetNotFound` when every tier answered absent.
    pub async fn resolve(&self, dataset_id: &str) -> TrainingResult<Dataset> {
        let mut last_failure = None;

        for resolver in &self.resolvers {
            debug!(dataset_id = %dataset_id, tier = resolver.name(), "Probing dataset tier");
            match resolver.resolve(dataset_id).await {
                Ok(Some(dataset)) => {
                    info!(
                        dataset_id = %dataset_id,
                        tier = resolver.name(),
                        rows = dataset.len(),
                        features = dataset.feature_count(),
                        class_count = dataset.class_count,
                        "Dataset resolved"
                    );
                    return Ok(dataset);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        dataset_id = %dataset_id,
                        tier = resolver.name(),
                        error = %e,
                        "Dataset tier failed, falling through"
                    );
                    last_failure = Some(e);
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| TrainingError::DatasetNotFound(dataset_id.to_string())))
    }
}

/// Read a headed CSV into a [`Table`] of raw cells.
pub(crate) fn read_csv_table<R: Read>(reader: R) -> TrainingResult<Table> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let columns = reader.headers()?.iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()?;
    Ok(Table { columns, rows })
}
