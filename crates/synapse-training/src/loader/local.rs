use super::{DatasetResolver, read_csv_table};
use crate::dataset::Dataset;
use crate::error::TrainingResult;
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Looks up `{dir}/{dataset_id}.csv`; the last column is the target.
#[derive(Debug, Clone)]
pub struct LocalFileResolver {
    dir: PathBuf,
}

impl LocalFileResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for `dataset_id`, or `None` if the identifier could escape the directory.
    fn path_for(&self, dataset_id: &str) -> Option<PathBuf> {
        if dataset_id.is_empty()
            || dataset_id.contains(['/', '\\'])
            || dataset_id.contains("..")
        {
            return None;
        }
        Some(self.dir.join(format!("{dataset_id}.csv")))
    }
}

#[async_trait]
impl DatasetResolver for LocalFileResolver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn resolve(&self, dataset_id: &str) -> TrainingResult<Option<Dataset>> {
        let Some(path) = self.path_for(dataset_id) else {
            debug!(dataset_id = %dataset_id, "Identifier rejected for local lookup");
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        debug!(path = %path.display(), "Reading local dataset");
        let table = read_csv_table(File::open(&path)?)?;
        table.into_dataset(dataset_id).map(Some)
    }
}
