use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training config: {0}")]
    InvalidConfig(String),

    #[error("dataset '{0}' not found")]
    DatasetNotFound(String),

    #[error("dataset backend unavailable: {0}")]
    DatasetBackendUnavailable(String),

    #[error("dataset format error: {0}")]
    DatasetFormat(String),

    #[error("training runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
