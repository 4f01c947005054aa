//! Synapse Training
//!
//! Session-independent training primitives:
//! - Validating training configurations (`TrainingConfig`)
//! - Resolving datasets through ordered tiers (`DatasetLoader`)
//! - Deriving network architectures (`Architecture::build`)
//! - Compiling and fitting models behind the `TrainingRuntime` seam

pub mod architecture;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod runtime;

pub use architecture::{Architecture, LayerDescriptor, OutputActivation, WeightPenalty};
pub use config::{Activation, OptimizerKind, Regularization, Regularizer, TrainingConfig};
pub use dataset::{CLASSIFICATION_THRESHOLD, Dataset, DatasetSplit, StandardScaler, Table};
pub use error::{TrainingError, TrainingResult};
pub use loader::{
    BuiltinResolver, DatasetLoader, DatasetResolver, LocalFileResolver, RemoteStoreConfig,
    RemoteStoreResolver,
};
pub use runtime::{
    CompileOptions, CompiledModel, DenseModel, DenseRuntime, EpochCallback, EpochControl,
    EpochLogs, FitParams, History, Objective, TrainingRuntime,
};
