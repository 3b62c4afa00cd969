use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::dataset::DataError;
use crate::ml::ModelError;
use crate::preprocess::PreprocessError;

/// Errors raised while preparing, fitting or scoring a classifier.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Model(#[from] ModelError),
    /// An operation ran before its prerequisite step.
    #[error("Trainer is not ready: {0}")]
    Uninitialized(&'static str),
    /// The checkpoint directory could not be created.
    #[error("Failed to create checkpoint directory {path}: {source}")]
    CheckpointDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Arrays disagree with each other or with the model input.
    #[error("Shape mismatch: {0}")]
    Shape(String),
}
