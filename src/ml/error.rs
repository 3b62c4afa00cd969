use std::path::PathBuf;

use thiserror::Error;

use super::InputShape;

/// Errors raised by a trainable model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Weights were used before `prepare`.
    #[error("Model has not been prepared")]
    NotPrepared,
    /// Input images do not match the prepared input shape.
    #[error("Input shape mismatch: model expects {expected}, got {found:?}")]
    InputShape {
        expected: InputShape,
        found: Vec<usize>,
    },
    /// Label rows do not match the prepared class count.
    #[error("Label width mismatch: model has {expected} classes, labels have {found}")]
    LabelWidth { expected: usize, found: usize },
    /// The batch stream ended before the epoch completed.
    #[error("Batch stream ended after {produced} of {expected} steps")]
    BatchesExhausted { produced: usize, expected: usize },
    /// Failed to write or read a model file.
    #[error("Model file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to encode or decode a model file.
    #[error("Model file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A loaded model file is internally inconsistent.
    #[error("Invalid model file: {0}")]
    Invalid(String),
}
