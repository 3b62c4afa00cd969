//! Trainable image classifiers and their evaluation.
//!
//! The orchestrator only talks to [`TrainableModel`]; [`MlpClassifier`] is the
//! in-process implementation used by the `imgtrain` binary.

mod error;
mod evaluate;
pub mod metrics;
mod mlp;
mod model;

pub use error::ModelError;
pub use evaluate::{Evaluation, evaluate, evaluate_arrays};
pub use mlp::{MlpClassifier, MlpOptions, MlpWeights};
pub use model::{BatchStats, EpochStats, InputShape, TrainableModel};
