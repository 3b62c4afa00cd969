//! Image augmentation and lazily generated training batches.

mod config;
mod producer;
mod transform;

pub use config::{AugmentConfig, FillMode, PipelineConfig};
pub use producer::{Batch, BatchProducer, BatchSource};
pub use transform::{TransformParams, apply_transform, random_transform, standardize};
