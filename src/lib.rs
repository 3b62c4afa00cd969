//! Library exports for the trainer binary, benchmarks and tests.
/// Per-user application directories.
pub mod app_dirs;
/// Data augmentation and batch production.
pub mod augment;
/// TOML-backed training settings.
pub mod config;
/// Manifest reading, splitting and image decoding.
pub mod dataset;
/// Tracing subscriber setup.
pub mod logging;
/// Trainable models and evaluation metrics.
pub mod ml;
/// Normalization and label encoding.
pub mod preprocess;
/// Training orchestration, schedules and callbacks.
pub mod train;
