//! Training orchestration: loop drivers, callbacks and learning-rate schedules.

mod callbacks;
mod error;
mod schedule;
mod trainer;

pub use callbacks::{Callback, EpochLogs, LearningRateScheduler, ModelCheckpoint};
pub use error::TrainError;
pub use schedule::{Constant, LrSchedule, StepDecay, from_settings};
pub use trainer::{FitReport, ImageClassifierTrainer};
