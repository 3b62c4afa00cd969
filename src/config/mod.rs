//! Training settings loaded from TOML.

mod defaults;
mod errors;
mod io;
mod types;

pub use errors::ConfigError;
pub use io::{load_settings, save_settings};
pub use types::{DataSettings, ModelSettings, ScheduleSettings, TrainSettings, TrainingSettings};
