use std::path::Path;

use super::{ConfigError, TrainSettings};

/// Load and validate settings from a TOML file.
///
/// Missing tables and fields fall back to their defaults.
pub fn load_settings(path: &Path) -> Result<TrainSettings, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let settings: TrainSettings = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    let settings = settings.validated()?;
    tracing::debug!("Loaded training settings from {}", path.display());
    Ok(settings)
}

/// Write settings as TOML, e.g. to record the effective configuration of a run.
pub fn save_settings(path: &Path, settings: &TrainSettings) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(settings)?;
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
