use std::path::PathBuf;

use thiserror::Error;

/// Errors that may occur while loading, saving or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a settings file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to write a settings file.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Path that failed to write.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse TOML settings.
    #[error("Invalid settings at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to serialize settings to TOML.
    #[error("Failed to serialize settings: {0}")]
    SerializeToml(#[from] toml::ser::Error),
    /// A setting holds a value outside its allowed range.
    #[error("Invalid setting `{field}`: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// Human readable constraint.
        reason: String,
    },
}
