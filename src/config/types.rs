use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::augment::AugmentConfig;
use crate::preprocess::NormalizationKind;

use super::ConfigError;
use super::defaults::{
    clamp_worker_count, default_base_rate, default_batch_size, default_epochs,
    default_hidden_size, default_l2_penalty, default_manifest, default_seed, default_train_size,
    default_true, default_workers,
};

/// Complete settings for one training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainSettings {
    /// Dataset description and preprocessing.
    #[serde(default)]
    pub data: DataSettings,
    /// Loop, batching and checkpoint settings.
    #[serde(default)]
    pub training: TrainingSettings,
    /// Augmentation table used by the augmented loop.
    #[serde(default)]
    pub augment: AugmentConfig,
    /// Classifier hyperparameters.
    #[serde(default)]
    pub model: ModelSettings,
}

/// Where the labeled images come from and how they are prepared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// CSV manifest mapping image paths to labels.
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
    /// Label column name; the last column when absent.
    #[serde(default)]
    pub label_column: Option<String>,
    /// Zero-based index of the header row; earlier rows are skipped.
    #[serde(default)]
    pub header: usize,
    /// Downsample every class to the rarest class count.
    #[serde(default = "default_true")]
    pub balance: bool,
    /// Rescale pixel values before training.
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default)]
    pub normalization: NormalizationKind,
    /// Fraction of rows assigned to the training partition.
    #[serde(default = "default_train_size")]
    pub train_size: f64,
    /// Directory relative image paths resolve against; the manifest's directory when absent.
    #[serde(default)]
    pub image_root: Option<PathBuf>,
    /// Resize decoded images to `[height, width]`.
    #[serde(default)]
    pub target_size: Option<[u32; 2]>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            label_column: None,
            header: 0,
            balance: default_true(),
            normalize: default_true(),
            normalization: NormalizationKind::default(),
            train_size: default_train_size(),
            image_root: None,
            target_size: None,
        }
    }
}

/// Loop driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Class count; inferred from the manifest when absent.
    #[serde(default)]
    pub n_classes: Option<usize>,
    /// Drive the epoch loop from the augmentation producer.
    #[serde(default = "default_true")]
    pub augment: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Background batch producers (0 = generate inline).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Checkpoint directory; `<cwd>/saved_models` when absent.
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
    #[serde(default)]
    pub schedule: ScheduleSettings,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            n_classes: None,
            augment: default_true(),
            seed: default_seed(),
            workers: default_workers(),
            checkpoint_dir: None,
            schedule: ScheduleSettings::default(),
        }
    }
}

/// Learning-rate schedule selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleSettings {
    /// Stepwise decay at epochs 80, 120, 160 and 180.
    Step {
        #[serde(default = "default_base_rate")]
        base_rate: f32,
    },
    /// Fixed learning rate.
    Constant { rate: f32 },
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self::Step {
            base_rate: default_base_rate(),
        }
    }
}

/// Hyperparameters for the MLP classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_l2_penalty")]
    pub l2_penalty: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            hidden_size: default_hidden_size(),
            l2_penalty: default_l2_penalty(),
        }
    }
}

impl TrainSettings {
    /// Clamp soft limits and reject values no run can use.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.training.workers = clamp_worker_count(self.training.workers);
        if self.training.batch_size == 0 {
            return Err(invalid("training.batch_size", "must be at least 1"));
        }
        if self.training.epochs == 0 {
            return Err(invalid("training.epochs", "must be at least 1"));
        }
        let train_size = self.data.train_size;
        if !(train_size > 0.0 && train_size < 1.0) {
            return Err(invalid(
                "data.train_size",
                format!("must lie strictly between 0 and 1, got {train_size}"),
            ));
        }
        if self.training.n_classes.is_some_and(|n| n < 2) {
            return Err(invalid("training.n_classes", "need at least 2 classes"));
        }
        if let Some([height, width]) = self.data.target_size
            && (height == 0 || width == 0)
        {
            return Err(invalid("data.target_size", "dimensions must be non-zero"));
        }
        if self.model.hidden_size == 0 {
            return Err(invalid("model.hidden_size", "must be at least 1"));
        }
        let rate = match self.training.schedule {
            ScheduleSettings::Step { base_rate } => base_rate,
            ScheduleSettings::Constant { rate } => rate,
        };
        if !(rate.is_finite() && rate > 0.0) {
            return Err(invalid("training.schedule", "learning rate must be positive"));
        }
        self.augment.validate().map_err(|reason| invalid("augment", reason))?;
        Ok(self)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let settings = TrainSettings::default().validated().unwrap();
        assert!(settings.training.augment);
        assert!(settings.data.normalize);
        assert_eq!(settings.training.workers, 4);
    }

    #[test]
    fn rejects_train_size_outside_open_interval() {
        for train_size in [0.0, 1.0, 1.5] {
            let mut settings = TrainSettings::default();
            settings.data.train_size = train_size;
            let err = settings.validated().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Invalid {
                    field: "data.train_size",
                    ..
                }
            ));
        }
    }

    #[test]
    fn worker_count_is_clamped() {
        let mut settings = TrainSettings::default();
        settings.training.workers = 1_000;
        let settings = settings.validated().unwrap();
        assert_eq!(settings.training.workers, 32);
    }
}
