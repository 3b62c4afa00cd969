use std::path::{Path, PathBuf};

use super::{LrSchedule, TrainError};
use crate::ml::TrainableModel;

/// Metrics recorded at the end of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochLogs {
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
    pub learning_rate: f32,
}

/// Hooks invoked by the training loop drivers around every epoch.
///
/// Epoch indices passed to callbacks are zero-based.
pub trait Callback {
    fn on_epoch_begin(
        &mut self,
        _epoch: usize,
        _model: &mut dyn TrainableModel,
    ) -> Result<(), TrainError> {
        Ok(())
    }

    fn on_epoch_end(
        &mut self,
        _epoch: usize,
        _logs: &EpochLogs,
        _model: &dyn TrainableModel,
    ) -> Result<(), TrainError> {
        Ok(())
    }
}

/// Sets the model learning rate from a schedule before each epoch.
pub struct LearningRateScheduler {
    schedule: Box<dyn LrSchedule>,
}

impl LearningRateScheduler {
    pub fn new(schedule: Box<dyn LrSchedule>) -> Self {
        Self { schedule }
    }
}

impl Callback for LearningRateScheduler {
    fn on_epoch_begin(
        &mut self,
        epoch: usize,
        model: &mut dyn TrainableModel,
    ) -> Result<(), TrainError> {
        let rate = self.schedule.learning_rate(epoch);
        if rate != model.learning_rate() {
            tracing::info!("Epoch {}: learning rate {rate:e}", epoch + 1);
        }
        model.set_learning_rate(rate);
        Ok(())
    }
}

/// Saves the model whenever validation accuracy strictly improves.
#[derive(Debug)]
pub struct ModelCheckpoint {
    dir: PathBuf,
    best: Option<f32>,
    best_path: Option<PathBuf>,
}

impl ModelCheckpoint {
    /// Create `dir` (and parents) if absent.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, TrainError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| TrainError::CheckpointDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            best: None,
            best_path: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a zero-based epoch index.
    pub fn file_name(epoch: usize) -> String {
        format!("model.{:03}.json", epoch + 1)
    }

    pub fn best_metric(&self) -> Option<f32> {
        self.best
    }

    pub fn best_path(&self) -> Option<&Path> {
        self.best_path.as_deref()
    }

    pub fn into_best_path(self) -> Option<PathBuf> {
        self.best_path
    }
}

impl Callback for ModelCheckpoint {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &EpochLogs,
        model: &dyn TrainableModel,
    ) -> Result<(), TrainError> {
        let current = logs.val_accuracy;
        let improved = match self.best {
            None => !current.is_nan(),
            Some(best) => current > best,
        };
        if !improved {
            tracing::debug!(
                "Epoch {}: val_accuracy {current:.4} did not improve from {:.4}",
                epoch + 1,
                self.best.unwrap_or(f32::NAN)
            );
            return Ok(());
        }
        let path = self.dir.join(Self::file_name(epoch));
        model.save(&path)?;
        tracing::info!(
            "Epoch {}: val_accuracy improved to {current:.4}, saved {}",
            epoch + 1,
            path.display()
        );
        self.best = Some(current);
        self.best_path = Some(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{InputShape, MlpClassifier, MlpOptions};
    use tempfile::tempdir;

    fn logs(val_accuracy: f32) -> EpochLogs {
        EpochLogs {
            loss: 1.0,
            accuracy: 0.5,
            val_loss: 1.0,
            val_accuracy,
            learning_rate: 1e-3,
        }
    }

    fn model() -> MlpClassifier {
        let mut model = MlpClassifier::new(MlpOptions {
            hidden_size: 4,
            ..MlpOptions::default()
        });
        model
            .prepare(
                InputShape {
                    height: 2,
                    width: 2,
                    channels: 1,
                },
                2,
            )
            .unwrap();
        model
    }

    #[test]
    fn checkpoint_saves_only_on_strict_improvement() {
        let dir = tempdir().unwrap();
        let ckpt_dir = dir.path().join("nested").join("saved_models");
        let mut checkpoint = ModelCheckpoint::new(&ckpt_dir).unwrap();
        assert!(ckpt_dir.is_dir());
        let model = model();
        for (epoch, acc) in [0.5, 0.5, 0.75, 0.6].into_iter().enumerate() {
            checkpoint.on_epoch_end(epoch, &logs(acc), &model).unwrap();
        }
        let mut files: Vec<String> = std::fs::read_dir(&ckpt_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["model.001.json", "model.003.json"]);
        assert_eq!(checkpoint.best_metric(), Some(0.75));
        assert_eq!(checkpoint.best_path(), Some(ckpt_dir.join("model.003.json").as_path()));
    }

    #[test]
    fn scheduler_sets_learning_rate() {
        let mut model = model();
        let mut scheduler = LearningRateScheduler::new(Box::new(|epoch: usize| epoch as f32));
        scheduler.on_epoch_begin(7, &mut model).unwrap();
        assert_eq!(model.learning_rate(), 7.0);
    }
}
