use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array2, Array4};

use super::{
    Callback, EpochLogs, LearningRateScheduler, ModelCheckpoint, TrainError, from_settings,
};
use crate::augment::{BatchProducer, BatchSource, PipelineConfig};
use crate::config::TrainSettings;
use crate::dataset::{CombinedFrame, ReadOptions, load_images, read_data};
use crate::ml::{Evaluation, InputShape, TrainableModel, evaluate, evaluate_arrays};
use crate::preprocess::{LabelEncoder, normalize_images};

const DEFAULT_CHECKPOINT_DIR: &str = "saved_models";

/// Outcome of [`ImageClassifierTrainer::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    /// One entry per epoch, in order.
    pub history: Vec<EpochLogs>,
    /// Last checkpoint written by the augmented loop.
    pub best_checkpoint: Option<PathBuf>,
}

/// Prepares a labeled image dataset and drives a model through it.
///
/// Construction does all data work up front (manifest, split, decode,
/// normalize, one-hot); `fit` and `score` only consume the prepared arrays.
pub struct ImageClassifierTrainer<M: TrainableModel> {
    model: M,
    settings: TrainSettings,
    train_frame: CombinedFrame,
    test_frame: CombinedFrame,
    x_train: Arc<Array4<f32>>,
    x_test: Arc<Array4<f32>>,
    y_train: Arc<Array2<f32>>,
    y_test: Arc<Array2<f32>>,
    input_shape: InputShape,
    encoder: LabelEncoder,
    pipeline: PipelineConfig,
    fitted: bool,
}

impl<M: TrainableModel> ImageClassifierTrainer<M> {
    /// Read, split and prepare the dataset described by `settings`.
    pub fn new(model: M, settings: TrainSettings) -> Result<Self, TrainError> {
        let settings = settings.validated()?;
        let data = &settings.data;
        let training = &settings.training;

        let read = read_data(
            &data.manifest,
            &ReadOptions {
                label_column: data.label_column.as_deref(),
                header: data.header,
                balance: data.balance,
                train_size: data.train_size,
                seed: training.seed,
            },
        )?;
        let (train_frame, test_frame) = read.frames();

        let root = image_root(&data.manifest, data.image_root.as_deref());
        let decode = |frame: &CombinedFrame| {
            load_images(frame.paths().iter().map(String::as_str), &root, data.target_size)
        };
        let x_train = decode(&train_frame)?;
        let x_test = decode(&test_frame)?;
        if x_train.shape()[1..] != x_test.shape()[1..] {
            return Err(TrainError::Shape(format!(
                "train images are {:?} but test images are {:?}",
                &x_train.shape()[1..],
                &x_test.shape()[1..]
            )));
        }
        let (x_train, x_test) = if data.normalize {
            normalize_images(data.normalization, x_train, x_test)?
        } else {
            (x_train, x_test)
        };
        let input_shape = InputShape::from_tensor_shape(x_train.shape()).ok_or_else(|| {
            TrainError::Shape(format!("expected a 4-d tensor, got {:?}", x_train.shape()))
        })?;

        let encoder = LabelEncoder::fit(
            train_frame
                .labels()
                .iter()
                .chain(test_frame.labels())
                .map(String::as_str),
            training.n_classes,
        )?;
        if encoder.n_classes() < 2 {
            tracing::warn!("Only {} class found in the manifest", encoder.n_classes());
        }
        let y_train = encoder.one_hot(train_frame.labels())?;
        let y_test = encoder.one_hot(test_frame.labels())?;

        let pipeline = PipelineConfig {
            batch_size: training.batch_size,
            workers: training.workers,
            seed: training.seed,
            augment: settings.augment.clone(),
        };
        tracing::debug!(
            "Prepared {} train / {} test images of shape {input_shape}, {} classes",
            train_frame.len(),
            test_frame.len(),
            encoder.n_classes()
        );

        Ok(Self {
            model,
            train_frame,
            test_frame,
            x_train: Arc::new(x_train),
            x_test: Arc::new(x_test),
            y_train: Arc::new(y_train),
            y_test: Arc::new(y_test),
            input_shape,
            encoder,
            pipeline,
            fitted: false,
            settings,
        })
    }

    /// Prepare the model and train it for the configured number of epochs.
    pub fn fit(&mut self) -> Result<FitReport, TrainError> {
        self.model.prepare(self.input_shape, self.encoder.n_classes())?;
        if !self.model.is_prepared() {
            return Err(TrainError::Uninitialized(
                "model was not prepared before the training loop",
            ));
        }
        if self.model.input_shape() != Some(self.input_shape) {
            return Err(TrainError::Shape(format!(
                "model input {:?} does not match validation images {}",
                self.model.input_shape(),
                self.input_shape
            )));
        }
        self.fitted = false;
        let report = if self.settings.training.augment {
            self.fit_augmented()?
        } else {
            self.fit_plain()?
        };
        self.fitted = true;
        Ok(report)
    }

    /// Shuffled batches of the prepared arrays, validated on the test arrays.
    fn fit_plain(&mut self) -> Result<FitReport, TrainError> {
        let mut batches = self.pipeline.shuffled(self.train_source()?);
        let mut scheduler = LearningRateScheduler::new(from_settings(self.settings.training.schedule));
        let x_test = Arc::clone(&self.x_test);
        let y_test = Arc::clone(&self.y_test);
        let batch_size = self.pipeline.batch_size;
        let history = run_epochs(
            &mut self.model,
            self.settings.training.epochs,
            &mut batches,
            |model| Ok(evaluate_arrays(model, x_test.view(), y_test.view(), batch_size)?),
            &mut [&mut scheduler as &mut dyn Callback],
        )?;
        Ok(FitReport {
            history,
            best_checkpoint: None,
        })
    }

    /// Endless augmented batches with scheduler and best-only checkpoints.
    fn fit_augmented(&mut self) -> Result<FitReport, TrainError> {
        let mut batches = self.pipeline.augmented(self.train_source()?);
        let mut validation = self.pipeline.sequential(self.test_source()?);
        let val_steps = validation.steps_per_epoch();
        let n_classes = self.encoder.n_classes();

        let mut scheduler = LearningRateScheduler::new(from_settings(self.settings.training.schedule));
        let mut checkpoint = ModelCheckpoint::new(self.checkpoint_dir())?;
        tracing::info!(
            "Augmented training: checkpoints in {}",
            checkpoint.dir().display()
        );
        let mut callbacks: [&mut dyn Callback; 2] = [&mut scheduler, &mut checkpoint];
        let history = run_epochs(
            &mut self.model,
            self.settings.training.epochs,
            &mut batches,
            |model| Ok(evaluate(model, &mut validation, val_steps, n_classes)?),
            &mut callbacks,
        )?;
        Ok(FitReport {
            history,
            best_checkpoint: checkpoint.into_best_path(),
        })
    }

    /// Evaluate the fitted model on one in-order pass over the test partition.
    ///
    /// Test inputs are prepared the way the fit loop validated: standardized
    /// after augmented training, raw arrays after plain training.
    pub fn score(&self) -> Result<Evaluation, TrainError> {
        if !self.fitted {
            return Err(TrainError::Uninitialized("fit must complete before score"));
        }
        let evaluation = if self.settings.training.augment {
            let mut batches = self.pipeline.sequential(self.test_source()?);
            let steps = batches.steps_per_epoch();
            evaluate(&self.model, &mut batches, steps, self.encoder.n_classes())?
        } else {
            evaluate_arrays(
                &self.model,
                self.x_test.view(),
                self.y_test.view(),
                self.pipeline.batch_size,
            )?
        };
        tracing::info!(
            "Test loss {:.4}, accuracy {:.4} over {} images",
            evaluation.loss,
            evaluation.accuracy,
            evaluation.confusion.total()
        );
        Ok(evaluation)
    }

    fn train_source(&self) -> Result<BatchSource, TrainError> {
        source(&self.x_train, &self.y_train, "train")
    }

    fn test_source(&self) -> Result<BatchSource, TrainError> {
        source(&self.x_test, &self.y_test, "test")
    }

    /// Where checkpoints go; relative to the working directory by default.
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.settings
            .training
            .checkpoint_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_DIR))
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    pub fn n_classes(&self) -> usize {
        self.encoder.n_classes()
    }

    pub fn encoder(&self) -> &LabelEncoder {
        &self.encoder
    }

    pub fn settings(&self) -> &TrainSettings {
        &self.settings
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    pub fn train_frame(&self) -> &CombinedFrame {
        &self.train_frame
    }

    pub fn test_frame(&self) -> &CombinedFrame {
        &self.test_frame
    }

    pub fn x_train(&self) -> &Array4<f32> {
        &self.x_train
    }

    pub fn x_test(&self) -> &Array4<f32> {
        &self.x_test
    }

    pub fn y_train(&self) -> &Array2<f32> {
        &self.y_train
    }

    pub fn y_test(&self) -> &Array2<f32> {
        &self.y_test
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }
}

fn run_epochs<M: TrainableModel>(
    model: &mut M,
    epochs: usize,
    batches: &mut BatchProducer,
    mut validate: impl FnMut(&M) -> Result<Evaluation, TrainError>,
    callbacks: &mut [&mut dyn Callback],
) -> Result<Vec<EpochLogs>, TrainError> {
    let steps = batches.steps_per_epoch();
    let mut history = Vec::with_capacity(epochs);
    for epoch in 0..epochs {
        for callback in callbacks.iter_mut() {
            callback.on_epoch_begin(epoch, &mut *model)?;
        }
        let stats = model.run_epoch(&mut *batches, steps)?;
        let val = validate(&*model)?;
        let logs = EpochLogs {
            loss: stats.loss,
            accuracy: stats.accuracy,
            val_loss: val.loss,
            val_accuracy: val.accuracy,
            learning_rate: model.learning_rate(),
        };
        tracing::info!(
            "Epoch {}/{epochs}: loss {:.4}, accuracy {:.4}, val_loss {:.4}, val_accuracy {:.4}",
            epoch + 1,
            logs.loss,
            logs.accuracy,
            logs.val_loss,
            logs.val_accuracy
        );
        for callback in callbacks.iter_mut() {
            callback.on_epoch_end(epoch, &logs, &*model)?;
        }
        history.push(logs);
    }
    Ok(history)
}

fn source(
    images: &Arc<Array4<f32>>,
    labels: &Arc<Array2<f32>>,
    partition: &str,
) -> Result<BatchSource, TrainError> {
    BatchSource::new(Arc::clone(images), Arc::clone(labels)).ok_or_else(|| {
        TrainError::Shape(format!(
            "{partition} partition has {} images but {} label rows",
            images.shape()[0],
            labels.nrows()
        ))
    })
}

fn image_root(manifest: &Path, configured: Option<&Path>) -> PathBuf {
    match configured {
        Some(root) => root.to_path_buf(),
        None => manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_root_defaults_to_manifest_dir() {
        assert_eq!(
            image_root(Path::new("data/set/labels.csv"), None),
            PathBuf::from("data/set")
        );
        assert_eq!(image_root(Path::new("labels.csv"), None), PathBuf::new());
        assert_eq!(
            image_root(Path::new("data/labels.csv"), Some(Path::new("/images"))),
            PathBuf::from("/images")
        );
    }
}
