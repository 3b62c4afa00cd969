use std::fmt;
use std::path::Path;

use ndarray::{Array2, ArrayView4};
use serde::{Deserialize, Serialize};

use super::ModelError;
use crate::augment::Batch;

/// Per-sample `height x width x channels` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl InputShape {
    /// Trailing dimensions of an `N x H x W x C` tensor shape.
    pub fn from_tensor_shape(shape: &[usize]) -> Option<Self> {
        match shape {
            [_, height, width, channels] => Some(Self {
                height: *height,
                width: *width,
                channels: *channels,
            }),
            _ => None,
        }
    }

    /// Number of values in one flattened sample.
    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}

/// Summed statistics for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchStats {
    /// Cross-entropy summed over the batch samples.
    pub loss_sum: f32,
    pub correct: usize,
    pub samples: usize,
}

/// Mean statistics over one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochStats {
    pub loss: f32,
    pub accuracy: f32,
    pub samples: usize,
}

/// Model lifecycle used by the training loop drivers.
///
/// `prepare` allocates weights for an input shape and class count; the caller
/// then owns the epoch loop and feeds batches through `run_epoch`.
pub trait TrainableModel {
    fn prepare(&mut self, input_shape: InputShape, n_classes: usize) -> Result<(), ModelError>;

    fn is_prepared(&self) -> bool;

    /// Prepared input shape, if any.
    fn input_shape(&self) -> Option<InputShape>;

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, rate: f32);

    /// One optimizer step on `batch`.
    fn train_batch(&mut self, batch: &Batch) -> Result<BatchStats, ModelError>;

    /// Class probabilities, one row per image.
    fn predict_proba(&self, images: ArrayView4<'_, f32>) -> Result<Array2<f32>, ModelError>;

    /// Persist the current weights.
    fn save(&self, path: &Path) -> Result<(), ModelError>;

    /// Train on `steps` batches drawn from `batches`.
    fn run_epoch(
        &mut self,
        batches: &mut dyn Iterator<Item = Batch>,
        steps: usize,
    ) -> Result<EpochStats, ModelError> {
        let mut total = BatchStats::default();
        for produced in 0..steps {
            let batch = batches.next().ok_or(ModelError::BatchesExhausted {
                produced,
                expected: steps,
            })?;
            let stats = self.train_batch(&batch)?;
            total.loss_sum += stats.loss_sum;
            total.correct += stats.correct;
            total.samples += stats.samples;
        }
        let samples = total.samples.max(1) as f32;
        Ok(EpochStats {
            loss: total.loss_sum / samples,
            accuracy: total.correct as f32 / samples,
            samples: total.samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_shape_takes_trailing_dims() {
        let shape = InputShape::from_tensor_shape(&[20, 4, 4, 1]).unwrap();
        assert_eq!(shape.dims(), [4, 4, 1]);
        assert_eq!(shape.len(), 16);
        assert_eq!(shape.to_string(), "(4, 4, 1)");
        assert!(InputShape::from_tensor_shape(&[4, 4]).is_none());
    }
}
