use ndarray::{Array4, Axis};
use serde::{Deserialize, Serialize};

use super::PreprocessError;

const PIXEL_MAX: f32 = 255.0;

/// Pixel normalization strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationKind {
    /// Divide 8-bit pixel values by 255 so every value lies in `[0, 1]`.
    #[default]
    UnitRange,
    /// Subtract the per-channel train mean and divide by the train std.
    Standardize,
}

/// Normalize the train and test tensors together.
///
/// Statistics for [`NormalizationKind::Standardize`] come from the training
/// tensor only, so test data never leaks into them.
pub fn normalize_images(
    kind: NormalizationKind,
    train: Array4<f32>,
    test: Array4<f32>,
) -> Result<(Array4<f32>, Array4<f32>), PreprocessError> {
    if train.shape()[1..] != test.shape()[1..] {
        return Err(PreprocessError::ShapeMismatch {
            train: train.shape()[1..].to_vec(),
            test: test.shape()[1..].to_vec(),
        });
    }
    match kind {
        NormalizationKind::UnitRange => Ok((unit_range(train), unit_range(test))),
        NormalizationKind::Standardize => {
            let (mean, std) = channel_mean_std(&train)?;
            Ok((
                standardize(train, &mean, &std),
                standardize(test, &mean, &std),
            ))
        }
    }
}

fn unit_range(mut images: Array4<f32>) -> Array4<f32> {
    images.mapv_inplace(|v| (v / PIXEL_MAX).clamp(0.0, 1.0));
    images
}

fn channel_mean_std(images: &Array4<f32>) -> Result<(Vec<f32>, Vec<f32>), PreprocessError> {
    let channels = images.shape()[3];
    let per_channel = images.len() / channels.max(1);
    if per_channel == 0 {
        return Err(PreprocessError::EmptyTensor);
    }
    let mut mean = vec![0.0f32; channels];
    let mut std = vec![0.0f32; channels];
    for (c, lane) in images.axis_iter(Axis(3)).enumerate() {
        let m = lane.sum() / per_channel as f32;
        let var = lane.fold(0.0f32, |acc, &v| acc + (v - m) * (v - m)) / per_channel as f32;
        mean[c] = m;
        std[c] = var.sqrt().max(1e-6);
    }
    Ok((mean, std))
}

fn standardize(mut images: Array4<f32>, mean: &[f32], std: &[f32]) -> Array4<f32> {
    for (c, mut lane) in images.axis_iter_mut(Axis(3)).enumerate() {
        lane.mapv_inplace(|v| (v - mean[c]) / std[c]);
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Array4<f32> {
        Array4::from_shape_fn((n, 4, 4, 1), |(i, y, x, _)| ((i * 16 + y * 4 + x) % 256) as f32)
    }

    #[test]
    fn unit_range_bounds_values() {
        let (train, test) =
            normalize_images(NormalizationKind::UnitRange, ramp(20), ramp(4)).unwrap();
        assert!(train.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(test.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(train[[0, 0, 0, 0]], 0.0);
        assert!((train[[15, 3, 3, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn standardize_centers_training_channels() {
        let (train, _) =
            normalize_images(NormalizationKind::Standardize, ramp(10), ramp(2)).unwrap();
        let mean = train.sum() / train.len() as f32;
        assert!(mean.abs() < 1e-3);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let test = Array4::<f32>::zeros((2, 3, 3, 1));
        let err = normalize_images(NormalizationKind::UnitRange, ramp(2), test).unwrap_err();
        assert!(matches!(err, PreprocessError::ShapeMismatch { .. }));
    }
}
