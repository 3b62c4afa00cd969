use serde::{Deserialize, Serialize};

use super::producer::{BatchProducer, BatchSource, Sampling, TransformMode};

/// How pixels sampled outside the image bounds are filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Repeat the closest edge pixel.
    #[default]
    Nearest,
    /// Use [`AugmentConfig::cval`].
    Constant,
    /// Mirror across the edge (`dcba|abcd|dcba`).
    Reflect,
    /// Tile the image (`abcd|abcd|abcd`).
    Wrap,
}

/// Augmentation table applied to every training sample.
///
/// Ranges are symmetric: a value `r` draws uniformly from `[-r, r]`.
/// Shift ranges are fractions of the image height/width.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Subtract each sample's mean.
    pub samplewise_center: bool,
    /// Divide each sample by its std.
    pub samplewise_std_normalization: bool,
    /// Rotation range in degrees.
    pub rotation_range: f32,
    pub width_shift_range: f32,
    pub height_shift_range: f32,
    /// Shear angle range in degrees.
    pub shear_range: f32,
    /// Zoom factors are drawn from `[1 - zoom_range, 1 + zoom_range]`.
    pub zoom_range: f32,
    /// Offset added to every channel value.
    pub channel_shift_range: f32,
    pub fill_mode: FillMode,
    /// Fill value for [`FillMode::Constant`].
    pub cval: f32,
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
    /// Multiply values by this factor before any other standardization.
    pub rescale: Option<f32>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            samplewise_center: false,
            samplewise_std_normalization: false,
            rotation_range: 0.0,
            width_shift_range: 0.1,
            height_shift_range: 0.1,
            shear_range: 0.0,
            zoom_range: 0.0,
            channel_shift_range: 0.0,
            fill_mode: FillMode::Nearest,
            cval: 0.0,
            horizontal_flip: true,
            vertical_flip: false,
            rescale: None,
        }
    }
}

impl AugmentConfig {
    /// A table that leaves every sample untouched.
    pub fn identity() -> Self {
        Self {
            width_shift_range: 0.0,
            height_shift_range: 0.0,
            horizontal_flip: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let ranges = [
            ("rotation_range", self.rotation_range),
            ("width_shift_range", self.width_shift_range),
            ("height_shift_range", self.height_shift_range),
            ("shear_range", self.shear_range),
            ("zoom_range", self.zoom_range),
            ("channel_shift_range", self.channel_shift_range),
        ];
        for (name, value) in ranges {
            if !(value.is_finite() && value >= 0.0) {
                return Err(format!("{name} must be a non-negative number, got {value}"));
            }
        }
        if self.width_shift_range >= 1.0 || self.height_shift_range >= 1.0 {
            return Err("shift ranges are fractions and must be below 1".to_string());
        }
        if self.zoom_range >= 1.0 {
            return Err("zoom_range must be below 1".to_string());
        }
        if self.rescale.is_some_and(|factor| !factor.is_finite()) {
            return Err("rescale must be finite".to_string());
        }
        Ok(())
    }

    /// True when no random geometric or intensity change is configured.
    pub fn is_deterministic(&self) -> bool {
        self.rotation_range == 0.0
            && self.width_shift_range == 0.0
            && self.height_shift_range == 0.0
            && self.shear_range == 0.0
            && self.zoom_range == 0.0
            && self.channel_shift_range == 0.0
            && !self.horizontal_flip
            && !self.vertical_flip
    }
}

/// Batching and augmentation parameters shared by training and evaluation.
///
/// Built once per trainer and passed to every producer, so evaluation never
/// depends on state left behind by a previous fit.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    /// Background producer threads; 0 generates batches on the caller's thread.
    pub workers: usize,
    pub seed: u64,
    pub augment: AugmentConfig,
}

impl PipelineConfig {
    /// Endless shuffled batches with random augmentation.
    pub fn augmented(&self, source: BatchSource) -> BatchProducer {
        BatchProducer::spawn(source, self, Sampling::Shuffled, TransformMode::Random)
    }

    /// Endless shuffled batches of the prepared arrays as-is.
    pub fn shuffled(&self, source: BatchSource) -> BatchProducer {
        BatchProducer::spawn(source, self, Sampling::Shuffled, TransformMode::None)
    }

    /// In-order batches with standardization but no random transforms.
    pub fn sequential(&self, source: BatchSource) -> BatchProducer {
        BatchProducer::spawn(
            source,
            self,
            Sampling::Sequential,
            TransformMode::StandardizeOnly,
        )
    }
}
