use ndarray::{Array3, ArrayView3, Axis};
use rand::Rng;

use super::{AugmentConfig, FillMode};

/// One concrete draw from an [`AugmentConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    /// Rotation in radians.
    pub theta: f32,
    /// Row shift in pixels.
    pub tx: f32,
    /// Column shift in pixels.
    pub ty: f32,
    /// Shear in radians.
    pub shear: f32,
    /// Row zoom factor.
    pub zx: f32,
    /// Column zoom factor.
    pub zy: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub channel_shift: f32,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            theta: 0.0,
            tx: 0.0,
            ty: 0.0,
            shear: 0.0,
            zx: 1.0,
            zy: 1.0,
            flip_horizontal: false,
            flip_vertical: false,
            channel_shift: 0.0,
        }
    }
}

impl TransformParams {
    /// Draw parameters for an image of `height x width`.
    pub fn sample<R: Rng>(
        config: &AugmentConfig,
        height: usize,
        width: usize,
        rng: &mut R,
    ) -> Self {
        let zoom = if config.zoom_range > 0.0 {
            let low = 1.0 - config.zoom_range;
            let high = 1.0 + config.zoom_range;
            (rng.random_range(low..=high), rng.random_range(low..=high))
        } else {
            (1.0, 1.0)
        };
        Self {
            theta: symmetric(rng, config.rotation_range).to_radians(),
            tx: symmetric(rng, config.height_shift_range) * height as f32,
            ty: symmetric(rng, config.width_shift_range) * width as f32,
            shear: symmetric(rng, config.shear_range).to_radians(),
            zx: zoom.0,
            zy: zoom.1,
            flip_horizontal: config.horizontal_flip && rng.random_bool(0.5),
            flip_vertical: config.vertical_flip && rng.random_bool(0.5),
            channel_shift: symmetric(rng, config.channel_shift_range),
        }
    }

    fn is_affine_identity(&self) -> bool {
        self.theta == 0.0
            && self.tx == 0.0
            && self.ty == 0.0
            && self.shear == 0.0
            && self.zx == 1.0
            && self.zy == 1.0
    }
}

/// Draw parameters from `config` and apply them to one `H x W x C` image.
pub fn random_transform<R: Rng>(
    image: ArrayView3<'_, f32>,
    config: &AugmentConfig,
    rng: &mut R,
) -> Array3<f32> {
    let (height, width, _) = image.dim();
    let params = TransformParams::sample(config, height, width, rng);
    apply_transform(image, &params, config.fill_mode, config.cval)
}

/// Apply an affine warp, channel shift, then flips.
///
/// The warp maps every output pixel back to the nearest source pixel around
/// the image center: rotation, then shift, then shear, then zoom.
pub fn apply_transform(
    image: ArrayView3<'_, f32>,
    params: &TransformParams,
    fill_mode: FillMode,
    cval: f32,
) -> Array3<f32> {
    let (height, width, channels) = image.dim();
    let mut out = if params.is_affine_identity() {
        image.to_owned()
    } else {
        let center_r = (height as f32 - 1.0) / 2.0;
        let center_c = (width as f32 - 1.0) / 2.0;
        let (sin_t, cos_t) = params.theta.sin_cos();
        let (sin_s, cos_s) = params.shear.sin_cos();
        let mut out = Array3::<f32>::zeros((height, width, channels));
        for r in 0..height {
            for c in 0..width {
                let dr = r as f32 - center_r;
                let dc = c as f32 - center_c;
                // zoom, then shear
                let zr = params.zx * dr;
                let zc = params.zy * dc;
                let sr = zr - sin_s * zc;
                let sc = cos_s * zc;
                // shift, then rotation
                let tr = sr + params.tx;
                let tc = sc + params.ty;
                let src_r = cos_t * tr - sin_t * tc + center_r;
                let src_c = sin_t * tr + cos_t * tc + center_c;
                let src_r = resolve_index(src_r.round() as i64, height, fill_mode);
                let src_c = resolve_index(src_c.round() as i64, width, fill_mode);
                for ch in 0..channels {
                    out[[r, c, ch]] = match (src_r, src_c) {
                        (Some(sr), Some(sc)) => image[[sr, sc, ch]],
                        _ => cval,
                    };
                }
            }
        }
        out
    };

    if params.channel_shift != 0.0 {
        let (min, max) = out
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        out.mapv_inplace(|v| (v + params.channel_shift).clamp(min, max));
    }
    if params.flip_horizontal {
        out.invert_axis(Axis(1));
    }
    if params.flip_vertical {
        out.invert_axis(Axis(0));
    }
    out
}

/// Apply rescaling and per-sample centering/normalization in place.
pub fn standardize(image: &mut Array3<f32>, config: &AugmentConfig) {
    if let Some(factor) = config.rescale {
        image.mapv_inplace(|v| v * factor);
    }
    if image.is_empty() {
        return;
    }
    if config.samplewise_center {
        let mean = image.sum() / image.len() as f32;
        image.mapv_inplace(|v| v - mean);
    }
    if config.samplewise_std_normalization {
        let mean = image.sum() / image.len() as f32;
        let var = image.fold(0.0f32, |acc, &v| acc + (v - mean) * (v - mean)) / image.len() as f32;
        let std = var.sqrt() + 1e-6;
        image.mapv_inplace(|v| v / std);
    }
}

fn symmetric<R: Rng>(rng: &mut R, range: f32) -> f32 {
    if range <= 0.0 {
        0.0
    } else {
        rng.random_range(-range..=range)
    }
}

/// Map a possibly out-of-range index into `0..len`; `None` means "use cval".
fn resolve_index(idx: i64, len: usize, fill_mode: FillMode) -> Option<usize> {
    let n = len as i64;
    if (0..n).contains(&idx) {
        return Some(idx as usize);
    }
    if n == 0 {
        return None;
    }
    match fill_mode {
        FillMode::Constant => None,
        FillMode::Nearest => Some(idx.clamp(0, n - 1) as usize),
        FillMode::Wrap => Some(idx.rem_euclid(n) as usize),
        FillMode::Reflect => {
            let period = 2 * n;
            let folded = idx.rem_euclid(period);
            let reflected = if folded < n { folded } else { period - 1 - folded };
            Some(reflected as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ramp() -> Array3<f32> {
        Array3::from_shape_fn((4, 5, 1), |(r, c, _)| (r * 5 + c) as f32)
    }

    #[test]
    fn identity_config_leaves_image_unchanged() {
        let image = ramp();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            let out = random_transform(image.view(), &AugmentConfig::identity(), &mut rng);
            assert_eq!(out, image);
        }
    }

    #[test]
    fn column_shift_repeats_edge_with_nearest_fill() {
        let params = TransformParams {
            ty: 2.0,
            ..TransformParams::default()
        };
        let out = apply_transform(ramp().view(), &params, FillMode::Nearest, 0.0);
        // output column c samples source column c + 2
        assert_eq!(out[[0, 0, 0]], 2.0);
        assert_eq!(out[[0, 2, 0]], 4.0);
        assert_eq!(out[[0, 4, 0]], 4.0);
    }

    #[test]
    fn constant_fill_uses_cval() {
        let params = TransformParams {
            tx: -1.0,
            ..TransformParams::default()
        };
        let out = apply_transform(ramp().view(), &params, FillMode::Constant, -7.0);
        assert!(out.index_axis(Axis(0), 0).iter().all(|&v| v == -7.0));
        assert_eq!(out[[1, 0, 0]], 0.0);
    }

    #[test]
    fn horizontal_flip_mirrors_columns() {
        let params = TransformParams {
            flip_horizontal: true,
            ..TransformParams::default()
        };
        let out = apply_transform(ramp().view(), &params, FillMode::Nearest, 0.0);
        assert_eq!(out[[1, 0, 0]], 9.0);
        assert_eq!(out[[1, 4, 0]], 5.0);
    }

    #[test]
    fn fill_modes_resolve_out_of_range_indices() {
        assert_eq!(resolve_index(-1, 4, FillMode::Nearest), Some(0));
        assert_eq!(resolve_index(5, 4, FillMode::Wrap), Some(1));
        assert_eq!(resolve_index(-1, 4, FillMode::Reflect), Some(0));
        assert_eq!(resolve_index(5, 4, FillMode::Reflect), Some(2));
        assert_eq!(resolve_index(4, 4, FillMode::Constant), None);
    }

    #[test]
    fn default_shift_stays_within_ten_percent() {
        let config = AugmentConfig {
            horizontal_flip: false,
            ..AugmentConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            let params = TransformParams::sample(&config, 20, 30, &mut rng);
            assert!(params.tx.abs() <= 2.0 + 1e-4);
            assert!(params.ty.abs() <= 3.0 + 1e-4);
            assert!(!params.flip_horizontal);
        }
    }

    #[test]
    fn standardize_applies_rescale_then_centering() {
        let config = AugmentConfig {
            rescale: Some(0.5),
            samplewise_center: true,
            ..AugmentConfig::identity()
        };
        let mut image = ramp();
        standardize(&mut image, &config);
        assert!(image.sum().abs() < 1e-4);
        assert!((image[[0, 1, 0]] - image[[0, 0, 0]] - 0.5).abs() < 1e-6);
    }
}
