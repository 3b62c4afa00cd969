use std::path::Path;

use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, s};

use super::DataError;

/// Decode images into one `N x H x W x C` tensor of raw 8-bit values.
///
/// Relative paths resolve against `root`. Grayscale images (with or without
/// alpha) decode to one channel, everything else to RGB. Every image must
/// decode to the shape of the first one unless `target_size` resizes them.
pub fn load_images<'a>(
    paths: impl ExactSizeIterator<Item = &'a str>,
    root: &Path,
    target_size: Option<[u32; 2]>,
) -> Result<Array4<f32>, DataError> {
    let count = paths.len();
    let mut tensor: Option<Array4<f32>> = None;
    for (i, relative) in paths.enumerate() {
        let path = root.join(relative);
        let decoded = image::open(&path).map_err(|source| DataError::Image {
            path: path.clone(),
            source,
        })?;
        let pixels = to_hwc(decoded, target_size);
        let found = [pixels.height, pixels.width, pixels.channels];
        let tensor = tensor
            .get_or_insert_with(|| Array4::zeros((count, found[0], found[1], found[2])));
        let expected = [tensor.shape()[1], tensor.shape()[2], tensor.shape()[3]];
        if found != expected {
            return Err(DataError::ImageShape {
                path,
                expected,
                found,
            });
        }
        let mut slot = tensor.slice_mut(s![i, .., .., ..]);
        for ((y, x, c), value) in slot.indexed_iter_mut() {
            *value = pixels.data[(y * pixels.width + x) * pixels.channels + c] as f32;
        }
    }
    tensor.ok_or(DataError::NoImages)
}

struct HwcPixels {
    height: usize,
    width: usize,
    channels: usize,
    data: Vec<u8>,
}

fn to_hwc(decoded: DynamicImage, target_size: Option<[u32; 2]>) -> HwcPixels {
    let decoded = match target_size {
        Some([height, width]) if decoded.height() != height || decoded.width() != width => {
            decoded.resize_exact(width, height, FilterType::Triangle)
        }
        _ => decoded,
    };
    let (height, width) = (decoded.height() as usize, decoded.width() as usize);
    let grayscale = !decoded.color().has_color();
    if grayscale {
        HwcPixels {
            height,
            width,
            channels: 1,
            data: decoded.to_luma8().into_raw(),
        }
    } else {
        HwcPixels {
            height,
            width,
            channels: 3,
            data: decoded.to_rgb8().into_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn decodes_grayscale_into_single_channel() {
        let dir = tempdir().unwrap();
        GrayImage::from_fn(4, 3, |x, y| Luma([(y * 4 + x) as u8 * 10]))
            .save(dir.path().join("a.png"))
            .unwrap();
        GrayImage::from_pixel(4, 3, Luma([255]))
            .save(dir.path().join("b.png"))
            .unwrap();

        let tensor = load_images(["a.png", "b.png"].into_iter(), dir.path(), None).unwrap();
        assert_eq!(tensor.shape(), &[2, 3, 4, 1]);
        assert_eq!(tensor[[0, 2, 3, 0]], 110.0);
        assert_eq!(tensor[[1, 0, 0, 0]], 255.0);
    }

    #[test]
    fn mismatched_sizes_fail_without_target_size() {
        let dir = tempdir().unwrap();
        RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]))
            .save(dir.path().join("a.png"))
            .unwrap();
        RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))
            .save(dir.path().join("b.png"))
            .unwrap();

        let paths = ["a.png", "b.png"];
        let err = load_images(paths.into_iter(), dir.path(), None).unwrap_err();
        assert!(matches!(err, DataError::ImageShape { found: [8, 8, 3], .. }));

        let tensor = load_images(paths.into_iter(), dir.path(), Some([4, 4])).unwrap();
        assert_eq!(tensor.shape(), &[2, 4, 4, 3]);
        assert_eq!(tensor[[0, 3, 3, 2]], 3.0);
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let dir = tempdir().unwrap();
        let err = load_images(["gone.png"].into_iter(), dir.path(), None).unwrap_err();
        assert!(matches!(err, DataError::Image { path, .. } if path.ends_with("gone.png")));
    }
}
