use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};

/// Labels used by [`write_two_class_dataset`], in sample order.
pub const CLASSES: [&str; 2] = ["dark", "light"];

/// Write `count` 4x4 grayscale PNGs plus a `path,label` manifest into `dir`.
///
/// Even samples are dark (`dark`), odd samples bright (`light`), each with a
/// small per-pixel ramp so no two images are identical.
pub fn write_two_class_dataset(dir: &Path, count: usize) -> PathBuf {
    std::fs::create_dir_all(dir.join("images")).expect("create image dir");
    let mut manifest = String::from("path,label\n");
    for idx in 0..count {
        let class = idx % 2;
        let base: u8 = if class == 0 { 20 } else { 200 };
        let image = GrayImage::from_fn(4, 4, |x, y| {
            Luma([base + ((x + 4 * y) as u8) + (idx as u8 % 7)])
        });
        let relative = format!("images/sample_{idx:02}.png");
        image.save(dir.join(&relative)).expect("write png");
        writeln!(manifest, "{relative},{}", CLASSES[class]).expect("format manifest row");
    }
    let path = dir.join("labels.csv");
    std::fs::write(&path, manifest).expect("write manifest");
    path
}
