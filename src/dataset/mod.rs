//! Labeled image datasets described by a CSV manifest.

mod error;
mod frame;
mod images;
mod manifest;
mod split;

use std::path::Path;

pub use error::DataError;
pub use frame::CombinedFrame;
pub use images::load_images;
pub use manifest::{Manifest, ManifestRow, read_manifest};
pub use split::{DatasetSplit, balance_classes, train_test_split};

/// Options for [`read_data`].
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions<'a> {
    pub label_column: Option<&'a str>,
    pub header: usize,
    pub balance: bool,
    pub train_size: f64,
    pub seed: u64,
}

/// Manifest split into train/test rows, with the resolved column names.
#[derive(Debug, Clone)]
pub struct ReadData {
    pub feature_column: String,
    pub label_column: String,
    pub split: DatasetSplit,
}

impl ReadData {
    /// Combined `(path, label)` frames for the train and test partitions.
    pub fn frames(&self) -> (CombinedFrame, CombinedFrame) {
        let frame = |rows: &[ManifestRow]| {
            CombinedFrame::from_rows(&self.feature_column, &self.label_column, rows)
        };
        (frame(&self.split.train), frame(&self.split.test))
    }
}

/// Read the manifest at `path`, optionally balance classes, and split it.
pub fn read_data(path: &Path, options: &ReadOptions<'_>) -> Result<ReadData, DataError> {
    let manifest = read_manifest(path, options.label_column, options.header)?;
    let total = manifest.rows.len();
    let rows = if options.balance {
        balance_classes(manifest.rows, options.seed)
    } else {
        manifest.rows
    };
    let split = train_test_split(rows, options.train_size, options.seed)?;
    tracing::info!(
        "Dataset {}: {} rows, {} train / {} test",
        path.display(),
        total,
        split.train.len(),
        split.test.len()
    );
    Ok(ReadData {
        feature_column: manifest.feature_column,
        label_column: manifest.label_column,
        split,
    })
}
