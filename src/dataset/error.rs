use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading the manifest or decoding its images.
#[derive(Debug, Error)]
pub enum DataError {
    /// The manifest could not be opened or parsed as CSV.
    #[error("Failed to read manifest {path}: {source}")]
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    /// The manifest ends before the configured header row.
    #[error("Manifest {path} has no header row at index {header}")]
    MissingHeader { path: PathBuf, header: usize },
    /// The requested label column is not in the header.
    #[error("Label column {column:?} not found; available columns: {available:?}")]
    MissingLabelColumn {
        column: String,
        available: Vec<String>,
    },
    /// The header has no column besides the label.
    #[error("Manifest has no image path column besides {label_column:?}")]
    NoFeatureColumn { label_column: String },
    /// A data row is too short to hold the path or label field.
    #[error("Manifest row {line} is missing the {column:?} field")]
    MalformedRow { line: u64, column: String },
    /// Not enough rows to build both partitions.
    #[error("Need at least 2 rows to split, found {0}")]
    TooFewRows(usize),
    /// An image file could not be opened or decoded.
    #[error("Failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    /// An image does not match the shape of the first decoded image.
    #[error("Image {path} has shape {found:?}, expected {expected:?}")]
    ImageShape {
        path: PathBuf,
        expected: [usize; 3],
        found: [usize; 3],
    },
    /// An empty list of images was passed to the decoder.
    #[error("No images to decode")]
    NoImages,
}
