//! Input normalization and label encoding applied once after splitting.

mod error;
mod labels;
mod normalize;

pub use error::PreprocessError;
pub use labels::{LabelEncoder, MAX_INFERRED_CLASSES, argmax_rows};
pub use normalize::{NormalizationKind, normalize_images};
