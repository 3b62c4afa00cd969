use thiserror::Error;

/// Errors raised while normalizing tensors or encoding labels.
#[derive(Debug, Error)]
pub enum PreprocessError {
    /// Train and test tensors disagree on their per-sample shape.
    #[error("Image shape mismatch: train {train:?}, test {test:?}")]
    ShapeMismatch {
        train: Vec<usize>,
        test: Vec<usize>,
    },
    /// Statistics cannot be computed from an empty tensor.
    #[error("Cannot fit normalization on an empty training tensor")]
    EmptyTensor,
    /// A label was not seen when the encoder was fitted.
    #[error("Unknown label {0:?}")]
    UnknownLabel(String),
    /// More distinct labels than the configured class count.
    #[error("Found {found} distinct labels but n_classes is {n_classes}")]
    TooManyClasses { found: usize, n_classes: usize },
    /// Integer labels imply a one-hot width beyond the inference limit.
    #[error("Integer labels imply {width} classes (limit {max}); set n_classes explicitly")]
    ClassWidth { width: usize, max: usize },
}
