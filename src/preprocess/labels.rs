use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array2, ArrayView2, Axis};

use super::PreprocessError;

/// Upper bound on a one-hot width inferred from integer labels.
pub const MAX_INFERRED_CLASSES: usize = 4096;

/// Maps raw categorical labels to class indices and one-hot rows.
///
/// Labels that are all canonical non-negative integers (`"0"`, `"7"`, not
/// `"07"`) keep their integer value as the class index. Any other label set is
/// indexed in sorted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: BTreeMap<String, usize>,
}

impl LabelEncoder {
    /// Build an encoder over `labels`, widening to `n_classes` when given.
    pub fn fit<'a>(
        labels: impl IntoIterator<Item = &'a str>,
        n_classes: Option<usize>,
    ) -> Result<Self, PreprocessError> {
        let distinct: BTreeSet<&str> = labels.into_iter().collect();
        let numeric: Option<Vec<usize>> = distinct
            .iter()
            .map(|label| {
                label
                    .parse::<usize>()
                    .ok()
                    .filter(|value| value.to_string() == *label)
            })
            .collect();

        let (classes, index) = match numeric {
            Some(values) if !values.is_empty() => {
                let inferred = values.iter().max().map_or(0, |max| max + 1);
                let width = match n_classes {
                    Some(n) => n,
                    None if inferred > MAX_INFERRED_CLASSES => {
                        return Err(PreprocessError::ClassWidth {
                            width: inferred,
                            max: MAX_INFERRED_CLASSES,
                        });
                    }
                    None => {
                        if inferred > 2 * values.len() {
                            tracing::warn!(
                                "Integer labels span {inferred} classes but only {} are used",
                                values.len()
                            );
                        }
                        inferred
                    }
                };
                if let Some(&max) = values.iter().max()
                    && max >= width
                {
                    return Err(PreprocessError::TooManyClasses {
                        found: max + 1,
                        n_classes: width,
                    });
                }
                let classes = (0..width).map(|idx| idx.to_string()).collect::<Vec<_>>();
                let index = distinct
                    .iter()
                    .zip(values)
                    .map(|(label, value)| (label.to_string(), value))
                    .collect();
                (classes, index)
            }
            _ => {
                let mut classes: Vec<String> = distinct.iter().map(|s| s.to_string()).collect();
                if let Some(n) = n_classes {
                    if classes.len() > n {
                        return Err(PreprocessError::TooManyClasses {
                            found: classes.len(),
                            n_classes: n,
                        });
                    }
                    // Unused trailing slots keep the one-hot width at n_classes.
                    for idx in classes.len()..n {
                        classes.push(format!("<unused_{idx}>"));
                    }
                }
                let index = classes
                    .iter()
                    .cloned()
                    .enumerate()
                    .map(|(idx, class_id)| (class_id, idx))
                    .collect();
                (classes, index)
            }
        };
        Ok(Self { classes, index })
    }

    /// One-hot width.
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn encode(&self, label: &str) -> Result<usize, PreprocessError> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| PreprocessError::UnknownLabel(label.to_string()))
    }

    /// Encode labels into an `N x n_classes` one-hot matrix.
    pub fn one_hot<S: AsRef<str>>(&self, labels: &[S]) -> Result<Array2<f32>, PreprocessError> {
        let mut out = Array2::<f32>::zeros((labels.len(), self.n_classes()));
        for (row, label) in labels.iter().enumerate() {
            let class = self.encode(label.as_ref())?;
            out[[row, class]] = 1.0;
        }
        Ok(out)
    }

    pub fn decode(&self, class: usize) -> Option<&str> {
        self.classes.get(class).map(String::as_str)
    }

    /// Recover raw labels from one-hot (or probability) rows via argmax.
    pub fn decode_one_hot(&self, rows: ArrayView2<'_, f32>) -> Vec<String> {
        argmax_rows(rows)
            .into_iter()
            .map(|class| self.decode(class).unwrap_or_default().to_string())
            .collect()
    }
}

/// Index of the largest value in each row; ties resolve to the first index.
pub fn argmax_rows(rows: ArrayView2<'_, f32>) -> Vec<usize> {
    rows.axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0usize;
            let mut best_val = f32::NEG_INFINITY;
            for (idx, &v) in row.iter().enumerate() {
                if v > best_val {
                    best_val = v;
                    best = idx;
                }
            }
            best
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hot_then_argmax_returns_original_labels() {
        let labels = ["cat", "dog", "bird", "dog", "cat"];
        let encoder = LabelEncoder::fit(labels.iter().copied(), None).unwrap();
        let encoded = encoder.one_hot(&labels).unwrap();
        assert_eq!(encoded.dim(), (5, 3));
        assert!(encoded.rows().into_iter().all(|row| row.sum() == 1.0));
        assert_eq!(encoder.decode_one_hot(encoded.view()), labels);

        // "1" and "01" are distinct labels, not one integer class.
        let padded = ["1", "01", "2"];
        let encoder = LabelEncoder::fit(padded.iter().copied(), None).unwrap();
        assert_eq!(encoder.n_classes(), 3);
        let encoded = encoder.one_hot(&padded).unwrap();
        assert_eq!(encoder.decode_one_hot(encoded.view()), padded);
    }

    #[test]
    fn integer_ids_cannot_inflate_the_inferred_width() {
        let err = LabelEncoder::fit(["3", "5000"], None).unwrap_err();
        assert!(matches!(
            err,
            PreprocessError::ClassWidth {
                width: 5001,
                max: MAX_INFERRED_CLASSES
            }
        ));
        // An explicit class count is honored as given.
        let encoder = LabelEncoder::fit(["2019"], Some(2020)).unwrap();
        assert_eq!(encoder.n_classes(), 2020);
        // Sparse but modest ids are still accepted.
        assert_eq!(LabelEncoder::fit(["0", "9"], None).unwrap().n_classes(), 10);
    }

    #[test]
    fn integer_labels_keep_their_index() {
        let labels = ["2", "0", "2"];
        let encoder = LabelEncoder::fit(labels.iter().copied(), Some(4)).unwrap();
        assert_eq!(encoder.n_classes(), 4);
        let encoded = encoder.one_hot(&labels).unwrap();
        assert_eq!(encoded[[0, 2]], 1.0);
        assert_eq!(encoded[[1, 0]], 1.0);
        assert_eq!(encoder.decode_one_hot(encoded.view()), labels);
    }

    #[test]
    fn class_count_smaller_than_labels_is_rejected() {
        let err = LabelEncoder::fit(["a", "b", "c"], Some(2)).unwrap_err();
        assert!(matches!(
            err,
            PreprocessError::TooManyClasses {
                found: 3,
                n_classes: 2
            }
        ));
        assert!(LabelEncoder::fit(["0", "5"], Some(3)).is_err());
    }

    #[test]
    fn unknown_label_fails_encoding() {
        let encoder = LabelEncoder::fit(["a", "b"], None).unwrap();
        assert!(matches!(
            encoder.one_hot(&["c"]),
            Err(PreprocessError::UnknownLabel(label)) if label == "c"
        ));
    }
}
