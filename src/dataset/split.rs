use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{SeedableRng, seq::SliceRandom};

use super::{DataError, ManifestRow};

/// Disjoint train/test partitions of the manifest rows.
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: Vec<ManifestRow>,
    pub test: Vec<ManifestRow>,
}

/// Downsample every class to the size of the rarest class.
///
/// Surviving rows keep their manifest order.
pub fn balance_classes(rows: Vec<ManifestRow>, seed: u64) -> Vec<ManifestRow> {
    let mut by_class: BTreeMap<String, Vec<ManifestRow>> = BTreeMap::new();
    for row in rows {
        by_class.entry(row.label.clone()).or_default().push(row);
    }
    let Some(keep) = by_class.values().map(Vec::len).min() else {
        return Vec::new();
    };
    let mut rng = StdRng::seed_from_u64(seed);
    let mut kept = Vec::with_capacity(keep * by_class.len());
    for (label, mut class_rows) in by_class {
        if class_rows.len() > keep {
            tracing::debug!(
                "Balancing class {label:?}: dropping {} of {} rows",
                class_rows.len() - keep,
                class_rows.len()
            );
        }
        class_rows.shuffle(&mut rng);
        class_rows.truncate(keep);
        kept.extend(class_rows);
    }
    kept.sort_by_key(|row| row.index);
    kept
}

/// Shuffle rows and assign `round(n * train_size)` of them to training.
///
/// Both partitions keep at least one row.
pub fn train_test_split(
    rows: Vec<ManifestRow>,
    train_size: f64,
    seed: u64,
) -> Result<DatasetSplit, DataError> {
    let n = rows.len();
    if n < 2 {
        return Err(DataError::TooFewRows(n));
    }
    let train_n = ((n as f64) * train_size).round() as usize;
    let train_n = train_n.clamp(1, n - 1);

    let mut rows = rows;
    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);
    let test = rows.split_off(train_n);
    Ok(DatasetSplit { train: rows, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn rows(labels: &[&str]) -> Vec<ManifestRow> {
        labels
            .iter()
            .enumerate()
            .map(|(index, label)| ManifestRow {
                index,
                path: format!("img_{index}.png"),
                label: label.to_string(),
            })
            .collect()
    }

    #[test]
    fn split_is_disjoint_and_covers_rows() {
        for (n, ratio) in [(20usize, 0.8), (7, 0.5), (10, 0.33), (3, 0.9)] {
            let labels = vec!["a"; n];
            let split = train_test_split(rows(&labels), ratio, 7).unwrap();
            let expected = (((n as f64) * ratio).round() as usize).clamp(1, n - 1);
            assert_eq!(split.train.len(), expected);
            assert_eq!(split.train.len() + split.test.len(), n);

            let train: BTreeSet<usize> = split.train.iter().map(|r| r.index).collect();
            let test: BTreeSet<usize> = split.test.iter().map(|r| r.index).collect();
            assert!(train.is_disjoint(&test));
            assert_eq!(train.union(&test).count(), n);
        }
    }

    #[test]
    fn split_is_deterministic_for_a_seed() {
        let labels = ["a", "b", "a", "b", "a", "b"];
        let first = train_test_split(rows(&labels), 0.5, 11).unwrap();
        let second = train_test_split(rows(&labels), 0.5, 11).unwrap();
        assert_eq!(first.train, second.train);
    }

    #[test]
    fn split_needs_two_rows() {
        assert!(matches!(
            train_test_split(rows(&["a"]), 0.5, 0),
            Err(DataError::TooFewRows(1))
        ));
    }

    #[test]
    fn balance_downsamples_to_rarest_class() {
        let balanced = balance_classes(rows(&["a", "a", "a", "b", "a", "b"]), 3);
        let a = balanced.iter().filter(|r| r.label == "a").count();
        let b = balanced.iter().filter(|r| r.label == "b").count();
        assert_eq!((a, b), (2, 2));
        assert!(balanced.windows(2).all(|w| w[0].index < w[1].index));
    }
}
