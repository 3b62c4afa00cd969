use super::ManifestRow;

/// Two-column table of image paths and labels for one partition.
///
/// The path column always comes first and the label column second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedFrame {
    columns: [String; 2],
    paths: Vec<String>,
    labels: Vec<String>,
}

impl CombinedFrame {
    pub fn from_rows(feature_column: &str, label_column: &str, rows: &[ManifestRow]) -> Self {
        Self {
            columns: [feature_column.to_string(), label_column.to_string()],
            paths: rows.iter().map(|row| row.path.clone()).collect(),
            labels: rows.iter().map(|row| row.label.clone()).collect(),
        }
    }

    /// Column names in `[path, label]` order.
    pub fn columns(&self) -> &[String; 2] {
        &self.columns
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterate `(path, label)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.paths
            .iter()
            .map(String::as_str)
            .zip(self.labels.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_column_comes_first() {
        let rows = vec![ManifestRow {
            index: 0,
            path: "a.png".into(),
            label: "cat".into(),
        }];
        let frame = CombinedFrame::from_rows("file", "class", &rows);
        assert_eq!(frame.columns(), &["file".to_string(), "class".to_string()]);
        assert_eq!(frame.iter().collect::<Vec<_>>(), vec![("a.png", "cat")]);
    }
}
