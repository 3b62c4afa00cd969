//! CSV manifest reader.

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};

use super::DataError;

/// One labeled image reference from the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    /// Zero-based position among the data rows.
    pub index: usize,
    /// Image path as written in the manifest.
    pub path: String,
    /// Raw categorical label.
    pub label: String,
}

/// Parsed manifest with resolved column names.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub feature_column: String,
    pub label_column: String,
    pub rows: Vec<ManifestRow>,
}

/// Read a manifest whose header sits at row `header`.
///
/// Rows above the header are ignored. The label column defaults to the last
/// header column; the image path column is the first other column.
pub fn read_manifest(
    path: &Path,
    label_column: Option<&str>,
    header: usize,
) -> Result<Manifest, DataError> {
    let csv_error = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let mut records = reader.records();
    let mut header_record: Option<StringRecord> = None;
    for _ in 0..=header {
        header_record = records.next().transpose().map_err(csv_error)?;
        if header_record.is_none() {
            break;
        }
    }
    let header_record = header_record.ok_or_else(|| DataError::MissingHeader {
        path: path.to_path_buf(),
        header,
    })?;
    let columns: Vec<String> = header_record.iter().map(str::to_string).collect();

    let label_idx = match label_column {
        Some(name) => columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| DataError::MissingLabelColumn {
                column: name.to_string(),
                available: columns.clone(),
            })?,
        None => columns
            .len()
            .checked_sub(1)
            .ok_or_else(|| DataError::MissingLabelColumn {
                column: String::new(),
                available: Vec::new(),
            })?,
    };
    let feature_idx = (0..columns.len())
        .find(|&idx| idx != label_idx)
        .ok_or_else(|| DataError::NoFeatureColumn {
            label_column: columns[label_idx].clone(),
        })?;

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(csv_error)?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map_or(0, |pos| pos.line());
        let field = |idx: usize| {
            record
                .get(idx)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| DataError::MalformedRow {
                    line,
                    column: columns[idx].clone(),
                })
        };
        let row = ManifestRow {
            index: rows.len(),
            path: field(feature_idx)?,
            label: field(label_idx)?,
        };
        rows.push(row);
    }
    tracing::debug!(
        "Read {} manifest rows from {} (path column {:?}, label column {:?})",
        rows.len(),
        path.display(),
        columns[feature_idx],
        columns[label_idx]
    );

    Ok(Manifest {
        feature_column: columns[feature_idx].clone(),
        label_column: columns[label_idx].clone(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_rows_after_header_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(
            &path,
            "exported by labeller v2\nfile,class,camera\na.png,cat,c1\nb.png,dog,c2\n\n",
        )
        .unwrap();

        let manifest = read_manifest(&path, Some("class"), 1).unwrap();
        assert_eq!(manifest.feature_column, "file");
        assert_eq!(manifest.label_column, "class");
        assert_eq!(manifest.rows.len(), 2);
        assert_eq!(manifest.rows[1].label, "dog");
        assert_eq!(manifest.rows[1].index, 1);
    }

    #[test]
    fn label_defaults_to_last_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, "file,label\nimg/a.png,0\nimg/b.png,1\n").unwrap();

        let manifest = read_manifest(&path, None, 0).unwrap();
        assert_eq!(manifest.feature_column, "file");
        assert_eq!(manifest.label_column, "label");
        assert_eq!(manifest.rows[0].path, "img/a.png");
    }

    #[test]
    fn missing_label_column_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, "file,label\na.png,0\n").unwrap();

        let err = read_manifest(&path, Some("class"), 0).unwrap_err();
        assert!(matches!(err, DataError::MissingLabelColumn { column, .. } if column == "class"));
    }

    #[test]
    fn unreadable_path_is_a_data_error() {
        let dir = tempdir().unwrap();
        let err = read_manifest(&dir.path().join("absent.csv"), None, 0).unwrap_err();
        assert!(matches!(err, DataError::Csv { .. }));
    }

    #[test]
    fn short_rows_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, "file,label\na.png\n").unwrap();

        let err = read_manifest(&path, None, 0).unwrap_err();
        assert!(matches!(err, DataError::MalformedRow { line: 2, .. }));
    }
}
