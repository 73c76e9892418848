//! Wide comparison table: the gold table with one canonical label column per
//! prediction file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::core::parser::canonicalize_label_list;
use crate::domain::Language;

use super::{read_predictions, reader};

/// Merged table ready to be written out
#[derive(Debug, Clone)]
pub struct MergedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Per added column, base rows that had no prediction
    pub unmatched: Vec<(String, usize)>,
}

impl MergedTable {
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let mut wtr =
            csv::Writer::from_path(path).with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Append a canonicalised label column for every prediction file.
///
/// Rows are matched on `text_column` of the base table against each file's
/// input text. Missing predictions stay blank and are counted.
pub fn merge_tables(
    base: &Path,
    text_column: &str,
    prediction_files: &[PathBuf],
    language: Language,
) -> Result<MergedTable> {
    let mut rdr = reader(base)?;
    let mut headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let text_idx = headers
        .iter()
        .position(|h| h == text_column)
        .with_context(|| format!("Column '{}' not found in {}", text_column, base.display()))?;

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Invalid row {} in {}", idx + 1, base.display()))?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    let mut unmatched = Vec::new();
    for file in prediction_files {
        let column = file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let by_text: HashMap<String, String> = read_predictions(file)?
            .into_iter()
            .map(|p| (p.text, p.labels.unwrap_or_default()))
            .collect();

        let mut missing = 0;
        for row in &mut rows {
            let cell = match by_text.get(&row[text_idx]) {
                Some(labels) => canonicalize_label_list(labels, language),
                None => {
                    missing += 1;
                    String::new()
                }
            };
            row.push(cell);
        }
        if missing > 0 {
            warn!(column = %column, missing, "Rows without a prediction in merged column");
        }
        headers.push(column.clone());
        unmatched.push((column, missing));
    }

    Ok(MergedTable {
        headers,
        rows,
        unmatched,
    })
}
