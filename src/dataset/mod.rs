//! Flat-file interchange.
//!
//! Every table is a CSV with a header row:
//!
//! - gold table: `text`, `Golden` (compact digits or `-`), optional `comment_id`
//! - prediction file: `Original_Input_Text`, `RL_Types`, `Raw_Model_Output`,
//!   optional `sample_id`; the file stem names the model and condition
//! - annotator round: any two named label columns, each with its own encoding

pub mod merge;

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::parser::{parse_category_list, parse_comma_digits, parse_compact, LabelParseError};
use crate::domain::{GoldRecord, LabelSet, Language, ModelRun, PredictionRecord};

pub use merge::{merge_tables, MergedTable};

/// Default glob for prediction files inside a directory
pub const DEFAULT_PREDICTION_GLOB: &str = "*.csv";

fn reader(path: &Path) -> Result<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))
}

#[derive(Debug, Deserialize)]
struct GoldRow {
    text: String,
    #[serde(rename = "Golden", default)]
    golden: Option<String>,
    #[serde(default)]
    comment_id: Option<String>,
}

/// Gold annotations plus the rows that could not be parsed
#[derive(Debug, Clone, Default)]
pub struct GoldTable {
    pub records: Vec<GoldRecord>,
    /// (1-based data row, error) for rejected rows
    pub rejected: Vec<(usize, String)>,
}

/// Load the gold table.
pub fn read_gold(path: &Path) -> Result<GoldTable> {
    let mut rdr = reader(path)?;
    let mut table = GoldTable::default();

    for (idx, row) in rdr.deserialize::<GoldRow>().enumerate() {
        let row = row.with_context(|| format!("Invalid gold row {} in {}", idx + 1, path.display()))?;
        match parse_compact(row.golden.as_deref()) {
            Ok(gold) => table.records.push(GoldRecord {
                sample_id: row.comment_id.filter(|id| !id.trim().is_empty()),
                text: row.text,
                gold,
            }),
            Err(e) => {
                warn!(row = idx + 1, error = %e, "Skipping gold row with invalid label");
                table.rejected.push((idx + 1, e.to_string()));
            }
        }
    }

    debug!(path = %path.display(), rows = table.records.len(), "Loaded gold table");
    Ok(table)
}

/// Load one prediction file
pub fn read_predictions(path: &Path) -> Result<Vec<PredictionRecord>> {
    let mut rdr = reader(path)?;
    rdr.deserialize::<PredictionRecord>()
        .enumerate()
        .map(|(idx, row)| row.with_context(|| format!("Invalid prediction row {} in {}", idx + 1, path.display())))
        .collect()
}

/// Write a prediction file, replacing any existing one
pub fn write_predictions(path: &Path, records: &[PredictionRecord]) -> Result<()> {
    write_rows(path, records)
}

/// Serialize rows to a CSV file with a header row
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

/// Model/condition named by a prediction file's stem
pub fn model_run_for(path: &Path) -> ModelRun {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    ModelRun::from_file_stem(stem)
}

/// Prediction files in `dir` matching `pattern`, sorted by path
pub fn discover_prediction_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dir.join(pattern);
    let full = full
        .to_str()
        .with_context(|| format!("Non-UTF-8 path: {}", full.display()))?;

    let mut files: Vec<PathBuf> = glob::glob(full)
        .with_context(|| format!("Invalid glob pattern: {}", full))?
        .filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(path),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path");
                None
            }
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Column values of one input table
pub fn read_column(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut rdr = reader(path)?;
    let headers = rdr.headers()?.clone();
    let index = headers
        .iter()
        .position(|h| h == column)
        .with_context(|| format!("Column '{}' not found in {}", column, path.display()))?;

    let mut values = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Invalid row {} in {}", idx + 1, path.display()))?;
        values.push(record.get(index).unwrap_or_default().to_string());
    }
    Ok(values)
}

/// Encodings a label column can use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelEncoding {
    /// `147`
    Compact,
    /// `1,4,7`
    CommaDigits,
    /// `认同逻辑1, 认同逻辑4`
    CategoryList,
}

impl LabelEncoding {
    pub fn parse(self, value: Option<&str>, language: Language) -> Result<LabelSet, LabelParseError> {
        match self {
            LabelEncoding::Compact => parse_compact(value),
            LabelEncoding::CommaDigits => parse_comma_digits(value),
            LabelEncoding::CategoryList => Ok(parse_category_list(value, language)),
        }
    }
}

/// A named label column and its encoding
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub encoding: LabelEncoding,
}

/// Two aligned annotation columns from one round file
#[derive(Debug, Clone, Default)]
pub struct AnnotationColumns {
    pub reference: Vec<LabelSet>,
    pub comparison: Vec<LabelSet>,
    /// Rows dropped because either cell failed to parse
    pub skipped: usize,
}

/// Load two label columns for an agreement study.
///
/// A row whose cell fails to parse in either column is dropped from both so
/// the sequences stay aligned.
pub fn read_annotation_columns(
    path: &Path,
    reference: &ColumnSpec,
    comparison: &ColumnSpec,
    language: Language,
) -> Result<AnnotationColumns> {
    let mut rdr = reader(path)?;
    let headers = rdr.headers()?.clone();
    let find = |spec: &ColumnSpec| {
        headers
            .iter()
            .position(|h| h == spec.name)
            .with_context(|| format!("Column '{}' not found in {}", spec.name, path.display()))
    };
    let reference_idx = find(reference)?;
    let comparison_idx = find(comparison)?;

    let mut columns = AnnotationColumns::default();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Invalid row {} in {}", idx + 1, path.display()))?;
        let a = reference.encoding.parse(record.get(reference_idx), language);
        let b = comparison.encoding.parse(record.get(comparison_idx), language);
        match (a, b) {
            (Ok(a), Ok(b)) => {
                columns.reference.push(a);
                columns.comparison.push(b);
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(row = idx + 1, error = %e, "Skipping annotation row");
                columns.skipped += 1;
            }
        }
    }
    Ok(columns)
}
