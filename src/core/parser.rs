//! Label Set Parser.
//!
//! Three encodings reach the evaluation core:
//!
//! - **Compact digits** (gold column): `147` means {1, 4, 7}; `-` or a
//!   missing value means the annotator assigned no category. Numeric-typed
//!   values such as `4.0` are coerced to integers first. Every digit is one
//!   category id; multi-digit ids cannot be expressed.
//! - **Category-name list** (model predictions): `认同逻辑1, 认同逻辑4`.
//!   Tokens without a known prefix, or with a malformed suffix, are skipped
//!   with a warning and never abort the rest of the list.
//! - **Comma digits** (second annotator column): `1,4,7`.
//!
//! [`interpret_prediction`] lifts a raw prediction cell into the tagged
//! [`Prediction`] so that empty labels and parse failures stay distinct.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::domain::{
    Category, LabelSet, Language, ParseFailure, Prediction, CALL_ERROR_SENTINEL, EMPTY_SENTINEL,
    NO_MARKER_SENTINEL,
};

/// Marker used by annotators for "no applicable category"
pub const NO_LABEL_MARKER: &str = "-";

/// Label parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelParseError {
    #[error("Label value is not a non-negative integer: '{0}'")]
    NotNumeric(String),

    #[error("Unknown category id {id} in label value '{value}'")]
    UnknownCategory { id: u32, value: String },

    #[error("Invalid label token '{token}' in label value '{value}'")]
    InvalidToken { token: String, value: String },
}

/// Treat missing, blank and `-` values as "no category"
fn blank_or_marker(value: Option<&str>) -> Option<&str> {
    match value.map(str::trim) {
        None | Some("") | Some(NO_LABEL_MARKER) => None,
        Some(v) => Some(v),
    }
}

/// Coerce `147`, `147.0` or `4.0` into its integer digit string
fn integral_digits(value: &str) -> Result<String, LabelParseError> {
    if value.chars().all(|c| c.is_ascii_digit()) {
        let trimmed = value.trim_start_matches('0');
        return Ok(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() });
    }

    let number: f64 = value
        .parse()
        .map_err(|_| LabelParseError::NotNumeric(value.to_string()))?;

    if !number.is_finite() || number < 0.0 || number.fract() != 0.0 || number > u64::MAX as f64 {
        return Err(LabelParseError::NotNumeric(value.to_string()));
    }

    Ok((number as u64).to_string())
}

/// Parse the compact digit-string encoding used by the gold column.
pub fn parse_compact(value: Option<&str>) -> Result<LabelSet, LabelParseError> {
    let Some(value) = blank_or_marker(value) else {
        return Ok(LabelSet::new());
    };

    integral_digits(value)?
        .chars()
        .map(|c| {
            let id = c.to_digit(10).unwrap_or(0);
            Category::new(id).ok_or_else(|| LabelParseError::UnknownCategory {
                id,
                value: value.to_string(),
            })
        })
        .collect()
}

/// Parse the comma-separated digit encoding (`1,4,7`).
pub fn parse_comma_digits(value: Option<&str>) -> Result<LabelSet, LabelParseError> {
    let Some(value) = blank_or_marker(value) else {
        return Ok(LabelSet::new());
    };

    value
        .split(',')
        .map(str::trim)
        .map(|token| {
            let id: u32 = token.parse().map_err(|_| LabelParseError::InvalidToken {
                token: token.to_string(),
                value: value.to_string(),
            })?;
            Category::new(id).ok_or_else(|| LabelParseError::UnknownCategory {
                id,
                value: value.to_string(),
            })
        })
        .collect()
}

/// Result of scanning a category-name list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListScan {
    pub labels: LabelSet,
    /// Tokens that yielded a valid category
    pub recognized: usize,
    /// Tokens that were skipped
    pub skipped: usize,
}

/// Digits following the first prefix occurrence, up to any repeated prefix
fn suffix_after_prefix<'a>(token: &'a str, language: Language) -> Option<&'a str> {
    language.label_prefixes().iter().find_map(|prefix| {
        let start = token.find(prefix)? + prefix.len();
        let rest = &token[start..];
        let end = rest.find(prefix).unwrap_or(rest.len());
        Some(rest[..end].trim())
    })
}

/// Scan a category-name list, keeping per-token accounting.
pub fn scan_category_list(value: &str, language: Language) -> ListScan {
    let mut categories = Vec::new();
    let mut skipped = 0;

    for token in value.split([',', '，']).map(str::trim).filter(|t| !t.is_empty()) {
        let Some(suffix) = suffix_after_prefix(token, language) else {
            warn!(token, value, "Skipping label token without category prefix");
            skipped += 1;
            continue;
        };

        match suffix.parse::<u32>().ok().and_then(Category::new) {
            Some(category) => categories.push(category),
            None => {
                warn!(token, value, "Could not parse category number from label token");
                skipped += 1;
            }
        }
    }

    ListScan {
        recognized: categories.len(),
        labels: categories.into_iter().collect(),
        skipped,
    }
}

/// Parse the category-name list encoding; blank input yields the empty set.
pub fn parse_category_list(value: Option<&str>, language: Language) -> LabelSet {
    match value.map(str::trim) {
        None | Some("") => LabelSet::new(),
        Some(v) => scan_category_list(v, language).labels,
    }
}

/// Interpret a prediction cell written by the runner.
pub fn interpret_prediction(cell: Option<&str>, language: Language) -> Prediction {
    let value = match cell.map(str::trim) {
        None | Some("") => return Prediction::Empty,
        Some(v) => v,
    };

    if value == CALL_ERROR_SENTINEL {
        return Prediction::CallFailure;
    }
    if value == NO_MARKER_SENTINEL {
        return Prediction::ParseFailure(ParseFailure::NoMarker);
    }
    if value == EMPTY_SENTINEL
        || value == NO_LABEL_MARKER
        || language.empty_placeholders().contains(&value)
    {
        return Prediction::Empty;
    }

    let scan = scan_category_list(value, language);
    if scan.recognized == 0 {
        Prediction::ParseFailure(ParseFailure::Unrecognized)
    } else {
        Prediction::Labels(scan.labels)
    }
}

static ZH_LABEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"认同逻辑\s*(\d+)").expect("valid zh label pattern"));

static EN_LABEL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:Recognition Logic\s*|RL)(\d+)").expect("valid en label pattern")
});

/// Rewrite free text into a canonical label list.
///
/// Every `<prefix><digits>` occurrence is kept once, in order of first
/// appearance, and joined with `", "`. A bare `-` is preserved; text without
/// any occurrence becomes an empty string.
pub fn canonicalize_label_list(text: &str, language: Language) -> String {
    if text.trim() == NO_LABEL_MARKER {
        return NO_LABEL_MARKER.to_string();
    }

    let pattern = match language {
        Language::Zh => &*ZH_LABEL_PATTERN,
        Language::En => &*EN_LABEL_PATTERN,
    };

    let mut seen: Vec<String> = Vec::new();
    for captures in pattern.captures_iter(text) {
        let label = format!("{}{}", language.canonical_prefix(), &captures[1]);
        if !seen.contains(&label) {
            seen.push(label);
        }
    }
    seen.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u32]) -> LabelSet {
        ids.iter().filter_map(|&id| Category::new(id)).collect()
    }

    #[test]
    fn test_compact_basic() {
        assert_eq!(parse_compact(Some("147")).unwrap(), set(&[1, 4, 7]));
        assert_eq!(parse_compact(Some(" 5 ")).unwrap(), set(&[5]));
    }

    #[test]
    fn test_compact_numeric_coercion() {
        assert_eq!(parse_compact(Some("4.0")).unwrap(), set(&[4]));
        assert_eq!(parse_compact(Some("136.0")).unwrap(), set(&[1, 3, 6]));
    }

    #[test]
    fn test_compact_empty_markers() {
        assert!(parse_compact(None).unwrap().is_empty());
        assert!(parse_compact(Some("-")).unwrap().is_empty());
        assert!(parse_compact(Some("  ")).unwrap().is_empty());
    }

    #[test]
    fn test_compact_rejects_invalid() {
        assert!(matches!(
            parse_compact(Some("18")),
            Err(LabelParseError::UnknownCategory { id: 8, .. })
        ));
        assert!(matches!(
            parse_compact(Some("RL1")),
            Err(LabelParseError::NotNumeric(_))
        ));
        assert!(parse_compact(Some("1.5")).is_err());
    }

    #[test]
    fn test_comma_digits() {
        assert_eq!(parse_comma_digits(Some("1,4,7")).unwrap(), set(&[1, 4, 7]));
        assert_eq!(parse_comma_digits(Some("2, 2")).unwrap(), set(&[2]));
        assert!(parse_comma_digits(Some("-")).unwrap().is_empty());
        assert!(parse_comma_digits(Some("1,x")).is_err());
    }

    #[test]
    fn test_category_list_skips_bad_tokens() {
        let scan = scan_category_list("认同逻辑1, 其他, 认同逻辑x, 认同逻辑4", Language::Zh);
        assert_eq!(scan.labels, set(&[1, 4]));
        assert_eq!(scan.recognized, 2);
        assert_eq!(scan.skipped, 2);
    }

    #[test]
    fn test_category_list_english_prefixes() {
        assert_eq!(
            parse_category_list(Some("Recognition Logic 3, RL4"), Language::En),
            set(&[3, 4])
        );
        assert!(parse_category_list(Some(""), Language::En).is_empty());
    }

    #[test]
    fn test_category_list_unknown_id_is_skipped() {
        assert_eq!(
            parse_category_list(Some("认同逻辑9, 认同逻辑2"), Language::Zh),
            set(&[2])
        );
    }

    #[test]
    fn test_interpret_prediction_variants() {
        assert_eq!(interpret_prediction(Some("ERROR"), Language::Zh), Prediction::CallFailure);
        assert_eq!(
            interpret_prediction(Some("PARSE_ERROR_NO_MARKER"), Language::Zh),
            Prediction::ParseFailure(ParseFailure::NoMarker)
        );
        assert_eq!(interpret_prediction(Some("N/A"), Language::Zh), Prediction::Empty);
        assert_eq!(interpret_prediction(None, Language::Zh), Prediction::Empty);
        assert_eq!(interpret_prediction(Some("无"), Language::Zh), Prediction::Empty);
        assert_eq!(
            interpret_prediction(Some("I cannot decide"), Language::En),
            Prediction::ParseFailure(ParseFailure::Unrecognized)
        );
        assert_eq!(
            interpret_prediction(Some("RL1, RL4"), Language::En),
            Prediction::Labels(set(&[1, 4]))
        );
    }

    #[test]
    fn test_canonicalize_dedups_in_order() {
        assert_eq!(
            canonicalize_label_list("[认同逻辑3] 以及 认同逻辑1，认同逻辑3", Language::Zh),
            "认同逻辑3, 认同逻辑1"
        );
        assert_eq!(canonicalize_label_list("RL2 and RL2, RL5", Language::En), "RL2, RL5");
        assert_eq!(canonicalize_label_list("-", Language::En), "-");
        assert_eq!(canonicalize_label_list("nothing", Language::En), "");
    }
}
