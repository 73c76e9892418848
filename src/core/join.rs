//! Joining gold annotations with one model's prediction file.
//!
//! The key is the external sample id when every gold and prediction row has
//! one, otherwise the exact input text. Rows present on only one side, and
//! repeated keys on either side, are reported instead of dropped silently.
//! Every pair carries a distinct sample id.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::domain::{text_fingerprint, GoldRecord, JoinedPair, Language, PredictionRecord};

use super::parser::interpret_prediction;

/// Field used to match gold rows with prediction rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKey {
    SampleId,
    Text,
}

/// Matched pairs plus everything that did not match
#[derive(Debug, Clone)]
pub struct JoinReport {
    pub key: JoinKey,
    /// Pairs in gold order
    pub pairs: Vec<JoinedPair>,
    /// Keys of gold rows without a prediction
    pub unmatched_gold: Vec<String>,
    /// Keys of prediction rows without a gold row
    pub unmatched_predictions: Vec<String>,
    /// Prediction keys seen more than once (the first row wins)
    pub duplicate_predictions: Vec<String>,
    /// Gold rows whose key or sample id repeats an earlier row (the first row wins)
    pub duplicate_gold: Vec<String>,
}

impl JoinReport {
    /// True when every row on both sides found its partner exactly once
    pub fn is_clean(&self) -> bool {
        self.unmatched_gold.is_empty()
            && self.unmatched_predictions.is_empty()
            && self.duplicate_predictions.is_empty()
            && self.duplicate_gold.is_empty()
    }
}

fn has_id(id: &Option<String>) -> bool {
    id.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Pair gold rows with prediction rows and interpret each prediction.
pub fn join(gold: &[GoldRecord], predictions: &[PredictionRecord], language: Language) -> JoinReport {
    let key = if !predictions.is_empty()
        && predictions.iter().all(|p| has_id(&p.sample_id))
        && gold.iter().all(|g| has_id(&g.sample_id))
    {
        JoinKey::SampleId
    } else {
        JoinKey::Text
    };

    let gold_key = |g: &GoldRecord| match key {
        JoinKey::SampleId => g.sample_id.clone().unwrap_or_default().trim().to_string(),
        JoinKey::Text => g.text.clone(),
    };
    let prediction_key = |p: &PredictionRecord| match key {
        JoinKey::SampleId => p.sample_id.clone().unwrap_or_default().trim().to_string(),
        JoinKey::Text => p.text.clone(),
    };

    let mut by_key: HashMap<String, &PredictionRecord> = HashMap::new();
    let mut duplicate_predictions = Vec::new();
    for prediction in predictions {
        let k = prediction_key(prediction);
        if by_key.contains_key(&k) {
            duplicate_predictions.push(k);
        } else {
            by_key.insert(k, prediction);
        }
    }

    let mut used: HashSet<String> = HashSet::new();
    let mut seen_gold: HashSet<String> = HashSet::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut pairs = Vec::new();
    let mut unmatched_gold = Vec::new();
    let mut duplicate_gold = Vec::new();
    for record in gold {
        let k = gold_key(record);
        let sample_id = record
            .sample_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| text_fingerprint(&record.text));
        let new_key = seen_gold.insert(k.clone());
        let new_id = seen_ids.insert(sample_id.clone());
        if !(new_key && new_id) {
            duplicate_gold.push(k);
            continue;
        }

        let Some(prediction) = by_key.get(&k) else {
            unmatched_gold.push(k);
            continue;
        };

        let raw_labels = prediction.labels.clone().unwrap_or_default();
        pairs.push(JoinedPair {
            sample_id,
            text: record.text.clone(),
            gold: record.gold.clone(),
            prediction: interpret_prediction(Some(raw_labels.as_str()), language),
            raw_labels,
        });
        used.insert(k);
    }

    let mut unmatched_predictions = Vec::new();
    for k in predictions.iter().map(prediction_key) {
        if used.insert(k.clone()) {
            unmatched_predictions.push(k);
        }
    }

    let report = JoinReport {
        key,
        pairs,
        unmatched_gold,
        unmatched_predictions,
        duplicate_predictions,
        duplicate_gold,
    };
    if !report.is_clean() {
        warn!(
            key = ?key,
            matched = report.pairs.len(),
            unmatched_gold = report.unmatched_gold.len(),
            unmatched_predictions = report.unmatched_predictions.len(),
            duplicate_predictions = report.duplicate_predictions.len(),
            duplicate_gold = report.duplicate_gold.len(),
            "Join left rows unmatched"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, LabelSet, Prediction};

    fn set(ids: &[u32]) -> LabelSet {
        ids.iter().filter_map(|&id| Category::new(id)).collect()
    }

    fn gold(id: Option<&str>, text: &str, labels: &[u32]) -> GoldRecord {
        GoldRecord {
            sample_id: id.map(str::to_string),
            text: text.to_string(),
            gold: set(labels),
        }
    }

    #[test]
    fn test_join_by_text_reports_unmatched() {
        let gold_rows = vec![gold(None, "a", &[1]), gold(None, "b", &[2]), gold(None, "c", &[3])];
        let predictions = vec![
            PredictionRecord::new("a", "认同逻辑1", "raw"),
            PredictionRecord::new("b", "ERROR", "timeout"),
            PredictionRecord::new("b", "认同逻辑2", "raw"),
            PredictionRecord::new("z", "认同逻辑5", "raw"),
        ];

        let report = join(&gold_rows, &predictions, Language::Zh);
        assert_eq!(report.key, JoinKey::Text);
        assert_eq!(report.pairs.len(), 2);
        assert_eq!(report.pairs[0].prediction, Prediction::Labels(set(&[1])));
        // first row wins on duplicate keys
        assert_eq!(report.pairs[1].prediction, Prediction::CallFailure);
        assert_eq!(report.unmatched_gold, vec!["c".to_string()]);
        assert_eq!(report.unmatched_predictions, vec!["z".to_string()]);
        assert_eq!(report.duplicate_predictions, vec!["b".to_string()]);
        assert!(report.duplicate_gold.is_empty());
        assert!(!report.is_clean());
        assert_eq!(report.pairs[0].sample_id, text_fingerprint("a"));
    }

    #[test]
    fn test_join_by_sample_id() {
        let gold_rows = vec![gold(Some("17"), "same text", &[1]), gold(Some("18"), "same text", &[4])];
        let mut first = PredictionRecord::new("same text", "认同逻辑4", "raw");
        first.sample_id = Some("18".to_string());
        let mut second = PredictionRecord::new("same text", "认同逻辑1", "raw");
        second.sample_id = Some("17".to_string());

        let report = join(&gold_rows, &[first, second], Language::Zh);
        assert_eq!(report.key, JoinKey::SampleId);
        assert!(report.is_clean());
        assert_eq!(report.pairs[0].sample_id, "17");
        assert_eq!(report.pairs[0].predicted(), set(&[1]));
        assert_eq!(report.pairs[1].predicted(), set(&[4]));
    }

    #[test]
    fn test_repeated_gold_rows_pair_once() {
        let gold_rows = vec![gold(None, "same", &[7]), gold(None, "same", &[1]), gold(None, "other", &[2])];
        let predictions = vec![
            PredictionRecord::new("same", "认同逻辑2", "raw"),
            PredictionRecord::new("other", "认同逻辑2", "raw"),
        ];

        let report = join(&gold_rows, &predictions, Language::Zh);
        assert_eq!(report.pairs.len(), 2);
        assert_eq!(report.pairs[0].gold, set(&[7]));
        assert_eq!(report.duplicate_gold, vec!["same".to_string()]);
        assert!(report.unmatched_predictions.is_empty());
        assert!(!report.is_clean());
        assert_ne!(report.pairs[0].sample_id, report.pairs[1].sample_id);
    }

    #[test]
    fn test_repeated_gold_ids_under_text_key() {
        // Predictions lack ids, so the join falls back to text; the id still must not repeat
        let gold_rows = vec![gold(Some("5"), "first", &[1]), gold(Some("5"), "second", &[2])];
        let predictions = vec![
            PredictionRecord::new("first", "认同逻辑1", "raw"),
            PredictionRecord::new("second", "认同逻辑2", "raw"),
        ];

        let report = join(&gold_rows, &predictions, Language::Zh);
        assert_eq!(report.key, JoinKey::Text);
        assert_eq!(report.pairs.len(), 1);
        assert_eq!(report.duplicate_gold, vec!["second".to_string()]);
        assert_eq!(report.unmatched_predictions, vec!["second".to_string()]);
    }
}
