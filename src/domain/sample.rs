//! Samples, prediction sources and evaluation pairs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::label_set::{LabelSet, Prediction};

/// Prompting condition a prediction file was produced under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    ZeroShot,
    FewShot,
    NoCot,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Condition::ZeroShot, Condition::FewShot, Condition::NoCot];

    /// File-stem suffix, e.g. `few_shot`
    pub fn slug(self) -> &'static str {
        match self {
            Condition::ZeroShot => "zero_shot",
            Condition::FewShot => "few_shot",
            Condition::NoCot => "no_cot",
        }
    }

    /// Human-readable label, e.g. `Few-shot`
    pub fn label(self) -> &'static str {
        match self {
            Condition::ZeroShot => "Zero-shot",
            Condition::FewShot => "Few-shot",
            Condition::NoCot => "No CoT",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Condition::ALL
            .into_iter()
            .find(|c| c.slug() == normalized)
            .ok_or_else(|| format!("unknown prompting condition '{}'", s))
    }
}

/// One model queried under one condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRun {
    pub model: String,
    pub condition: Option<Condition>,
}

impl ModelRun {
    pub fn new(model: impl Into<String>, condition: Option<Condition>) -> Self {
        Self {
            model: model.into(),
            condition,
        }
    }

    /// Split a prediction file stem such as `gpt41_few_shot` into model and condition
    pub fn from_file_stem(stem: &str) -> Self {
        for condition in Condition::ALL {
            let suffix = format!("_{}", condition.slug());
            if let Some(model) = stem.strip_suffix(&suffix) {
                if !model.is_empty() {
                    return Self::new(model, Some(condition));
                }
            }
        }
        Self::new(stem, None)
    }

    /// Display name such as `gpt41 (Few-shot)`
    pub fn display_name(&self) -> String {
        match self.condition {
            Some(condition) => format!("{} ({})", self.model, condition.label()),
            None => self.model.clone(),
        }
    }
}

impl fmt::Display for ModelRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Stable short fingerprint of a sample text (first 16 hex chars of SHA-256)
pub fn text_fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// A gold-annotated sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldRecord {
    pub sample_id: Option<String>,
    pub text: String,
    pub gold: LabelSet,
}

/// One row of a prediction file, before interpretation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(rename = "Original_Input_Text")]
    pub text: String,
    #[serde(rename = "RL_Types", default)]
    pub labels: Option<String>,
    #[serde(rename = "Raw_Model_Output", default)]
    pub raw_output: Option<String>,
    #[serde(default)]
    pub sample_id: Option<String>,
}

impl PredictionRecord {
    pub fn new(text: impl Into<String>, labels: impl Into<String>, raw_output: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            labels: Some(labels.into()),
            raw_output: Some(raw_output.into()),
            sample_id: None,
        }
    }
}

/// A gold label set paired with one model's interpreted prediction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedPair {
    /// External sample id, or the text fingerprint when none exists
    pub sample_id: String,
    pub text: String,
    pub gold: LabelSet,
    pub prediction: Prediction,
    /// The prediction cell as it appeared in the file
    pub raw_labels: String,
}

impl JoinedPair {
    /// Predicted label set used for metrics (failures are empty)
    pub fn predicted(&self) -> LabelSet {
        self.prediction.labels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_run_from_stem() {
        let run = ModelRun::from_file_stem("Qwen3-235B-A22B_few_shot");
        assert_eq!(run.model, "Qwen3-235B-A22B");
        assert_eq!(run.condition, Some(Condition::FewShot));
        assert_eq!(run.display_name(), "Qwen3-235B-A22B (Few-shot)");

        let run = ModelRun::from_file_stem("gpt41_no_cot");
        assert_eq!(run.condition, Some(Condition::NoCot));

        let run = ModelRun::from_file_stem("annotator");
        assert_eq!(run.condition, None);
        assert_eq!(run.display_name(), "annotator");
    }

    #[test]
    fn test_condition_parse() {
        assert_eq!("few-shot".parse::<Condition>().unwrap(), Condition::FewShot);
        assert_eq!("zero_shot".parse::<Condition>().unwrap(), Condition::ZeroShot);
        assert!("one_shot".parse::<Condition>().is_err());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = text_fingerprint("三环以外不算成都");
        assert_eq!(a.len(), 16);
        assert_eq!(a, text_fingerprint("三环以外不算成都"));
        assert_ne!(a, text_fingerprint("三环以内"));
    }
}
