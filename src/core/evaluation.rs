//! Per-model evaluation of joined gold/prediction pairs.
//!
//! Failed predictions (no output marker, unrecognised label text, failed
//! calls) are always tallied. The failure policy decides whether they then
//! count as empty predictions or leave the metric computation entirely.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{JoinedPair, LabelSet, ModelRun, Prediction};

use super::agreement::MetricsError;
use super::metrics::{classification_report, ClassificationReport, ReportOptions};

/// How failed predictions enter the metric computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Count failures as empty predictions
    #[default]
    AsEmpty,
    /// Drop failed rows before computing metrics
    Exclude,
}

/// Options for [`evaluate_model`]
#[derive(Debug, Clone, Copy)]
pub struct EvalOptions {
    pub failure_policy: FailurePolicy,
    pub exclude_empty_gold: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::AsEmpty,
            exclude_empty_gold: true,
        }
    }
}

/// Outcome tallies for one prediction source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    pub total: usize,
    pub labelled: usize,
    pub empty: usize,
    pub parse_failures: usize,
    pub call_failures: usize,
}

impl FailureCounts {
    pub fn tally<'a>(predictions: impl IntoIterator<Item = &'a Prediction>) -> Self {
        let mut counts = Self::default();
        for prediction in predictions {
            counts.total += 1;
            match prediction {
                Prediction::Labels(_) => counts.labelled += 1,
                Prediction::Empty => counts.empty += 1,
                Prediction::ParseFailure(_) => counts.parse_failures += 1,
                Prediction::CallFailure => counts.call_failures += 1,
            }
        }
        counts
    }

    pub fn failures(&self) -> usize {
        self.parse_failures + self.call_failures
    }

    fn rate(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }

    /// Parse failures as a percentage of all rows
    pub fn parse_failure_rate(&self) -> f64 {
        self.rate(self.parse_failures)
    }

    /// Call failures as a percentage of all rows
    pub fn call_failure_rate(&self) -> f64 {
        self.rate(self.call_failures)
    }
}

/// Evaluation of one model/condition against gold
#[derive(Debug, Clone, Serialize)]
pub struct ModelEvaluation {
    pub run: ModelRun,
    pub failure_policy: FailurePolicy,
    pub outcomes: FailureCounts,
    /// Rows removed by the `exclude` failure policy
    pub excluded_failures: usize,
    pub report: ClassificationReport,
}

/// Compute metrics for one model's joined pairs.
pub fn evaluate_model(
    run: &ModelRun,
    pairs: &[JoinedPair],
    options: EvalOptions,
) -> Result<ModelEvaluation, MetricsError> {
    let outcomes = FailureCounts::tally(pairs.iter().map(|p| &p.prediction));

    let kept: Vec<&JoinedPair> = pairs
        .iter()
        .filter(|p| options.failure_policy == FailurePolicy::AsEmpty || !p.prediction.is_failure())
        .collect();
    let excluded_failures = pairs.len() - kept.len();

    let gold: Vec<LabelSet> = kept.iter().map(|p| p.gold.clone()).collect();
    let predicted: Vec<LabelSet> = kept.iter().map(|p| p.predicted()).collect();

    debug!(
        model = %run,
        pairs = pairs.len(),
        excluded_failures,
        parse_failures = outcomes.parse_failures,
        call_failures = outcomes.call_failures,
        "Evaluating model"
    );

    let report = classification_report(
        &gold,
        &predicted,
        ReportOptions {
            exclude_empty_gold: options.exclude_empty_gold,
        },
    )?;

    Ok(ModelEvaluation {
        run: run.clone(),
        failure_policy: options.failure_policy,
        outcomes,
        excluded_failures,
        report,
    })
}
