//! Multi-label classification metrics for gold-vs-prediction comparisons.
//!
//! Precision, recall and F1 per category, pooled (micro), unweighted mean
//! over categories (macro), support-weighted (weighted), and per-sample
//! averages. Every zero denominator yields 0 rather than an error.
//!
//! The category set for a comparison is the union of categories appearing in
//! either sequence, so subsets of the data never report rows for categories
//! that neither side used. Samples with an empty gold set are dropped first;
//! the report records how many were kept.

use serde::Serialize;

use crate::domain::{Category, LabelSet};

use super::agreement::{active_categories, check_lengths, MetricsError};

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Confusion counts for one category (or pooled)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl Counts {
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// Harmonic mean, expressed as 2TP / (2TP + FP + FN)
    pub fn f1(&self) -> f64 {
        ratio(
            2 * self.true_positives,
            2 * self.true_positives + self.false_positives + self.false_negatives,
        )
    }

    /// Gold positives
    pub fn support(&self) -> usize {
        self.true_positives + self.false_negatives
    }

    /// Predicted positives
    pub fn predicted(&self) -> usize {
        self.true_positives + self.false_positives
    }

    fn add(&mut self, other: Counts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
    }
}

/// Confusion counts for one pair restricted to a category
fn pair_counts(gold: &LabelSet, predicted: &LabelSet, category: Category) -> Counts {
    match (gold.contains(category), predicted.contains(category)) {
        (true, true) => Counts {
            true_positives: 1,
            ..Default::default()
        },
        (false, true) => Counts {
            false_positives: 1,
            ..Default::default()
        },
        (true, false) => Counts {
            false_negatives: 1,
            ..Default::default()
        },
        (false, false) => Counts::default(),
    }
}

/// Precision/recall/F1 triple
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Metrics for one category
#[derive(Debug, Clone, Serialize)]
pub struct ClassMetrics {
    pub category: Category,
    pub counts: Counts,
    pub scores: Scores,
}

impl ClassMetrics {
    pub fn support(&self) -> usize {
        self.counts.support()
    }
}

/// Full classification report for one comparison
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    /// Pairs handed in
    pub total_samples: usize,
    /// Pairs kept after dropping empty gold sets
    pub retained_samples: usize,
    /// Pairs dropped because the gold set was empty
    pub excluded_empty_gold: usize,
    pub classes: Vec<ClassMetrics>,
    pub micro: Scores,
    pub macro_avg: Scores,
    pub weighted: Scores,
    pub samples: Scores,
}

/// Options for [`classification_report`]
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Drop pairs whose gold set is empty before computing metrics
    pub exclude_empty_gold: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            exclude_empty_gold: true,
        }
    }
}

/// Per-sample precision/recall/F1, averaged over samples
fn sample_average(gold: &[&LabelSet], predicted: &[&LabelSet]) -> Scores {
    let n = gold.len();
    if n == 0 {
        return Scores::default();
    }

    let mut total = Scores::default();
    for (g, p) in gold.iter().zip(predicted) {
        let overlap = g.intersection(p).len();
        total.precision += ratio(overlap, p.len());
        total.recall += ratio(overlap, g.len());
        total.f1 += ratio(2 * overlap, g.len() + p.len());
    }

    Scores {
        precision: total.precision / n as f64,
        recall: total.recall / n as f64,
        f1: total.f1 / n as f64,
    }
}

/// Compute the multi-label classification report.
pub fn classification_report(
    gold: &[LabelSet],
    predicted: &[LabelSet],
    options: ReportOptions,
) -> Result<ClassificationReport, MetricsError> {
    check_lengths(gold, predicted)?;
    let total_samples = gold.len();

    let (kept_gold, kept_predicted): (Vec<LabelSet>, Vec<LabelSet>) = gold
        .iter()
        .zip(predicted)
        .filter(|(g, _)| !(options.exclude_empty_gold && g.is_empty()))
        .map(|(g, p)| (g.clone(), p.clone()))
        .unzip();

    let retained_samples = kept_gold.len();
    if retained_samples == 0 {
        return Err(MetricsError::NoAnnotatedSamples);
    }

    let categories = active_categories(&kept_gold, &kept_predicted);
    if categories.is_empty() {
        return Err(MetricsError::NoActiveLabels);
    }

    let mut pooled = Counts::default();
    let classes: Vec<ClassMetrics> = categories
        .into_iter()
        .map(|category| {
            let mut counts = Counts::default();
            for (g, p) in kept_gold.iter().zip(&kept_predicted) {
                counts.add(pair_counts(g, p, category));
            }
            pooled.add(counts);
            ClassMetrics {
                category,
                counts,
                scores: Scores {
                    precision: counts.precision(),
                    recall: counts.recall(),
                    f1: counts.f1(),
                },
            }
        })
        .collect();

    let class_count = classes.len() as f64;
    let macro_avg = Scores {
        precision: classes.iter().map(|c| c.scores.precision).sum::<f64>() / class_count,
        recall: classes.iter().map(|c| c.scores.recall).sum::<f64>() / class_count,
        f1: classes.iter().map(|c| c.scores.f1).sum::<f64>() / class_count,
    };

    let total_support: usize = classes.iter().map(|c| c.support()).sum();
    let weighted_mean = |score: fn(&Scores) -> f64| {
        if total_support == 0 {
            return 0.0;
        }
        classes
            .iter()
            .map(|c| score(&c.scores) * c.support() as f64)
            .sum::<f64>()
            / total_support as f64
    };
    let weighted = Scores {
        precision: weighted_mean(|s| s.precision),
        recall: weighted_mean(|s| s.recall),
        f1: weighted_mean(|s| s.f1),
    };

    let gold_refs: Vec<&LabelSet> = kept_gold.iter().collect();
    let predicted_refs: Vec<&LabelSet> = kept_predicted.iter().collect();

    Ok(ClassificationReport {
        total_samples,
        retained_samples,
        excluded_empty_gold: total_samples - retained_samples,
        micro: Scores {
            precision: pooled.precision(),
            recall: pooled.recall(),
            f1: pooled.f1(),
        },
        classes,
        macro_avg,
        weighted,
        samples: sample_average(&gold_refs, &predicted_refs),
    })
}
