//! Inter-annotator agreement between two aligned label-set sequences.
//!
//! Covers exact-match rate, mean Jaccard similarity, per-category binary
//! agreement with Cohen's kappa, and per-annotator label distributions.
//! Agreement is computed over every pair; no empty-label filtering applies.

use serde::Serialize;
use thiserror::Error;

use crate::domain::{Category, LabelSet};

/// Metric computation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("Sequences differ in length: {reference} reference vs {comparison} comparison")]
    LengthMismatch { reference: usize, comparison: usize },

    #[error("No annotated samples remain after filtering")]
    NoAnnotatedSamples,

    #[error("No labels occur in either sequence")]
    NoActiveLabels,
}

pub(crate) fn check_lengths(reference: &[LabelSet], comparison: &[LabelSet]) -> Result<(), MetricsError> {
    if reference.len() != comparison.len() {
        return Err(MetricsError::LengthMismatch {
            reference: reference.len(),
            comparison: comparison.len(),
        });
    }
    Ok(())
}

/// Categories occurring in either sequence, in id order
pub fn active_categories(reference: &[LabelSet], comparison: &[LabelSet]) -> Vec<Category> {
    let mut all = LabelSet::new();
    for set in reference.iter().chain(comparison) {
        all = all.union(set);
    }
    all.iter().collect()
}

/// Jaccard similarity: 1.0 for two empty sets, 0.0 when exactly one is empty
pub fn jaccard(a: &LabelSet, b: &LabelSet) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => a.intersection(b).len() as f64 / a.union(b).len() as f64,
    }
}

/// Cohen's kappa for two binary raters.
///
/// Returns `None` when chance agreement is 1 (both raters constant and
/// identical), where the coefficient is undefined.
pub fn cohen_kappa(a: &[bool], b: &[bool]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let n = a.len() as f64;
    let observed = a.iter().zip(b).filter(|(x, y)| x == y).count() as f64 / n;
    let p_a = a.iter().filter(|&&x| x).count() as f64 / n;
    let p_b = b.iter().filter(|&&x| x).count() as f64 / n;
    let expected = p_a * p_b + (1.0 - p_a) * (1.0 - p_b);

    if (1.0 - expected).abs() < f64::EPSILON {
        return None;
    }

    Some((observed - expected) / (1.0 - expected))
}

/// Agreement on a single category
#[derive(Debug, Clone, Serialize)]
pub struct CategoryAgreement {
    pub category: Category,
    /// Share of samples where both raters agree on presence/absence
    pub agreement_rate: f64,
    /// `None` when undefined for this category
    pub kappa: Option<f64>,
}

/// Agreement summary for two aligned sequences
#[derive(Debug, Clone, Serialize)]
pub struct AgreementReport {
    pub samples: usize,
    pub exact_matches: usize,
    pub exact_agreement_rate: f64,
    pub mean_jaccard: f64,
    pub categories: Vec<CategoryAgreement>,
    /// Mean over categories with a defined kappa
    pub mean_kappa: Option<f64>,
    /// Categories whose kappa was undefined and left out of the mean
    pub undefined_kappa: Vec<Category>,
}

/// Compute agreement between two aligned label-set sequences.
pub fn agreement(reference: &[LabelSet], comparison: &[LabelSet]) -> Result<AgreementReport, MetricsError> {
    check_lengths(reference, comparison)?;
    let samples = reference.len();
    if samples == 0 {
        return Err(MetricsError::NoAnnotatedSamples);
    }

    let exact_matches = reference.iter().zip(comparison).filter(|(a, b)| a == b).count();
    let mean_jaccard = reference
        .iter()
        .zip(comparison)
        .map(|(a, b)| jaccard(a, b))
        .sum::<f64>()
        / samples as f64;

    let mut categories = Vec::new();
    let mut undefined_kappa = Vec::new();
    for category in active_categories(reference, comparison) {
        let a: Vec<bool> = reference.iter().map(|s| s.contains(category)).collect();
        let b: Vec<bool> = comparison.iter().map(|s| s.contains(category)).collect();
        let agreeing = a.iter().zip(&b).filter(|(x, y)| x == y).count();
        let kappa = cohen_kappa(&a, &b);
        if kappa.is_none() {
            undefined_kappa.push(category);
        }
        categories.push(CategoryAgreement {
            category,
            agreement_rate: agreeing as f64 / samples as f64,
            kappa,
        });
    }

    let defined: Vec<f64> = categories.iter().filter_map(|c| c.kappa).collect();
    let mean_kappa = if defined.is_empty() {
        None
    } else {
        Some(defined.iter().sum::<f64>() / defined.len() as f64)
    };

    Ok(AgreementReport {
        samples,
        exact_matches,
        exact_agreement_rate: exact_matches as f64 / samples as f64,
        mean_jaccard,
        categories,
        mean_kappa,
        undefined_kappa,
    })
}

/// How often one annotator used a category
#[derive(Debug, Clone, Serialize)]
pub struct LabelCount {
    pub category: Category,
    pub count: usize,
    /// Percentage of all samples
    pub percentage: f64,
}

/// Count every fixed category across an annotator's label sets
pub fn label_distribution(sets: &[LabelSet]) -> Vec<LabelCount> {
    let total = sets.len();
    Category::all()
        .map(|category| {
            let count = sets.iter().filter(|s| s.contains(category)).count();
            let percentage = if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            };
            LabelCount {
                category,
                count,
                percentage,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u32]) -> LabelSet {
        ids.iter().filter_map(|&id| Category::new(id)).collect()
    }

    #[test]
    fn test_jaccard_edge_cases() {
        assert_eq!(jaccard(&set(&[]), &set(&[])), 1.0);
        assert_eq!(jaccard(&set(&[1]), &set(&[])), 0.0);
        assert_eq!(jaccard(&set(&[]), &set(&[2])), 0.0);
        assert!((jaccard(&set(&[1, 2]), &set(&[2, 3])) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_kappa_perfect_and_chance() {
        let a = [true, false, true, false];
        assert_eq!(cohen_kappa(&a, &a), Some(1.0));

        // observed 0.5, expected 0.5
        let b = [true, true, false, false];
        assert_eq!(cohen_kappa(&a, &b), Some(0.0));
    }

    #[test]
    fn test_kappa_undefined_for_constant_raters() {
        let a = [true, true, true];
        assert_eq!(cohen_kappa(&a, &a), None);
    }

    #[test]
    fn test_agreement_report() {
        let reference = vec![set(&[1, 4]), set(&[]), set(&[2])];
        let comparison = vec![set(&[1]), set(&[]), set(&[2])];

        let report = agreement(&reference, &comparison).unwrap();
        assert_eq!(report.samples, 3);
        assert_eq!(report.exact_matches, 2);
        assert!((report.mean_jaccard - (0.5 + 1.0 + 1.0) / 3.0).abs() < 1e-12);

        let ids: Vec<u8> = report.categories.iter().map(|c| c.category.id()).collect();
        assert_eq!(ids, vec![1, 2, 4]);

        let rl1 = &report.categories[0];
        assert_eq!(rl1.kappa, Some(1.0));
        assert!((rl1.agreement_rate - 1.0).abs() < 1e-12);
        // RL4: only the reference used it once
        let rl4_kappa = report.categories[2].kappa.unwrap();
        assert!(rl4_kappa.abs() < 1e-12);
    }

    #[test]
    fn test_agreement_flags_zero_variance_category() {
        let reference = vec![set(&[3]), set(&[3])];
        let comparison = vec![set(&[3]), set(&[3])];
        let report = agreement(&reference, &comparison).unwrap();
        assert_eq!(report.undefined_kappa, vec![Category::new(3).unwrap()]);
        assert_eq!(report.mean_kappa, None);
    }

    #[test]
    fn test_length_mismatch() {
        let result = agreement(&[set(&[1])], &[]);
        assert!(matches!(result, Err(MetricsError::LengthMismatch { .. })));
    }

    #[test]
    fn test_label_distribution() {
        let sets = vec![set(&[1, 4]), set(&[4]), set(&[]), set(&[7])];
        let distribution = label_distribution(&sets);
        assert_eq!(distribution.len(), 7);
        assert_eq!(distribution[3].count, 2);
        assert!((distribution[3].percentage - 50.0).abs() < 1e-12);
        assert_eq!(distribution[1].count, 0);
    }
}
