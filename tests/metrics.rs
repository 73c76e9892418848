//! Metrics Integration Tests
//!
//! Classification metrics and agreement on hand-checked fixtures, plus the
//! join-then-evaluate flow used by `rl-eval evaluate`.

use rl_eval::core::agreement::{agreement, jaccard, label_distribution};
use rl_eval::core::evaluation::{evaluate_model, EvalOptions, FailurePolicy};
use rl_eval::core::join::{join, JoinKey};
use rl_eval::core::metrics::{classification_report, ReportOptions};
use rl_eval::core::MetricsError;
use rl_eval::domain::{Category, Condition, GoldRecord, LabelSet, Language, ModelRun, PredictionRecord};

fn set(ids: &[u32]) -> LabelSet {
    ids.iter().filter_map(|&id| Category::new(id)).collect()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_micro_f1_pools_label_instances() {
    let gold = vec![set(&[1]), set(&[1, 2])];
    let predicted = vec![set(&[1]), set(&[1])];

    let report = classification_report(&gold, &predicted, ReportOptions::default()).unwrap();

    // tp = 2, fp = 0, fn = 1
    assert!(close(report.micro.precision, 1.0));
    assert!(close(report.micro.recall, 2.0 / 3.0));
    assert!(close(report.micro.f1, 0.8));

    // RL1 perfect, RL2 never predicted
    assert!(close(report.macro_avg.f1, 0.5));
    assert!(close(report.weighted.f1, 2.0 / 3.0));
    assert!(close(report.samples.f1, (1.0 + 2.0 / 3.0) / 2.0));
}

#[test]
fn test_length_mismatch_is_rejected() {
    let err = classification_report(&[set(&[1])], &[], ReportOptions::default()).unwrap_err();
    assert_eq!(
        err,
        MetricsError::LengthMismatch {
            reference: 1,
            comparison: 0
        }
    );
    assert!(agreement(&[set(&[1])], &[set(&[1]), set(&[2])]).is_err());
}

#[test]
fn test_jaccard_is_symmetric_and_bounded() {
    let sets = [set(&[]), set(&[1]), set(&[1, 4]), set(&[4, 7]), set(&[2, 3, 5])];
    for a in &sets {
        for b in &sets {
            let ab = jaccard(a, b);
            assert!(close(ab, jaccard(b, a)));
            assert!((0.0..=1.0).contains(&ab));
        }
        assert!(close(jaccard(a, a), 1.0));
    }
    assert!(close(jaccard(&set(&[1, 4]), &set(&[4, 7])), 1.0 / 3.0));
}

#[test]
fn test_agreement_between_annotators() {
    let reference = vec![set(&[1]), set(&[1, 4]), set(&[2]), set(&[])];
    let comparison = vec![set(&[1]), set(&[1]), set(&[2]), set(&[])];

    let report = agreement(&reference, &comparison).unwrap();
    assert_eq!(report.samples, 4);
    assert_eq!(report.exact_matches, 3);
    assert!(close(report.exact_agreement_rate, 0.75));
    assert!(close(report.mean_jaccard, (1.0 + 0.5 + 1.0 + 1.0) / 4.0));

    let rl1 = report
        .categories
        .iter()
        .find(|c| c.category.id() == 1)
        .unwrap();
    assert!(close(rl1.agreement_rate, 1.0));
    assert!(close(rl1.kappa.unwrap(), 1.0));

    // RL4 used only by the reference annotator
    let rl4 = report.categories.iter().find(|c| c.category.id() == 4).unwrap();
    assert!(close(rl4.agreement_rate, 0.75));

    let counts = label_distribution(&reference);
    assert_eq!(counts.len(), 7);
    assert_eq!(counts[0].count, 2);
    assert!(close(counts[0].percentage, 50.0));
}

fn gold(id: &str, text: &str, ids: &[u32]) -> GoldRecord {
    GoldRecord {
        sample_id: Some(id.to_string()),
        text: text.to_string(),
        gold: set(ids),
    }
}

#[test]
fn test_join_then_evaluate() {
    let gold_rows = vec![
        gold("c1", "we grew up by the old well", &[1, 3]),
        gold("c2", "the council registered us", &[2]),
        gold("c3", "nobody here speaks the dialect now", &[4]),
        gold("c4", "just a picture of noodles", &[]),
    ];
    // Predictions arrive in a different order and without sample ids
    let predictions = vec![
        PredictionRecord::new("the council registered us", "RL2", ""),
        PredictionRecord::new("we grew up by the old well", "RL1", ""),
        PredictionRecord::new("nobody here speaks the dialect now", "ERROR", "HTTP 500"),
        PredictionRecord::new("just a picture of noodles", "N/A", ""),
    ];

    let joined = join(&gold_rows, &predictions, Language::En);
    assert_eq!(joined.key, JoinKey::Text);
    assert_eq!(joined.pairs.len(), 4);
    assert!(joined.is_clean());
    // Gold order is kept
    assert_eq!(joined.pairs[0].text, "we grew up by the old well");

    let run = ModelRun::new("gpt41", Some(Condition::FewShot));

    let as_empty = evaluate_model(&run, &joined.pairs, EvalOptions::default()).unwrap();
    assert_eq!(as_empty.outcomes.call_failures, 1);
    assert_eq!(as_empty.excluded_failures, 0);
    assert_eq!(as_empty.report.retained_samples, 3);
    assert_eq!(as_empty.report.excluded_empty_gold, 1);
    // tp = 2 (RL1, RL2), fn = 2 (RL3, RL4)
    assert!(close(as_empty.report.micro.recall, 0.5));

    let excluded = evaluate_model(
        &run,
        &joined.pairs,
        EvalOptions {
            failure_policy: FailurePolicy::Exclude,
            exclude_empty_gold: true,
        },
    )
    .unwrap();
    assert_eq!(excluded.excluded_failures, 1);
    assert_eq!(excluded.report.retained_samples, 2);
    assert!(close(excluded.report.micro.recall, 2.0 / 3.0));
    // Failures are tallied either way
    assert_eq!(excluded.outcomes.call_failures, 1);
}
