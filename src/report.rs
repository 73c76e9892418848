//! Report rows and terminal tables.
//!
//! Analysis results are flattened into one row type per table so they can be
//! written as CSV; label sets become display strings (`RL1, RL4` or `-`).
//! The `print_*` functions render the same data for the terminal.

use serde::Serialize;

use crate::core::agreement::{AgreementReport, LabelCount};
use crate::core::evaluation::ModelEvaluation;
use crate::core::join::JoinReport;
use crate::core::taxonomy::{
    CategoryErrorStats, ConsensusError, ConsensusKind, DrillDown, DrillKind, ErrorCase, ErrorClass, LabelRecall,
    ModelComparison,
};
use crate::domain::ModelRun;

/// `33.3%`
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

fn condition_label(run: &ModelRun) -> String {
    run.condition.map(|c| c.label().to_string()).unwrap_or_default()
}

fn join_runs(runs: &[ModelRun]) -> String {
    runs.iter().map(ModelRun::display_name).collect::<Vec<_>>().join("; ")
}

/// One line per model/condition in the evaluation table
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRow {
    pub model: String,
    pub condition: String,
    pub total: usize,
    pub retained: usize,
    pub excluded_empty_gold: usize,
    pub excluded_failures: usize,
    pub parse_failures: usize,
    pub call_failures: usize,
    pub parse_failure_rate: String,
    pub call_failure_rate: String,
    pub micro_precision: f64,
    pub micro_recall: f64,
    pub micro_f1: f64,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    pub samples_f1: f64,
}

impl From<&ModelEvaluation> for MetricsRow {
    fn from(e: &ModelEvaluation) -> Self {
        Self {
            model: e.run.model.clone(),
            condition: condition_label(&e.run),
            total: e.report.total_samples,
            retained: e.report.retained_samples,
            excluded_empty_gold: e.report.excluded_empty_gold,
            excluded_failures: e.excluded_failures,
            parse_failures: e.outcomes.parse_failures,
            call_failures: e.outcomes.call_failures,
            parse_failure_rate: format_percent(e.outcomes.parse_failure_rate()),
            call_failure_rate: format_percent(e.outcomes.call_failure_rate()),
            micro_precision: e.report.micro.precision,
            micro_recall: e.report.micro.recall,
            micro_f1: e.report.micro.f1,
            macro_f1: e.report.macro_avg.f1,
            weighted_f1: e.report.weighted.f1,
            samples_f1: e.report.samples.f1,
        }
    }
}

/// Per-category line of a classification report
#[derive(Debug, Clone, Serialize)]
pub struct ClassRow {
    pub model: String,
    pub category: String,
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
    pub predicted: usize,
}

pub fn class_rows(evaluation: &ModelEvaluation) -> Vec<ClassRow> {
    evaluation
        .report
        .classes
        .iter()
        .map(|c| ClassRow {
            model: evaluation.run.display_name(),
            category: c.category.tag(),
            name: c.category.name().to_string(),
            precision: c.scores.precision,
            recall: c.scores.recall,
            f1: c.scores.f1,
            support: c.counts.support(),
            predicted: c.counts.predicted(),
        })
        .collect()
}

/// Per-category agreement line
#[derive(Debug, Clone, Serialize)]
pub struct AgreementRow {
    pub category: String,
    pub name: String,
    pub agreement_rate: f64,
    /// Blank when undefined
    pub kappa: Option<f64>,
}

pub fn agreement_rows(report: &AgreementReport) -> Vec<AgreementRow> {
    report
        .categories
        .iter()
        .map(|c| AgreementRow {
            category: c.category.tag(),
            name: c.category.name().to_string(),
            agreement_rate: c.agreement_rate,
            kappa: c.kappa,
        })
        .collect()
}

/// Per-model error summary line
#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummaryRow {
    pub model: String,
    pub condition: String,
    pub total: usize,
    pub scored: usize,
    pub errors: usize,
    pub error_rate: String,
    pub missed: usize,
    pub missed_share: String,
    pub spurious: usize,
    pub spurious_share: String,
    pub both: usize,
    pub both_share: String,
    pub parse_failures: usize,
    pub call_failures: usize,
}

pub fn error_summary_rows(comparison: &ModelComparison) -> Vec<ErrorSummaryRow> {
    comparison
        .summaries
        .iter()
        .map(|s| ErrorSummaryRow {
            model: s.run.model.clone(),
            condition: condition_label(&s.run),
            total: s.total,
            scored: s.scored,
            errors: s.errors,
            error_rate: format_percent(s.error_rate),
            missed: s.missed,
            missed_share: format_percent(s.share(ErrorClass::Missed)),
            spurious: s.spurious,
            spurious_share: format_percent(s.share(ErrorClass::Spurious)),
            both: s.both,
            both_share: format_percent(s.share(ErrorClass::Both)),
            parse_failures: s.parse_failures,
            call_failures: s.call_failures,
        })
        .collect()
}

/// Per-category error line
#[derive(Debug, Clone, Serialize)]
pub struct CategoryErrorRow {
    pub category: String,
    pub name: String,
    pub missed: usize,
    pub spurious: usize,
    pub gold_total: usize,
    pub predicted_total: usize,
    pub missed_rate: String,
    pub spurious_rate: String,
}

impl From<&CategoryErrorStats> for CategoryErrorRow {
    fn from(s: &CategoryErrorStats) -> Self {
        Self {
            category: s.category.tag(),
            name: s.name.to_string(),
            missed: s.missed,
            spurious: s.spurious,
            gold_total: s.gold_total,
            predicted_total: s.predicted_total,
            missed_rate: format_percent(s.missed_rate),
            spurious_rate: format_percent(s.spurious_rate),
        }
    }
}

/// Error case extract line
#[derive(Debug, Clone, Serialize)]
pub struct ErrorCaseRow {
    pub model: String,
    pub sample_id: String,
    pub text: String,
    pub gold: String,
    pub predicted: String,
    pub raw_labels: String,
    pub error_class: String,
    pub missed: String,
    pub spurious: String,
}

impl From<&ErrorCase> for ErrorCaseRow {
    fn from(c: &ErrorCase) -> Self {
        Self {
            model: c.run.display_name(),
            sample_id: c.sample_id.clone(),
            text: c.text.clone(),
            gold: c.gold.to_string(),
            predicted: c.predicted.to_string(),
            raw_labels: c.raw_labels.clone(),
            error_class: c.class.to_string(),
            missed: c.missed.to_string(),
            spurious: c.spurious.to_string(),
        }
    }
}

/// Drill-down case line
#[derive(Debug, Clone, Serialize)]
pub struct DrillCaseRow {
    pub category: String,
    pub kind: String,
    pub sample_id: String,
    pub text: String,
    pub gold: String,
    pub erring_models: String,
    pub correct_models: String,
    pub failed_models: String,
}

pub fn drill_rows(drill: &DrillDown) -> Vec<DrillCaseRow> {
    let kind = match drill.kind {
        DrillKind::Omission => "omission",
        DrillKind::SpuriousInclusion => "spurious_inclusion",
    };
    drill
        .cases
        .iter()
        .map(|c| DrillCaseRow {
            category: drill.category.tag(),
            kind: kind.to_string(),
            sample_id: c.sample_id.clone(),
            text: c.text.clone(),
            gold: c.gold.to_string(),
            erring_models: join_runs(&c.erring),
            correct_models: join_runs(&c.correct),
            failed_models: join_runs(&c.failed),
        })
        .collect()
}

/// Consensus error line
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusRow {
    pub sample_id: String,
    pub text: String,
    pub gold: String,
    pub kind: String,
    pub shared: String,
    pub per_model: String,
}

impl From<&ConsensusError> for ConsensusRow {
    fn from(c: &ConsensusError) -> Self {
        let per_model = c
            .per_model
            .iter()
            .map(|(run, set)| format!("{}: {}", run.display_name(), set))
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            sample_id: c.sample_id.clone(),
            text: c.text.clone(),
            gold: c.gold.to_string(),
            kind: match c.kind {
                ConsensusKind::Missed => "missed".to_string(),
                ConsensusKind::Spurious => "spurious".to_string(),
            },
            shared: c.shared.to_string(),
            per_model,
        }
    }
}

/// Join problems for one prediction file
#[derive(Debug, Clone, Serialize)]
pub struct JoinRow {
    pub model: String,
    pub matched: usize,
    pub unmatched_gold: usize,
    pub unmatched_predictions: usize,
    pub duplicate_predictions: usize,
    pub duplicate_gold: usize,
}

impl JoinRow {
    pub fn new(run: &ModelRun, report: &JoinReport) -> Self {
        Self {
            model: run.display_name(),
            matched: report.pairs.len(),
            unmatched_gold: report.unmatched_gold.len(),
            unmatched_predictions: report.unmatched_predictions.len(),
            duplicate_predictions: report.duplicate_predictions.len(),
            duplicate_gold: report.duplicate_gold.len(),
        }
    }
}

// ============================================================================
// Terminal tables
// ============================================================================

pub fn print_metrics_table(rows: &[MetricsRow]) {
    println!(
        "{:<28} {:<10} {:>6} {:>6} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "MODEL", "CONDITION", "N", "FAIL", "MICRO-P", "MICRO-R", "MICRO-F1", "MACRO-F1", "WEIGHTED", "SAMPLES"
    );
    println!("{}", "-".repeat(112));
    for r in rows {
        println!(
            "{:<28} {:<10} {:>6} {:>6} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4}",
            r.model,
            r.condition,
            r.retained,
            r.parse_failures + r.call_failures,
            r.micro_precision,
            r.micro_recall,
            r.micro_f1,
            r.macro_f1,
            r.weighted_f1,
            r.samples_f1
        );
    }
}

pub fn print_class_table(rows: &[ClassRow]) {
    println!(
        "{:<6} {:<34} {:>9} {:>9} {:>9} {:>8} {:>9}",
        "LABEL", "NAME", "PRECISION", "RECALL", "F1", "SUPPORT", "PREDICTED"
    );
    for r in rows {
        println!(
            "{:<6} {:<34} {:>9.4} {:>9.4} {:>9.4} {:>8} {:>9}",
            r.category, r.name, r.precision, r.recall, r.f1, r.support, r.predicted
        );
    }
}

pub fn print_agreement(report: &AgreementReport, distributions: &[(&str, Vec<LabelCount>)]) {
    println!("Samples:         {}", report.samples);
    println!(
        "Exact agreement: {} / {} ({})",
        report.exact_matches,
        report.samples,
        format_percent(report.exact_agreement_rate * 100.0)
    );
    println!("Mean Jaccard:    {:.4}", report.mean_jaccard);
    match report.mean_kappa {
        Some(kappa) => println!("Mean kappa:      {:.4}", kappa),
        None => println!("Mean kappa:      (undefined)"),
    }
    if !report.undefined_kappa.is_empty() {
        let tags: Vec<String> = report.undefined_kappa.iter().map(|c| c.tag()).collect();
        println!("Kappa undefined (no variance): {}", tags.join(", "));
    }
    println!();

    println!("{:<6} {:<34} {:>10} {:>8}", "LABEL", "NAME", "AGREEMENT", "KAPPA");
    for row in agreement_rows(report) {
        let kappa = row.kappa.map(|k| format!("{:.4}", k)).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<34} {:>10} {:>8}",
            row.category,
            row.name,
            format_percent(row.agreement_rate * 100.0),
            kappa
        );
    }

    for (annotator, counts) in distributions {
        println!();
        println!("Label distribution: {}", annotator);
        for count in counts {
            println!(
                "  {:<6} {:>5} ({})",
                count.category.tag(),
                count.count,
                format_percent(count.percentage)
            );
        }
    }
}

pub fn print_error_comparison(comparison: &ModelComparison) {
    println!(
        "{:<28} {:<10} {:>6} {:>7} {:>7} {:>8} {:>14} {:>14} {:>14}",
        "MODEL", "CONDITION", "N", "SCORED", "ERRORS", "RATE", "MISSED", "SPURIOUS", "BOTH"
    );
    println!("{}", "-".repeat(116));
    for r in error_summary_rows(comparison) {
        println!(
            "{:<28} {:<10} {:>6} {:>7} {:>7} {:>8} {:>14} {:>14} {:>14}",
            r.model,
            r.condition,
            r.total,
            r.scored,
            r.errors,
            r.error_rate,
            format!("{} ({})", r.missed, r.missed_share),
            format!("{} ({})", r.spurious, r.spurious_share),
            format!("{} ({})", r.both, r.both_share)
        );
    }
    println!();
    if let Some(best) = &comparison.best {
        println!("Best:  {}", best.display_name());
    }
    if let Some(worst) = &comparison.worst {
        println!("Worst: {}", worst.display_name());
    }
    println!("Mean error rate: {}", format_percent(comparison.mean_error_rate));
}

pub fn print_category_errors(stats: &[CategoryErrorStats]) {
    println!(
        "{:<6} {:<34} {:>7} {:>9} {:>6} {:>6} {:>9} {:>10}",
        "LABEL", "NAME", "MISSED", "SPURIOUS", "GOLD", "PRED", "MISS%", "SPUR%"
    );
    for s in stats {
        let r = CategoryErrorRow::from(s);
        println!(
            "{:<6} {:<34} {:>7} {:>9} {:>6} {:>6} {:>9} {:>10}",
            r.category, r.name, r.missed, r.spurious, r.gold_total, r.predicted_total, r.missed_rate, r.spurious_rate
        );
    }
}

pub fn print_drill_down(drill: &DrillDown) {
    let what = match drill.kind {
        DrillKind::Omission => "omitted",
        DrillKind::SpuriousInclusion => "spuriously included",
    };
    println!(
        "{} {}: {} of {} eligible samples ({} by every model, {} by some)",
        drill.category.tag(),
        what,
        drill.cases.len(),
        drill.eligible_samples,
        drill.all_erred,
        drill.some_erred
    );
    for (condition, count) in &drill.by_condition {
        println!("  {:<12} {}", condition, count);
    }
}

pub fn print_label_recall(rows: &[LabelRecall]) {
    println!("{:<40} {:>6} {:>8} {:>9} {:>7}", "MODEL", "GOLD", "OMITTED", "HIT RATE", "FAILED");
    for r in rows {
        println!(
            "{:<40} {:>6} {:>8} {:>9} {:>7}",
            r.run.display_name(),
            r.gold_with_category,
            r.omitted,
            format_percent(r.hit_rate),
            r.failed
        );
    }
}
