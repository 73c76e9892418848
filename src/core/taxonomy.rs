//! Error Taxonomy Classifier.
//!
//! Every evaluation pair falls into exactly one class: `none`, `missed`
//! (under-prediction), `spurious` (over-prediction) or `both`. Everything
//! else here aggregates those classes per model, per category, and across
//! models for qualitative review.
//!
//! Failed predictions (call errors and unparseable output) say nothing about
//! the model's judgement. They are left out of every error count, drill-down,
//! recall figure and consensus check, counted on the per-model summary, and
//! listed in the audit extract under their own class.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Category, JoinedPair, LabelSet, ModelRun};

use super::evaluation::FailureCounts;

/// Error class of one (gold, predicted) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    None,
    Missed,
    Spurious,
    Both,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::None => "none",
            ErrorClass::Missed => "missed",
            ErrorClass::Spurious => "spurious",
            ErrorClass::Both => "both",
        }
    }

    pub fn is_error(self) -> bool {
        self != ErrorClass::None
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a pair together with the set differences behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairDiff {
    pub class: ErrorClass,
    /// Gold categories absent from the prediction
    pub missed: LabelSet,
    /// Predicted categories absent from gold
    pub spurious: LabelSet,
}

pub fn diff(gold: &LabelSet, predicted: &LabelSet) -> PairDiff {
    let missed = gold.difference(predicted);
    let spurious = predicted.difference(gold);
    let class = match (missed.is_empty(), spurious.is_empty()) {
        (true, true) => ErrorClass::None,
        (false, true) => ErrorClass::Missed,
        (true, false) => ErrorClass::Spurious,
        (false, false) => ErrorClass::Both,
    };
    PairDiff {
        class,
        missed,
        spurious,
    }
}

pub fn classify(gold: &LabelSet, predicted: &LabelSet) -> ErrorClass {
    diff(gold, predicted).class
}

/// Class of one audited pair: a real error, or a prediction that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseClass {
    Missed,
    Spurious,
    Both,
    ParseFailure,
    CallFailure,
}

impl CaseClass {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseClass::Missed => "missed",
            CaseClass::Spurious => "spurious",
            CaseClass::Both => "both",
            CaseClass::ParseFailure => "parse_failure",
            CaseClass::CallFailure => "call_failure",
        }
    }

    /// Audit class of `pair`, or `None` when it is correct
    pub fn of(pair: &JoinedPair) -> Option<Self> {
        if pair.prediction.is_parse_failure() {
            return Some(CaseClass::ParseFailure);
        }
        if pair.prediction.is_call_failure() {
            return Some(CaseClass::CallFailure);
        }
        match classify(&pair.gold, &pair.predicted()) {
            ErrorClass::None => None,
            ErrorClass::Missed => Some(CaseClass::Missed),
            ErrorClass::Spurious => Some(CaseClass::Spurious),
            ErrorClass::Both => Some(CaseClass::Both),
        }
    }
}

impl fmt::Display for CaseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Joined pairs for one model/condition
#[derive(Debug, Clone)]
pub struct ModelPairs {
    pub run: ModelRun,
    pub pairs: Vec<JoinedPair>,
}

impl ModelPairs {
    pub fn new(run: ModelRun, pairs: Vec<JoinedPair>) -> Self {
        Self { run, pairs }
    }

    /// Pairs with a usable prediction
    pub fn scored(&self) -> impl Iterator<Item = &JoinedPair> {
        self.pairs.iter().filter(|p| !p.prediction.is_failure())
    }

    /// First pair per sample id
    fn by_sample(&self) -> HashMap<&str, &JoinedPair> {
        let mut index = HashMap::with_capacity(self.pairs.len());
        for pair in &self.pairs {
            index.entry(pair.sample_id.as_str()).or_insert(pair);
        }
        index
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Error counts for one model/condition
#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    pub run: ModelRun,
    pub total: usize,
    /// Pairs with a usable prediction
    pub scored: usize,
    pub errors: usize,
    /// Errors as a percentage of scored pairs
    pub error_rate: f64,
    pub missed: usize,
    pub spurious: usize,
    pub both: usize,
    pub parse_failures: usize,
    pub call_failures: usize,
}

impl ErrorSummary {
    /// Share of errors (%) falling into `class`
    pub fn share(&self, class: ErrorClass) -> f64 {
        let count = match class {
            ErrorClass::None => return 0.0,
            ErrorClass::Missed => self.missed,
            ErrorClass::Spurious => self.spurious,
            ErrorClass::Both => self.both,
        };
        percent(count, self.errors)
    }
}

pub fn summarize(model: &ModelPairs) -> ErrorSummary {
    let mut counts: BTreeMap<ErrorClass, usize> = BTreeMap::new();
    for pair in model.scored() {
        *counts.entry(classify(&pair.gold, &pair.predicted())).or_default() += 1;
    }
    let outcomes = FailureCounts::tally(model.pairs.iter().map(|p| &p.prediction));

    let count = |class: ErrorClass| counts.get(&class).copied().unwrap_or(0);
    let scored = counts.values().sum::<usize>();
    let errors = counts
        .iter()
        .filter(|(class, _)| class.is_error())
        .map(|(_, n)| n)
        .sum::<usize>();

    ErrorSummary {
        run: model.run.clone(),
        total: model.pairs.len(),
        scored,
        errors,
        error_rate: percent(errors, scored),
        missed: count(ErrorClass::Missed),
        spurious: count(ErrorClass::Spurious),
        both: count(ErrorClass::Both),
        parse_failures: outcomes.parse_failures,
        call_failures: outcomes.call_failures,
    }
}

/// Side-by-side error summaries
#[derive(Debug, Clone, Serialize)]
pub struct ModelComparison {
    pub summaries: Vec<ErrorSummary>,
    /// Lowest error rate
    pub best: Option<ModelRun>,
    /// Highest error rate
    pub worst: Option<ModelRun>,
    pub mean_error_rate: f64,
}

pub fn compare_models(models: &[ModelPairs]) -> ModelComparison {
    let summaries: Vec<ErrorSummary> = models.iter().map(summarize).collect();

    let best = summaries
        .iter()
        .min_by(|a, b| a.error_rate.total_cmp(&b.error_rate))
        .map(|s| s.run.clone());
    let worst = summaries
        .iter()
        .max_by(|a, b| a.error_rate.total_cmp(&b.error_rate))
        .map(|s| s.run.clone());
    let mean_error_rate = if summaries.is_empty() {
        0.0
    } else {
        summaries.iter().map(|s| s.error_rate).sum::<f64>() / summaries.len() as f64
    };

    ModelComparison {
        summaries,
        best,
        worst,
        mean_error_rate,
    }
}

/// Error statistics for one category, pooled over every model's scored pairs
#[derive(Debug, Clone, Serialize)]
pub struct CategoryErrorStats {
    pub category: Category,
    pub name: &'static str,
    pub missed: usize,
    pub spurious: usize,
    /// Pairs whose gold contains the category
    pub gold_total: usize,
    /// Pairs whose prediction contains the category
    pub predicted_total: usize,
    /// missed / gold_total, in percent
    pub missed_rate: f64,
    /// spurious / pairs without the category in gold, in percent
    pub spurious_rate: f64,
}

pub fn category_error_stats(models: &[ModelPairs]) -> Vec<CategoryErrorStats> {
    let pairs: Vec<&JoinedPair> = models.iter().flat_map(ModelPairs::scored).collect();
    let total_pairs = pairs.len();

    Category::all()
        .map(|category| {
            let mut stats = CategoryErrorStats {
                category,
                name: category.name(),
                missed: 0,
                spurious: 0,
                gold_total: 0,
                predicted_total: 0,
                missed_rate: 0.0,
                spurious_rate: 0.0,
            };
            for pair in &pairs {
                let in_gold = pair.gold.contains(category);
                let in_predicted = pair.prediction.labels().contains(category);
                stats.gold_total += usize::from(in_gold);
                stats.predicted_total += usize::from(in_predicted);
                stats.missed += usize::from(in_gold && !in_predicted);
                stats.spurious += usize::from(!in_gold && in_predicted);
            }
            stats.missed_rate = percent(stats.missed, stats.gold_total);
            stats.spurious_rate = percent(stats.spurious, total_pairs - stats.gold_total);
            stats
        })
        .collect()
}

/// Sample ids present for every model, once each, in the first model's order
pub fn common_samples(models: &[ModelPairs]) -> Vec<String> {
    let Some((first, rest)) = models.split_first() else {
        return Vec::new();
    };
    let others: Vec<HashSet<&str>> = rest
        .iter()
        .map(|m| m.pairs.iter().map(|p| p.sample_id.as_str()).collect())
        .collect();

    let mut seen = HashSet::new();
    first
        .pairs
        .iter()
        .map(|p| p.sample_id.as_str())
        .filter(|id| others.iter().all(|ids| ids.contains(id)))
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Which kind of per-category mistake a drill-down looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrillKind {
    /// Gold has the category, prediction lacks it
    Omission,
    /// Prediction has the category, gold lacks it
    SpuriousInclusion,
}

/// One sample in a drill-down, with the models split by behaviour
#[derive(Debug, Clone, Serialize)]
pub struct DrillCase {
    pub sample_id: String,
    pub text: String,
    pub gold: LabelSet,
    /// Models that made the mistake
    pub erring: Vec<ModelRun>,
    /// Models that got the category right on this sample
    pub correct: Vec<ModelRun>,
    /// Models whose prediction failed on this sample
    pub failed: Vec<ModelRun>,
}

/// Per-category drill-down across models
#[derive(Debug, Clone, Serialize)]
pub struct DrillDown {
    pub category: Category,
    pub kind: DrillKind,
    /// Common samples where the mistake was possible and some model answered
    pub eligible_samples: usize,
    /// Samples where at least one model erred
    pub cases: Vec<DrillCase>,
    /// Cases where every model answered and erred
    pub all_erred: usize,
    /// Cases where some but not all models erred
    pub some_erred: usize,
    /// Mistakes per prompting condition label
    pub by_condition: BTreeMap<String, usize>,
}

fn condition_key(run: &ModelRun) -> String {
    run.condition
        .map(|c| c.label().to_string())
        .unwrap_or_else(|| "Unspecified".to_string())
}

fn drill_down(models: &[ModelPairs], category: Category, kind: DrillKind) -> DrillDown {
    let indexes: Vec<HashMap<&str, &JoinedPair>> = models.iter().map(ModelPairs::by_sample).collect();

    let mut report = DrillDown {
        category,
        kind,
        eligible_samples: 0,
        cases: Vec::new(),
        all_erred: 0,
        some_erred: 0,
        by_condition: BTreeMap::new(),
    };

    for sample_id in common_samples(models) {
        let rows: Vec<&JoinedPair> = indexes.iter().filter_map(|index| index.get(sample_id.as_str()).copied()).collect();
        let Some(first) = rows.first() else {
            continue;
        };

        let gold_has = first.gold.contains(category);
        let eligible = match kind {
            DrillKind::Omission => gold_has,
            DrillKind::SpuriousInclusion => !gold_has,
        };
        if !eligible || rows.iter().all(|row| row.prediction.is_failure()) {
            continue;
        }
        report.eligible_samples += 1;

        let mut erring = Vec::new();
        let mut correct = Vec::new();
        let mut failed = Vec::new();
        for (model, row) in models.iter().zip(&rows) {
            if row.prediction.is_failure() {
                failed.push(model.run.clone());
                continue;
            }
            let predicted_has = row.prediction.labels().contains(category);
            let erred = match kind {
                DrillKind::Omission => !predicted_has,
                DrillKind::SpuriousInclusion => predicted_has,
            };
            if erred {
                *report.by_condition.entry(condition_key(&model.run)).or_default() += 1;
                erring.push(model.run.clone());
            } else {
                correct.push(model.run.clone());
            }
        }

        if erring.is_empty() {
            continue;
        }
        if correct.is_empty() && failed.is_empty() {
            report.all_erred += 1;
        } else {
            report.some_erred += 1;
        }
        report.cases.push(DrillCase {
            sample_id,
            text: first.text.clone(),
            gold: first.gold.clone(),
            erring,
            correct,
            failed,
        });
    }

    report
}

/// Samples whose gold contains `category`, and which models omit it.
pub fn omissions(models: &[ModelPairs], category: Category) -> DrillDown {
    drill_down(models, category, DrillKind::Omission)
}

/// Samples whose gold lacks `category`, and which models still predict it.
pub fn spurious_inclusions(models: &[ModelPairs], category: Category) -> DrillDown {
    drill_down(models, category, DrillKind::SpuriousInclusion)
}

/// How well one model recovers a single category
#[derive(Debug, Clone, Serialize)]
pub struct LabelRecall {
    pub run: ModelRun,
    /// Scored rows whose gold contains the category
    pub gold_with_category: usize,
    pub omitted: usize,
    /// Rows whose gold contains the category but whose prediction failed
    pub failed: usize,
    /// Percentage of those rows where the category was predicted
    pub hit_rate: f64,
}

/// Per-model recall of one category, most omissions first
pub fn label_recall(models: &[ModelPairs], category: Category) -> Vec<LabelRecall> {
    let mut rows: Vec<LabelRecall> = models
        .iter()
        .map(|model| {
            let relevant: Vec<&JoinedPair> = model.scored().filter(|p| p.gold.contains(category)).collect();
            let failed = model
                .pairs
                .iter()
                .filter(|p| p.prediction.is_failure() && p.gold.contains(category))
                .count();
            let omitted = relevant
                .iter()
                .filter(|p| !p.prediction.labels().contains(category))
                .count();
            LabelRecall {
                run: model.run.clone(),
                gold_with_category: relevant.len(),
                omitted,
                failed,
                hit_rate: percent(relevant.len() - omitted, relevant.len()),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.omitted.cmp(&a.omitted));
    rows
}

/// Which error every model shares on a consensus sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusKind {
    Missed,
    Spurious,
}

/// A sample on which every compared model makes the same kind of error
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusError {
    pub sample_id: String,
    pub text: String,
    pub gold: LabelSet,
    pub kind: ConsensusKind,
    /// Categories in every model's missed (or spurious) set
    pub shared: LabelSet,
    /// Each model's own missed (or spurious) set
    pub per_model: Vec<(ModelRun, LabelSet)>,
}

/// Consensus errors over the samples every model answered.
pub fn consensus_errors(models: &[ModelPairs]) -> Vec<ConsensusError> {
    let indexes: Vec<HashMap<&str, &JoinedPair>> = models.iter().map(ModelPairs::by_sample).collect();
    let mut found = Vec::new();

    for sample_id in common_samples(models) {
        let rows: Vec<&JoinedPair> = indexes.iter().filter_map(|index| index.get(sample_id.as_str()).copied()).collect();
        let Some(first) = rows.first() else {
            continue;
        };
        if rows.iter().any(|row| row.prediction.is_failure()) {
            continue;
        }
        let diffs: Vec<PairDiff> = rows.iter().map(|row| diff(&row.gold, &row.predicted())).collect();

        for kind in [ConsensusKind::Missed, ConsensusKind::Spurious] {
            let sets: Vec<&LabelSet> = diffs
                .iter()
                .map(|d| match kind {
                    ConsensusKind::Missed => &d.missed,
                    ConsensusKind::Spurious => &d.spurious,
                })
                .collect();
            if sets.iter().any(|s| s.is_empty()) {
                continue;
            }

            let shared = sets
                .iter()
                .skip(1)
                .fold((*sets[0]).clone(), |acc, s| acc.intersection(s));
            found.push(ConsensusError {
                sample_id: sample_id.clone(),
                text: first.text.clone(),
                gold: first.gold.clone(),
                kind,
                shared,
                per_model: models
                    .iter()
                    .zip(&sets)
                    .map(|(m, s)| (m.run.clone(), (*s).clone()))
                    .collect(),
            });
        }
    }

    found
}

/// One erroneous pair, for qualitative audit
#[derive(Debug, Clone, Serialize)]
pub struct ErrorCase {
    pub run: ModelRun,
    pub sample_id: String,
    pub text: String,
    pub gold: LabelSet,
    pub predicted: LabelSet,
    pub raw_labels: String,
    pub class: CaseClass,
    /// Empty for failed predictions
    pub missed: LabelSet,
    pub spurious: LabelSet,
}

/// Every pair of `model` that is wrong or failed
pub fn error_cases(model: &ModelPairs) -> Vec<ErrorCase> {
    model
        .pairs
        .iter()
        .filter_map(|pair| {
            let class = CaseClass::of(pair)?;
            let predicted = pair.predicted();
            let (missed, spurious) = if pair.prediction.is_failure() {
                (LabelSet::new(), LabelSet::new())
            } else {
                let d = diff(&pair.gold, &predicted);
                (d.missed, d.spurious)
            };
            Some(ErrorCase {
                run: model.run.clone(),
                sample_id: pair.sample_id.clone(),
                text: pair.text.clone(),
                gold: pair.gold.clone(),
                predicted,
                raw_labels: pair.raw_labels.clone(),
                class,
                missed,
                spurious,
            })
        })
        .collect()
}
