//! Command-line interface for rl-eval.
//!
//! Provides commands for extracting labels from model responses, running
//! models over a dataset, and comparing annotations (agreement, metrics,
//! error analysis).

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{Adapter, OpenAiAdapter};
use crate::config::{self, ResolvedConfig};
use crate::core::agreement::{agreement, label_distribution};
use crate::core::evaluation::{evaluate_model, EvalOptions, FailurePolicy};
use crate::core::extractor::extract_output;
use crate::core::join::join;
use crate::core::parser::interpret_prediction;
use crate::core::prompt::PromptSet;
use crate::core::runner::{summarize_records, BatchRunner};
use crate::core::taxonomy::{
    category_error_stats, compare_models, consensus_errors, error_cases, label_recall, omissions,
    spurious_inclusions, ModelPairs,
};
use crate::dataset::{
    discover_prediction_files, merge_tables, model_run_for, read_annotation_columns, read_column, read_gold,
    read_predictions, write_predictions, write_rows, ColumnSpec, LabelEncoding, DEFAULT_PREDICTION_GLOB,
};
use crate::domain::{Category, Condition, Language, CALL_ERROR_SENTINEL};
use crate::report::{
    self, class_rows, drill_rows, error_summary_rows, CategoryErrorRow, ConsensusRow, ErrorCaseRow, JoinRow,
    MetricsRow,
};

/// rl-eval - recognition-logic label extraction and evaluation
#[derive(Parser, Debug)]
#[command(name = "rl-eval")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Response language (defaults to the configured language)
    #[arg(short, long, value_enum, global = true)]
    pub language: Option<LanguageArg>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract label expressions from raw model responses
    Extract {
        /// Prediction file to re-extract (reads one response from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Where to write the re-extracted file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Classify every input text with a model
    Run {
        /// CSV file holding the input texts
        #[arg(short, long)]
        input: PathBuf,

        /// Column with the input text
        #[arg(long, default_value = "text")]
        text_column: String,

        /// Prompting condition
        #[arg(short, long, value_enum)]
        condition: ConditionArg,

        /// Model name (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,

        /// Prompt set YAML (defaults to the configured prompts)
        #[arg(short, long)]
        prompts: Option<PathBuf>,

        /// Output prediction file (defaults to <results>/<model>_<condition>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only classify the first N texts
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Precision/recall/F1 of every prediction file against gold
    Evaluate {
        #[command(flatten)]
        sources: PredictionSources,

        /// How failed predictions enter the metrics
        #[arg(long, value_enum)]
        failure_policy: Option<PolicyArg>,

        /// Keep samples whose gold set is empty
        #[arg(long)]
        keep_empty_gold: bool,

        /// Print the per-category table for every model
        #[arg(long)]
        per_class: bool,

        /// Directory for metrics.csv and classes.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Agreement between two annotation columns
    Agree {
        /// Annotation round file
        input: PathBuf,

        /// Reference column
        #[arg(long, default_value = "Anotator T")]
        reference: String,

        #[arg(long, value_enum, default_value = "compact")]
        reference_encoding: EncodingArg,

        /// Comparison column
        #[arg(long, default_value = "Anotator F")]
        comparison: String,

        #[arg(long, value_enum, default_value = "comma-digits")]
        comparison_encoding: EncodingArg,

        /// Write the per-category agreement table here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Error taxonomy across every prediction file
    Errors {
        #[command(flatten)]
        sources: PredictionSources,

        /// Categories to drill into (e.g. --category 7)
        #[arg(long = "category")]
        categories: Vec<u32>,

        /// Directory for the error tables
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add a canonical label column per prediction file to a base table
    Merge {
        /// Base table (usually the gold table)
        #[arg(short, long)]
        base: PathBuf,

        /// Directory holding prediction files
        #[arg(short, long)]
        results: Option<PathBuf>,

        /// Glob for prediction files inside the results directory
        #[arg(long, default_value = DEFAULT_PREDICTION_GLOB)]
        pattern: String,

        /// Column of the base table holding the input text
        #[arg(long, default_value = "text")]
        text_column: String,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Gold table plus the prediction files to compare against it
#[derive(clap::Args, Debug)]
pub struct PredictionSources {
    /// Gold table (text, Golden, optional comment_id)
    #[arg(short, long)]
    pub gold: PathBuf,

    /// Directory holding prediction files (defaults to the configured results directory)
    #[arg(short, long)]
    pub results: Option<PathBuf>,

    /// Glob for prediction files inside the results directory
    #[arg(long, default_value = DEFAULT_PREDICTION_GLOB)]
    pub pattern: String,
}

/// Language for CLI (maps to Language)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LanguageArg {
    /// Chinese prompts and responses
    Zh,

    /// English prompts and responses
    En,
}

impl From<LanguageArg> for Language {
    fn from(l: LanguageArg) -> Self {
        match l {
            LanguageArg::Zh => Language::Zh,
            LanguageArg::En => Language::En,
        }
    }
}

/// Prompting condition for CLI (maps to Condition)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConditionArg {
    ZeroShot,
    FewShot,
    NoCot,
}

impl From<ConditionArg> for Condition {
    fn from(c: ConditionArg) -> Self {
        match c {
            ConditionArg::ZeroShot => Condition::ZeroShot,
            ConditionArg::FewShot => Condition::FewShot,
            ConditionArg::NoCot => Condition::NoCot,
        }
    }
}

/// Failure policy for CLI (maps to FailurePolicy)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    /// Failures count as empty predictions
    AsEmpty,

    /// Failed rows are dropped before computing metrics
    Exclude,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::AsEmpty => FailurePolicy::AsEmpty,
            PolicyArg::Exclude => FailurePolicy::Exclude,
        }
    }
}

/// Label column encoding for CLI (maps to LabelEncoding)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EncodingArg {
    /// Compact digits, e.g. 147
    Compact,

    /// Comma-separated digits, e.g. 1,4,7
    CommaDigits,

    /// Category-name list, e.g. 认同逻辑1, 认同逻辑4
    CategoryList,
}

impl From<EncodingArg> for LabelEncoding {
    fn from(e: EncodingArg) -> Self {
        match e {
            EncodingArg::Compact => LabelEncoding::Compact,
            EncodingArg::CommaDigits => LabelEncoding::CommaDigits,
            EncodingArg::CategoryList => LabelEncoding::CategoryList,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;
        let language = self.language.map(Language::from).unwrap_or(cfg.language);

        match self.command {
            Commands::Extract { input, output } => extract(input, output, language).await,
            Commands::Run {
                input,
                text_column,
                condition,
                model,
                prompts,
                output,
                limit,
            } => {
                let request = RunRequest {
                    input,
                    text_column,
                    condition: condition.into(),
                    model,
                    prompts,
                    output,
                    limit,
                };
                run_model(cfg, request).await
            }
            Commands::Evaluate {
                sources,
                failure_policy,
                keep_empty_gold,
                per_class,
                output,
            } => {
                let mut options = cfg.eval_options();
                if let Some(policy) = failure_policy {
                    options.failure_policy = policy.into();
                }
                if keep_empty_gold {
                    options.exclude_empty_gold = false;
                }
                evaluate(cfg, &sources, options, per_class, output, language).await
            }
            Commands::Agree {
                input,
                reference,
                reference_encoding,
                comparison,
                comparison_encoding,
                output,
            } => {
                let reference = ColumnSpec {
                    name: reference,
                    encoding: reference_encoding.into(),
                };
                let comparison = ColumnSpec {
                    name: comparison,
                    encoding: comparison_encoding.into(),
                };
                agree(&input, &reference, &comparison, output, language).await
            }
            Commands::Errors {
                sources,
                categories,
                output,
            } => errors(cfg, &sources, &categories, output, language).await,
            Commands::Merge {
                base,
                results,
                pattern,
                text_column,
                output,
            } => {
                let results = results.unwrap_or_else(|| cfg.results_dir.clone());
                merge(&base, &results, &pattern, &text_column, &output, language).await
            }
            Commands::Config => show_config(cfg).await,
        }
    }
}

/// Re-extract labels from raw responses
async fn extract(input: Option<PathBuf>, output: Option<PathBuf>, language: Language) -> Result<()> {
    let Some(path) = input else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;

        let extracted = extract_output(&buffer, language);
        let prediction = interpret_prediction(Some(extracted.as_cell()), language);
        println!("{}", extracted.as_cell());
        eprintln!("[{}]", prediction);
        return Ok(());
    };

    let mut records = read_predictions(&path)?;
    let mut changed = 0;
    for record in &mut records {
        let Some(raw) = record.raw_output.as_deref() else {
            continue;
        };
        // Failed calls keep their sentinel; the raw column holds the error text
        if record.labels.as_deref() == Some(CALL_ERROR_SENTINEL) {
            continue;
        }
        let cell = extract_output(raw, language).into_cell();
        if record.labels.as_deref() != Some(cell.as_str()) {
            changed += 1;
        }
        record.labels = Some(cell);
    }

    let output = output.unwrap_or_else(|| path.clone());
    write_predictions(&output, &records)?;

    let summary = summarize_records(&records, language);
    eprintln!(
        "[Re-extracted {} rows ({} changed): {} parse errors, {} call errors -> {}]",
        records.len(),
        changed,
        summary.parse_failures,
        summary.call_failures,
        output.display()
    );
    Ok(())
}

struct RunRequest {
    input: PathBuf,
    text_column: String,
    condition: Condition,
    model: Option<String>,
    prompts: Option<PathBuf>,
    output: Option<PathBuf>,
    limit: Option<usize>,
}

/// Classify a dataset with one model under one condition
async fn run_model(cfg: &ResolvedConfig, request: RunRequest) -> Result<()> {
    let prompts_path = request
        .prompts
        .or_else(|| cfg.prompts.clone())
        .context("No prompt set given. Use --prompts <file> or set paths.prompts in .rl-eval/config.yaml")?;
    let prompts = PromptSet::from_file(&prompts_path)?;
    prompts.validate(request.condition)?;

    let mut texts = read_column(&request.input, &request.text_column)?;
    if let Some(limit) = request.limit {
        texts.truncate(limit);
    }
    if texts.is_empty() {
        anyhow::bail!("No input texts in {}", request.input.display());
    }

    let settings = cfg.llm.adapter_settings(request.model.as_deref())?;
    let model = settings.model.clone();
    let adapter: Arc<dyn Adapter> = Arc::new(OpenAiAdapter::new(settings)?);

    let output = request.output.unwrap_or_else(|| {
        cfg.results_dir
            .join(format!("{}_{}.csv", model, request.condition.slug()))
    });

    let runner = BatchRunner::new(adapter, prompts, request.condition, cfg.runner_options());
    let manifest = runner.run_to_file(&texts, &output).await?;

    println!("Run ID:      {}", manifest.run_id);
    println!("Model:       {} ({})", manifest.model, manifest.condition.label());
    println!("Inputs:      {} ({} already done)", manifest.inputs, manifest.resumed);
    println!("Total rows:  {}", manifest.summary.total);
    println!("Parsed:      {}", manifest.summary.labelled + manifest.summary.empty);
    println!("Call errors: {}", manifest.summary.call_failures);
    println!("Parse errors: {}", manifest.summary.parse_failures);
    println!("Tokens used: {}", manifest.tokens_used);
    eprintln!("\n[Results written to {}]", output.display());

    Ok(())
}

/// Join every prediction file with gold
fn load_model_pairs(
    cfg: &ResolvedConfig,
    sources: &PredictionSources,
    language: Language,
) -> Result<(Vec<ModelPairs>, Vec<JoinRow>)> {
    let gold = read_gold(&sources.gold)?;
    if !gold.rejected.is_empty() {
        eprintln!("[Skipped {} gold rows with invalid labels]", gold.rejected.len());
    }

    let results = sources.results.clone().unwrap_or_else(|| cfg.results_dir.clone());
    let gold_path = sources.gold.canonicalize().unwrap_or_else(|_| sources.gold.clone());
    let files: Vec<PathBuf> = discover_prediction_files(&results, &sources.pattern)?
        .into_iter()
        .filter(|f| f.canonicalize().map(|p| p != gold_path).unwrap_or(true))
        .collect();
    if files.is_empty() {
        anyhow::bail!(
            "No prediction files matching '{}' in {}",
            sources.pattern,
            results.display()
        );
    }

    let mut models = Vec::new();
    let mut joins = Vec::new();
    for file in files {
        let run = model_run_for(&file);
        let predictions = read_predictions(&file)?;
        let report = join(&gold.records, &predictions, language);
        joins.push(JoinRow::new(&run, &report));
        models.push(ModelPairs::new(run, report.pairs));
    }
    Ok((models, joins))
}

fn print_join_problems(joins: &[JoinRow]) {
    for j in joins {
        if j.unmatched_gold + j.unmatched_predictions + j.duplicate_predictions + j.duplicate_gold > 0 {
            eprintln!(
                "[{}: {} matched, {} gold rows without prediction, {} predictions without gold, \
                 {} duplicate prediction keys, {} duplicate gold rows]",
                j.model,
                j.matched,
                j.unmatched_gold,
                j.unmatched_predictions,
                j.duplicate_predictions,
                j.duplicate_gold
            );
        }
    }
}

/// Per-model classification metrics
async fn evaluate(
    cfg: &ResolvedConfig,
    sources: &PredictionSources,
    options: EvalOptions,
    per_class: bool,
    output: Option<PathBuf>,
    language: Language,
) -> Result<()> {
    let (models, joins) = load_model_pairs(cfg, sources, language)?;
    print_join_problems(&joins);

    let mut evaluations = Vec::new();
    for model in &models {
        match evaluate_model(&model.run, &model.pairs, options) {
            Ok(evaluation) => evaluations.push(evaluation),
            Err(e) => eprintln!("[Skipping {}: {}]", model.run, e),
        }
    }

    let rows: Vec<MetricsRow> = evaluations.iter().map(MetricsRow::from).collect();
    report::print_metrics_table(&rows);

    if per_class {
        for evaluation in &evaluations {
            println!();
            println!("{}", evaluation.run);
            report::print_class_table(&class_rows(evaluation));
        }
    }

    if let Some(dir) = output {
        let classes: Vec<_> = evaluations.iter().flat_map(class_rows).collect();
        write_rows(&dir.join("metrics.csv"), &rows)?;
        write_rows(&dir.join("classes.csv"), &classes)?;
        write_rows(&dir.join("joins.csv"), &joins)?;
        eprintln!("\n[Metrics written to {}]", dir.display());
    }

    Ok(())
}

/// Inter-annotator agreement for one round file
async fn agree(
    input: &Path,
    reference: &ColumnSpec,
    comparison: &ColumnSpec,
    output: Option<PathBuf>,
    language: Language,
) -> Result<()> {
    let columns = read_annotation_columns(input, reference, comparison, language)?;
    if columns.skipped > 0 {
        eprintln!("[Skipped {} rows with unparseable labels]", columns.skipped);
    }

    let result = agreement(&columns.reference, &columns.comparison)?;
    let distributions = vec![
        (reference.name.as_str(), label_distribution(&columns.reference)),
        (comparison.name.as_str(), label_distribution(&columns.comparison)),
    ];
    report::print_agreement(&result, &distributions);

    if let Some(path) = output {
        write_rows(&path, &report::agreement_rows(&result))?;
        eprintln!("\n[Agreement written to {}]", path.display());
    }
    Ok(())
}

/// Error taxonomy across models
async fn errors(
    cfg: &ResolvedConfig,
    sources: &PredictionSources,
    categories: &[u32],
    output: Option<PathBuf>,
    language: Language,
) -> Result<()> {
    let categories: Vec<Category> = categories
        .iter()
        .map(|&id| Category::new(id).with_context(|| format!("Unknown category id {}", id)))
        .collect::<Result<_>>()?;

    let (models, joins) = load_model_pairs(cfg, sources, language)?;
    print_join_problems(&joins);

    let comparison = compare_models(&models);
    report::print_error_comparison(&comparison);
    println!();

    let stats = category_error_stats(&models);
    report::print_category_errors(&stats);

    let consensus = consensus_errors(&models);
    println!();
    println!("Consensus errors (every model): {}", consensus.len());

    let mut drill_down_rows = Vec::new();
    for &category in &categories {
        println!();
        let missed = omissions(&models, category);
        report::print_drill_down(&missed);
        let spurious = spurious_inclusions(&models, category);
        report::print_drill_down(&spurious);
        println!();
        report::print_label_recall(&label_recall(&models, category));

        drill_down_rows.extend(drill_rows(&missed));
        drill_down_rows.extend(drill_rows(&spurious));
    }

    if let Some(dir) = output {
        let cases: Vec<ErrorCaseRow> = models
            .iter()
            .flat_map(error_cases)
            .map(|c| ErrorCaseRow::from(&c))
            .collect();
        let category_rows: Vec<CategoryErrorRow> = stats.iter().map(CategoryErrorRow::from).collect();
        let consensus_rows: Vec<ConsensusRow> = consensus.iter().map(ConsensusRow::from).collect();

        write_rows(&dir.join("error_summary.csv"), &error_summary_rows(&comparison))?;
        write_rows(&dir.join("category_errors.csv"), &category_rows)?;
        write_rows(&dir.join("error_cases.csv"), &cases)?;
        write_rows(&dir.join("consensus_errors.csv"), &consensus_rows)?;
        if !drill_down_rows.is_empty() {
            write_rows(&dir.join("drill_down.csv"), &drill_down_rows)?;
        }
        eprintln!("\n[Error tables written to {}]", dir.display());
    }

    Ok(())
}

/// Build the wide comparison table
async fn merge(
    base: &Path,
    results: &Path,
    pattern: &str,
    text_column: &str,
    output: &Path,
    language: Language,
) -> Result<()> {
    let base_path = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let files: Vec<PathBuf> = discover_prediction_files(results, pattern)?
        .into_iter()
        .filter(|f| f.canonicalize().map(|p| p != base_path).unwrap_or(true))
        .collect();

    let merged = merge_tables(base, text_column, &files, language)?;
    merged.write(output)?;

    for (column, missing) in &merged.unmatched {
        if *missing > 0 {
            eprintln!("[{}: {} rows without a prediction]", column, missing);
        }
    }
    eprintln!(
        "[Merged {} prediction files into {}]",
        merged.unmatched.len(),
        output.display()
    );
    Ok(())
}

/// Show resolved configuration
async fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("rl-eval configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    let yaml = serde_yaml::to_string(cfg).context("Failed to render configuration")?;
    print!("{}", yaml);

    Ok(())
}
