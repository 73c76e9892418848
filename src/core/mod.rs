//! Core extraction, evaluation and run logic.
//!
//! This module contains:
//! - Parser and Extractor: raw model text to label sets
//! - Agreement, Metrics, Evaluation: comparison statistics
//! - Taxonomy: error classes and drill-downs
//! - Join: pairing gold rows with prediction rows
//! - Prompt, Retry, Runner: the model-calling batch layer

pub mod agreement;
pub mod evaluation;
pub mod extractor;
pub mod join;
pub mod metrics;
pub mod parser;
pub mod prompt;
pub mod retry;
pub mod runner;
pub mod taxonomy;

// Re-export commonly used types
pub use agreement::{agreement, jaccard, label_distribution, AgreementReport, MetricsError};
pub use evaluation::{evaluate_model, EvalOptions, FailureCounts, FailurePolicy, ModelEvaluation};
pub use extractor::{extract_output, Extracted};
pub use join::{join, JoinKey, JoinReport};
pub use metrics::{classification_report, ClassificationReport, ReportOptions};
pub use parser::{interpret_prediction, parse_category_list, parse_compact, LabelParseError};
pub use prompt::PromptSet;
pub use retry::RetryPolicy;
pub use runner::{BatchRunner, RunManifest, RunnerOptions};
pub use taxonomy::{classify, diff, ErrorClass, ModelPairs};
