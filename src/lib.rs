//! rl-eval - label extraction and evaluation for recognition-logic annotation
//!
//! Turns free-form LLM responses into sets of recognition-logic categories
//! (RL1-RL7) and compares them against gold annotations.
//!
//! # Modules
//!
//! - `domain`: Categories, label sets, predictions, samples
//! - `core`: Parsing, extraction, agreement, metrics, error taxonomy, batch runs
//! - `adapters`: Chat-completion backends
//! - `dataset`: CSV tables in and out
//! - `report`: Table rendering
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Classify a dataset
//! rl-eval run --input gold.csv --condition few-shot --model gpt-4.1
//!
//! # Score every prediction file against gold
//! rl-eval evaluate --gold gold.csv --results results/
//!
//! # Agreement between two annotators
//! rl-eval agree round1.csv
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod dataset;
pub mod domain;
pub mod report;

// Re-export main types at crate root for convenience
pub use crate::core::{
    agreement, classification_report, evaluate_model, extract_output, interpret_prediction, join, BatchRunner,
    ErrorClass, Extracted, MetricsError,
};
pub use crate::domain::{Category, Condition, LabelSet, Language, ModelRun, Prediction};
