//! Domain types for the annotation study.
//!
//! Categories are fixed configuration; label sets and predictions are created
//! fresh per sample and never mutated.

pub mod category;
pub mod label_set;
pub mod language;
pub mod sample;

pub use category::{Category, CategoryInfo, CATEGORIES};
pub use label_set::{
    LabelSet, ParseFailure, Prediction, CALL_ERROR_SENTINEL, EMPTY_SENTINEL, NO_MARKER_SENTINEL,
};
pub use language::Language;
pub use sample::{text_fingerprint, Condition, GoldRecord, JoinedPair, ModelRun, PredictionRecord};
