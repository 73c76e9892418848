//! Label sets and the tagged prediction outcome.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::category::Category;

/// Sentinel written by the runner when the model call itself failed
pub const CALL_ERROR_SENTINEL: &str = "ERROR";

/// Sentinel written when no output marker was found in a response
pub const NO_MARKER_SENTINEL: &str = "PARSE_ERROR_NO_MARKER";

/// Sentinel for a legitimately empty extraction
pub const EMPTY_SENTINEL: &str = "N/A";

/// An unordered, duplicate-free set of categories.
///
/// Sets are never mutated after parsing; comparisons return new sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeSet<Category>);

impl LabelSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, category: Category) -> bool {
        self.0.contains(&category)
    }

    /// Categories in id order
    pub fn iter(&self) -> impl Iterator<Item = Category> + '_ {
        self.0.iter().copied()
    }

    pub fn union(&self, other: &LabelSet) -> LabelSet {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn intersection(&self, other: &LabelSet) -> LabelSet {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    /// Categories in `self` that are absent from `other`
    pub fn difference(&self, other: &LabelSet) -> LabelSet {
        Self(self.0.difference(&other.0).copied().collect())
    }

    /// Sorted digit string, e.g. `147`; empty for the empty set
    pub fn to_compact(&self) -> String {
        self.0.iter().map(|c| c.id().to_string()).collect()
    }
}

impl FromIterator<Category> for LabelSet {
    fn from_iter<I: IntoIterator<Item = Category>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for LabelSet {
    /// `RL1, RL4`, or `-` for the empty set
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "-");
        }
        let tags: Vec<String> = self.0.iter().map(|c| c.tag()).collect();
        write!(f, "{}", tags.join(", "))
    }
}

/// Why a prediction could not be turned into labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailure {
    /// No output marker in the raw response
    NoMarker,
    /// Non-blank label text without a single recognised category token
    Unrecognized,
}

/// Outcome of interpreting one prediction.
///
/// "Legitimately empty" and "failed" are distinct variants so that failure
/// rates never hide inside the empty-label count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prediction {
    /// At least one category was recognised
    Labels(LabelSet),
    /// The model explicitly assigned no category
    Empty,
    /// The response could not be parsed
    ParseFailure(ParseFailure),
    /// The model call failed after exhausting retries
    CallFailure,
}

impl Prediction {
    /// Label set used for metrics; failures count as empty
    pub fn labels(&self) -> LabelSet {
        match self {
            Prediction::Labels(set) => set.clone(),
            _ => LabelSet::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Prediction::ParseFailure(_) | Prediction::CallFailure)
    }

    pub fn is_parse_failure(&self) -> bool {
        matches!(self, Prediction::ParseFailure(_))
    }

    pub fn is_call_failure(&self) -> bool {
        matches!(self, Prediction::CallFailure)
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Labels(set) => write!(f, "{}", set),
            Prediction::Empty => write!(f, "-"),
            Prediction::ParseFailure(ParseFailure::NoMarker) => write!(f, "{}", NO_MARKER_SENTINEL),
            Prediction::ParseFailure(ParseFailure::Unrecognized) => write!(f, "UNRECOGNIZED"),
            Prediction::CallFailure => write!(f, "{}", CALL_ERROR_SENTINEL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u32]) -> LabelSet {
        ids.iter().filter_map(|&id| Category::new(id)).collect()
    }

    #[test]
    fn test_set_algebra_returns_new_sets() {
        let gold = set(&[1, 4, 7]);
        let predicted = set(&[1, 4, 5]);

        assert_eq!(gold.difference(&predicted), set(&[7]));
        assert_eq!(predicted.difference(&gold), set(&[5]));
        assert_eq!(gold.intersection(&predicted), set(&[1, 4]));
        assert_eq!(gold.union(&predicted), set(&[1, 4, 5, 7]));
        assert_eq!(gold, set(&[1, 4, 7]));
    }

    #[test]
    fn test_display_and_compact() {
        assert_eq!(set(&[4, 1]).to_string(), "RL1, RL4");
        assert_eq!(LabelSet::new().to_string(), "-");
        assert_eq!(set(&[7, 1, 4]).to_compact(), "147");
    }

    #[test]
    fn test_failures_count_as_empty_labels() {
        assert!(Prediction::CallFailure.labels().is_empty());
        assert!(Prediction::ParseFailure(ParseFailure::NoMarker).is_failure());
        assert!(!Prediction::Empty.is_failure());
        assert_eq!(Prediction::Labels(set(&[2])).labels(), set(&[2]));
    }
}
