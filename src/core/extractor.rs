//! Output Extractor.
//!
//! Finds the label-bearing tail of a free-text model response. Markers are
//! tried in priority order and the first hit wins:
//!
//! 1. a bold `**Output:**` marker (captures everything after it)
//! 2. a step heading such as `Step 4: Output results`
//! 3. a plain `Output:` marker (everything after its last occurrence)
//!
//! The candidate is then unwrapped from a fenced block or backticks. An empty
//! result or a "none" placeholder is a legitimate empty outcome, distinct from
//! finding no marker at all.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{Language, EMPTY_SENTINEL, NO_MARKER_SENTINEL};

/// Result of extracting the label expression from a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Cleaned label expression, ready for the parser
    Labels(String),
    /// Marker found, but the model assigned no category
    Empty,
    /// No output marker anywhere in the response
    NoMarker,
}

impl Extracted {
    /// Cell value written to prediction files
    pub fn as_cell(&self) -> &str {
        match self {
            Extracted::Labels(labels) => labels,
            Extracted::Empty => EMPTY_SENTINEL,
            Extracted::NoMarker => NO_MARKER_SENTINEL,
        }
    }

    pub fn into_cell(self) -> String {
        match self {
            Extracted::Labels(labels) => labels,
            other => other.as_cell().to_string(),
        }
    }
}

/// How a marker yields its candidate
enum Marker {
    /// Capture group 1 of the first match
    Capture(Regex),
    /// Everything after the last match
    SplitLast(Regex),
}

impl Marker {
    fn candidate<'a>(&self, text: &'a str) -> Option<&'a str> {
        match self {
            Marker::Capture(pattern) => pattern
                .captures(text)
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str()),
            Marker::SplitLast(pattern) => pattern.find_iter(text).last().map(|m| &text[m.end()..]),
        }
    }
}

fn build_chain(bold: &str, step: &str, plain: &str) -> Vec<Marker> {
    vec![
        Marker::Capture(Regex::new(bold).expect("valid bold marker")),
        Marker::Capture(Regex::new(step).expect("valid step marker")),
        Marker::SplitLast(Regex::new(plain).expect("valid plain marker")),
    ]
}

static ZH_CHAIN: Lazy<Vec<Marker>> = Lazy::new(|| {
    build_chain(
        r"(?s)\*\*输出[:：]\*\*\s*(.*)",
        r"(?s)第四步：输出结果\s*(.*)",
        r"输出[:：]",
    )
});

static EN_CHAIN: Lazy<Vec<Marker>> = Lazy::new(|| {
    build_chain(
        r"(?s)\*\*Output[:：]\*\*\s*(.*)",
        r"(?s)Step 4: Output results\s*(.*)",
        r"Output[:：]",
    )
});

fn chain(language: Language) -> &'static [Marker] {
    match language {
        Language::Zh => &ZH_CHAIN,
        Language::En => &EN_CHAIN,
    }
}

/// Locate the raw candidate following the first matching marker
pub fn find_candidate(text: &str, language: Language) -> Option<&str> {
    chain(language).iter().find_map(|marker| marker.candidate(text))
}

/// Strip a fenced block or single-backtick wrapper around the whole candidate
pub fn unwrap_candidate(candidate: &str) -> &str {
    let candidate = candidate.trim();

    if candidate.len() >= 6 && candidate.starts_with("```") && candidate.ends_with("```") {
        let inner = &candidate[3..candidate.len() - 3];
        // Drop the opening fence line, which may carry an info string
        if let Some(newline) = inner.find('\n') {
            return inner[newline + 1..].trim();
        }
    }

    if candidate.len() >= 2 && candidate.starts_with('`') && candidate.ends_with('`') {
        return candidate[1..candidate.len() - 1].trim();
    }

    candidate
}

/// Extract the label expression from a full model response.
pub fn extract_output(text: &str, language: Language) -> Extracted {
    let Some(candidate) = find_candidate(text, language) else {
        return Extracted::NoMarker;
    };

    let label = unwrap_candidate(candidate);
    if label.is_empty() || language.empty_placeholders().contains(&label) {
        Extracted::Empty
    } else {
        Extracted::Labels(label.to_string())
    }
}
