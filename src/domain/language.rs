//! Prompt/response language.
//!
//! The language decides which category-name prefixes, output markers and
//! "no label" placeholders appear in model responses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Chinese prompts (`认同逻辑N`, `输出：`)
    #[default]
    Zh,
    /// English prompts (`Recognition Logic N` / `RLN`, `Output:`)
    En,
}

impl Language {
    /// Category-name prefixes, longest first so that a shorter prefix never
    /// shadows a longer one inside the same token
    pub fn label_prefixes(self) -> &'static [&'static str] {
        match self {
            Language::Zh => &["认同逻辑"],
            Language::En => &["Recognition Logic", "RL"],
        }
    }

    /// Prefix used when rewriting label lists into canonical form
    pub fn canonical_prefix(self) -> &'static str {
        match self {
            Language::Zh => "认同逻辑",
            Language::En => "RL",
        }
    }

    /// Placeholders a model writes when it assigns no category
    pub fn empty_placeholders(self) -> &'static [&'static str] {
        match self {
            Language::Zh => &["无", "（无）"],
            Language::En => &["None", "(None)"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zh" | "cn" | "chinese" => Ok(Language::Zh),
            "en" | "english" => Ok(Language::En),
            other => Err(format!("unknown language '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language() {
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert_eq!("zh".parse::<Language>().unwrap(), Language::Zh);
        assert!("fr".parse::<Language>().is_err());
    }
}
