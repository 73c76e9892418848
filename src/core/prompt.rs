//! Prompt sets for the classification runs.
//!
//! A prompt set lives in YAML and holds the annotation-manual system prompt,
//! an optional alternate prompt without step-by-step reasoning, and the
//! worked examples used for few-shot runs.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::ChatMessage;
use crate::domain::{Condition, Language};

/// A worked example shown before the real input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FewShotExample {
    pub user: String,
    pub assistant: String,
}

/// System prompts and examples for one annotation manual
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSet {
    /// Language of the prompts and expected responses
    #[serde(default)]
    pub language: Language,

    /// System prompt for zero-shot and few-shot runs
    pub system: String,

    /// System prompt for no-CoT runs (falls back to `system`)
    #[serde(default)]
    pub no_cot_system: Option<String>,

    #[serde(default)]
    pub few_shot: Vec<FewShotExample>,
}

impl PromptSet {
    /// Load a prompt set from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a prompt set from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse prompt YAML")
    }

    /// Check that the set can serve `condition`
    pub fn validate(&self, condition: Condition) -> Result<()> {
        if self.system.trim().is_empty() {
            anyhow::bail!("Prompt set has an empty system prompt");
        }
        if condition == Condition::FewShot && self.few_shot.is_empty() {
            anyhow::bail!("Few-shot runs need at least one example in the prompt set");
        }
        Ok(())
    }

    /// Build the conversation for one input text
    pub fn messages(&self, condition: Condition, input: &str) -> Vec<ChatMessage> {
        let system = match condition {
            Condition::NoCot => self.no_cot_system.as_deref().unwrap_or(&self.system),
            Condition::ZeroShot | Condition::FewShot => &self.system,
        };

        let mut messages = vec![ChatMessage::system(system)];
        if condition == Condition::FewShot {
            for example in &self.few_shot {
                messages.push(ChatMessage::user(example.user.as_str()));
                messages.push(ChatMessage::assistant(example.assistant.as_str()));
            }
        }
        messages.push(ChatMessage::user(input));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Role;

    const PROMPTS: &str = r#"
language: en
system: Classify the text.
no_cot_system: Classify the text. Answer with the labels only.
few_shot:
  - user: "Born and raised here."
    assistant: "**Output:** RL3"
"#;

    #[test]
    fn test_prompt_parsing() {
        let prompts = PromptSet::from_yaml(PROMPTS).unwrap();
        assert_eq!(prompts.language, Language::En);
        assert_eq!(prompts.few_shot.len(), 1);
    }

    #[test]
    fn test_messages_per_condition() {
        let prompts = PromptSet::from_yaml(PROMPTS).unwrap();

        let zero = prompts.messages(Condition::ZeroShot, "input");
        assert_eq!(zero.len(), 2);
        assert_eq!(zero[0].content, "Classify the text.");

        let few = prompts.messages(Condition::FewShot, "input");
        assert_eq!(few.len(), 4);
        assert_eq!(few[2].role, Role::Assistant);
        assert_eq!(few[3], ChatMessage::user("input"));

        let no_cot = prompts.messages(Condition::NoCot, "input");
        assert!(no_cot[0].content.ends_with("labels only."));
    }

    #[test]
    fn test_few_shot_requires_examples() {
        let prompts = PromptSet::from_yaml("system: hi").unwrap();
        assert_eq!(prompts.language, Language::Zh);
        assert!(prompts.validate(Condition::ZeroShot).is_ok());
        assert!(prompts.validate(Condition::FewShot).is_err());
    }
}
