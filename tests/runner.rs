//! Batch Runner Integration Tests
//!
//! Drives the runner with a scripted in-process adapter: ordering, retry,
//! per-sample failure isolation and resume.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rl_eval::adapters::{Adapter, AdapterOutput, CallError, ChatMessage};
use rl_eval::core::prompt::PromptSet;
use rl_eval::core::retry::RetryPolicy;
use rl_eval::core::runner::{call_with_retry, BatchRunner, RunManifest, RunnerOptions};
use rl_eval::dataset::{read_predictions, write_predictions};
use rl_eval::domain::{Condition, PredictionRecord};
use tempfile::TempDir;

/// Answers by input text:
/// - `fail...`: always HTTP 500
/// - `flaky...`: rate limited on the first attempt
/// - `panic...`: panics
/// - anything else: `RL<len % 7 + 1>`
#[derive(Default)]
struct ScriptedAdapter {
    attempts: Mutex<HashMap<String, u32>>,
}

impl ScriptedAdapter {
    fn attempts(&self, input: &str) -> u32 {
        self.attempts.lock().unwrap().get(input).copied().unwrap_or(0)
    }

    fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }
}

fn label_for(input: &str) -> String {
    format!("RL{}", input.chars().count() % 7 + 1)
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<AdapterOutput, CallError> {
        let input = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(input.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        if input.starts_with("fail") {
            return Err(CallError::Http {
                status: 500,
                body: "upstream exploded".to_string(),
            });
        }
        if input.starts_with("flaky") && attempt == 1 {
            return Err(CallError::RateLimited {
                retry_after: Some(Duration::from_millis(1)),
                message: "slow down".to_string(),
            });
        }
        if input.starts_with("panic") {
            panic!("adapter bug");
        }

        Ok(AdapterOutput {
            content: format!("Step 1: read it.\n**Output:** {}", label_for(&input)),
            tokens_used: Some(input.chars().count() as u64),
        })
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay_ms: 1,
        max_delay_ms: 2,
        rate_limit_max_delay_ms: 2,
        rate_limit_margin_ms: 1,
        backoff_multiplier: 2.0,
    }
}

fn runner(adapter: Arc<ScriptedAdapter>) -> BatchRunner {
    let prompts = PromptSet::from_yaml("language: en\nsystem: Classify the comment.\n").unwrap();
    let options = RunnerOptions {
        max_concurrent: 3,
        request_delay: Duration::from_millis(0),
        retry: fast_retry(),
    };
    BatchRunner::new(adapter, prompts, Condition::ZeroShot, options)
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_output_follows_input_order() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let inputs: Vec<String> = (0..20).map(|i| "x".repeat(i + 1)).collect();

    let records = runner(Arc::clone(&adapter)).run(&inputs).await;

    assert_eq!(records.len(), inputs.len());
    for (record, input) in records.iter().zip(&inputs) {
        assert_eq!(&record.text, input);
        assert_eq!(record.labels.as_deref(), Some(label_for(input).as_str()));
    }
}

#[tokio::test]
async fn test_failures_stay_per_sample() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let inputs = texts(&["first", "fail hard", "panic now", "last one"]);

    let records = runner(Arc::clone(&adapter)).run(&inputs).await;

    assert_eq!(records.len(), 4);
    assert_eq!(records[0].labels.as_deref(), Some(label_for("first").as_str()));
    assert_eq!(records[1].labels.as_deref(), Some("ERROR"));
    assert!(records[1].raw_output.as_deref().unwrap_or("").contains("HTTP 500"));
    assert_eq!(records[2].text, "panic now");
    assert_eq!(records[2].labels.as_deref(), Some("ERROR"));
    assert_eq!(records[3].labels.as_deref(), Some(label_for("last one").as_str()));

    // Permanent failures use every attempt
    assert_eq!(adapter.attempts("fail hard"), 3);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let adapter = ScriptedAdapter::default();
    let messages = vec![ChatMessage::user("flaky input")];

    let output = call_with_retry(&adapter, &messages, &fast_retry()).await.unwrap();

    assert!(output.content.contains("**Output:**"));
    assert_eq!(adapter.attempts("flaky input"), 2);
}

#[tokio::test]
async fn test_run_to_file_resumes() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("results").join("scripted_zero_shot.csv");

    write_predictions(&output, &[PredictionRecord::new("already done", "RL2", "earlier run")]).unwrap();

    let adapter = Arc::new(ScriptedAdapter::default());
    let manifest = runner(Arc::clone(&adapter))
        .run_to_file(&texts(&["already done", "new text", "fail again"]), &output)
        .await
        .unwrap();

    assert_eq!(manifest.inputs, 3);
    assert_eq!(manifest.resumed, 1);
    assert_eq!(manifest.processed, 2);
    assert_eq!(manifest.summary.total, 3);
    assert_eq!(manifest.summary.call_failures, 1);
    // Only "new text" succeeded in this run
    assert_eq!(manifest.tokens_used, "new text".chars().count() as u64);
    assert_eq!(adapter.attempts("already done"), 0);
    assert!(RunManifest::path_for(&output).exists());

    let records = read_predictions(&output).unwrap();
    let order: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(order, vec!["already done", "new text", "fail again"]);
    assert_eq!(records[0].raw_output.as_deref(), Some("earlier run"));

    // A second run has nothing left to do
    let before = adapter.total_attempts();
    let again = runner(Arc::clone(&adapter))
        .run_to_file(&texts(&["already done", "new text", "fail again"]), &output)
        .await
        .unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(again.tokens_used, 0);
    assert_eq!(adapter.total_attempts(), before);
}
