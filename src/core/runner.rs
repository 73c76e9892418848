//! Batch runner for model classification runs.
//!
//! Each input text becomes one independent model call. At most
//! `max_concurrent` calls are in flight, each call waits a short delay
//! before starting, and every failure (including a panicked task) becomes a
//! per-sample `ERROR` record instead of aborting the batch. Output order
//! follows input order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{Adapter, AdapterOutput, CallError, ChatMessage};
use crate::dataset::{read_predictions, write_predictions};
use crate::domain::{Condition, Language, PredictionRecord, CALL_ERROR_SENTINEL};

use super::evaluation::FailureCounts;
use super::extractor::extract_output;
use super::parser::interpret_prediction;
use super::prompt::PromptSet;
use super::retry::RetryPolicy;

/// Concurrency and retry settings for a batch
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub max_concurrent: usize,
    /// Pause before each call starts
    pub request_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            request_delay: Duration::from_millis(100),
            retry: RetryPolicy::default(),
        }
    }
}

/// Call the adapter, retrying per `policy`.
pub async fn call_with_retry(
    adapter: &dyn Adapter,
    messages: &[ChatMessage],
    policy: &RetryPolicy,
) -> Result<AdapterOutput, CallError> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match adapter.complete(messages).await {
            Ok(output) => return Ok(output),
            Err(e) => {
                if policy.should_retry(attempt) {
                    let delay = policy.delay_for_error(attempt, &e);
                    warn!(
                        adapter = adapter.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        rate_limited = e.is_rate_limit(),
                        error = %e,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                error!(
                    adapter = adapter.name(),
                    attempt,
                    error = %e,
                    "Model call failed permanently"
                );
                return Err(e);
            }
        }
    }
}

/// Record for a successful response: the extracted label cell plus the raw text
pub fn record_from_response(text: &str, response: &str, language: Language) -> PredictionRecord {
    PredictionRecord::new(text, extract_output(response, language).into_cell(), response)
}

/// Record for a failed call: the `ERROR` sentinel plus the error text
pub fn record_from_failure(text: &str, error: &str) -> PredictionRecord {
    PredictionRecord::new(text, CALL_ERROR_SENTINEL, error)
}

/// Outcome tallies for a set of records
pub fn summarize_records(records: &[PredictionRecord], language: Language) -> FailureCounts {
    let predictions: Vec<_> = records
        .iter()
        .map(|r| interpret_prediction(r.labels.as_deref(), language))
        .collect();
    FailureCounts::tally(&predictions)
}

/// Metadata written beside a run's output file
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub model: String,
    pub condition: Condition,
    pub language: Language,
    pub output: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Input texts, including ones already done
    pub inputs: usize,
    /// Texts skipped because a previous run already processed them
    pub resumed: usize,
    /// Texts sent to the model in this run
    pub processed: usize,
    /// Tokens reported by the provider for calls made in this run
    pub tokens_used: u64,
    pub summary: FailureCounts,
}

impl RunManifest {
    /// `results/m_few_shot.csv` -> `results/m_few_shot.manifest.json`
    pub fn path_for(output: &Path) -> PathBuf {
        output.with_extension("manifest.json")
    }

    pub fn write(&self) -> Result<PathBuf> {
        let path = Self::path_for(&self.output);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run manifest")?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write manifest: {}", path.display()))?;
        Ok(path)
    }
}

/// Runs one model under one prompting condition over many texts
pub struct BatchRunner {
    adapter: Arc<dyn Adapter>,
    prompts: Arc<PromptSet>,
    condition: Condition,
    options: RunnerOptions,
}

impl BatchRunner {
    pub fn new(adapter: Arc<dyn Adapter>, prompts: PromptSet, condition: Condition, options: RunnerOptions) -> Self {
        Self {
            adapter,
            prompts: Arc::new(prompts),
            condition,
            options,
        }
    }

    pub fn language(&self) -> Language {
        self.prompts.language
    }

    /// Classify every text, returning one record per input in input order.
    pub async fn run(&self, texts: &[String]) -> Vec<PredictionRecord> {
        self.run_with_usage(texts).await.0
    }

    /// Like [`run`](Self::run), also summing the tokens the provider reported.
    pub async fn run_with_usage(&self, texts: &[String]) -> (Vec<PredictionRecord>, u64) {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(texts.len());

        for text in texts {
            let adapter = Arc::clone(&self.adapter);
            let prompts = Arc::clone(&self.prompts);
            let semaphore = Arc::clone(&semaphore);
            let policy = self.options.retry.clone();
            let delay = self.options.request_delay;
            let condition = self.condition;
            let text = text.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (record_from_failure(&text, &e.to_string()), None),
                };
                tokio::time::sleep(delay).await;

                let messages = prompts.messages(condition, &text);
                match call_with_retry(adapter.as_ref(), &messages, &policy).await {
                    Ok(output) => (
                        record_from_response(&text, &output.content, prompts.language),
                        output.tokens_used,
                    ),
                    Err(e) => (record_from_failure(&text, &e.to_string()), None),
                }
            }));
        }

        let mut records = Vec::with_capacity(texts.len());
        let mut tokens_used = 0u64;
        for (text, handle) in texts.iter().zip(handles) {
            match handle.await {
                Ok((record, tokens)) => {
                    tokens_used += tokens.unwrap_or(0);
                    records.push(record);
                }
                Err(e) => {
                    error!(error = %e, "Classification task did not complete");
                    records.push(record_from_failure(text, &e.to_string()));
                }
            }
        }
        (records, tokens_used)
    }

    /// Run over `texts`, resuming from and writing to `output`.
    ///
    /// Texts already present in an existing output file are skipped; new
    /// records are appended after the existing ones.
    #[instrument(skip(self, texts), fields(model = self.adapter.name(), condition = %self.condition))]
    pub async fn run_to_file(&self, texts: &[String], output: &Path) -> Result<RunManifest> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();

        let mut records = if output.exists() {
            read_predictions(output)?
        } else {
            Vec::new()
        };
        let done: HashSet<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let pending: Vec<String> = texts
            .iter()
            .filter(|t| !done.contains(t.as_str()))
            .cloned()
            .collect();
        let resumed = texts.len() - pending.len();

        let mut tokens_used = 0;
        if pending.is_empty() {
            info!(%run_id, output = %output.display(), "All texts already processed, skipping");
        } else {
            info!(%run_id, pending = pending.len(), resumed, "Starting classification run");
            let (fresh, tokens) = self.run_with_usage(&pending).await;
            tokens_used = tokens;
            records.extend(fresh);
            write_predictions(output, &records)?;
        }

        let manifest = RunManifest {
            run_id,
            model: self.adapter.name().to_string(),
            condition: self.condition,
            language: self.language(),
            output: output.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            inputs: texts.len(),
            resumed,
            processed: pending.len(),
            tokens_used,
            summary: summarize_records(&records, self.language()),
        };
        manifest.write()?;

        info!(
            total = manifest.summary.total,
            parsed = manifest.summary.labelled + manifest.summary.empty,
            call_errors = manifest.summary.call_failures,
            parse_errors = manifest.summary.parse_failures,
            tokens = manifest.tokens_used,
            "Run finished"
        );
        Ok(manifest)
    }
}
