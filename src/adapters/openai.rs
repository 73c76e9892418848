//! OpenAI-compatible chat-completions adapter.
//!
//! Works against any endpoint that speaks `POST {base_url}/chat/completions`
//! with bearer authentication. HTTP 429 becomes [`CallError::RateLimited`]
//! carrying the wait the server asked for, taken from the `Retry-After`
//! header or from a "try again in ..." hint in the error body.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Adapter, AdapterOutput, CallError, ChatMessage};

/// Request settings for one model endpoint
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Chat-completions adapter over reqwest
pub struct OpenAiAdapter {
    settings: OpenAiSettings,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

static TRY_AGAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)try again in\s*([0-9]+(?:\.[0-9]+)?)\s*(ms|s)\b").expect("valid retry hint pattern")
});

/// Parse a "Please try again in 350ms" / "try again in 1.5s" hint
pub fn parse_retry_hint(message: &str) -> Option<Duration> {
    let captures = TRY_AGAIN_PATTERN.captures(message)?;
    let value: f64 = captures[1].parse().ok()?;
    let millis = match &captures[2].to_ascii_lowercase()[..] {
        "ms" => value,
        _ => value * 1000.0,
    };
    Some(Duration::from_millis(millis.ceil() as u64))
}

/// Seconds from a numeric `Retry-After` header
fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let seconds: f64 = value.trim().parse().ok()?;
    Some(Duration::from_millis((seconds * 1000.0).ceil() as u64))
}

impl OpenAiAdapter {
    pub fn new(settings: OpenAiSettings) -> Result<Self, CallError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CallError::Transport(e.to_string()))?;
        Ok(Self { settings, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Adapter for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<AdapterOutput, CallError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            max_tokens: self.settings.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let header_wait = retry_after_header(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::RateLimited {
                retry_after: header_wait.or_else(|| parse_retry_hint(&body)),
                message: body,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CallError::InvalidResponse("response has no message content".to_string()))?;

        debug!(model = %self.settings.model, chars = content.len(), "Model call completed");

        Ok(AdapterOutput {
            content,
            tokens_used: parsed.usage.map(|u| u.total_tokens),
        })
    }
}
