//! Title generation for issues created without one
//!
//! The summarizer is an opaque external call: description in, title out.
//! Callers wrap it in their own timeout and fall back to [`fallback_title`].

use crate::config::SummarizerConfig;
use crate::{Result, SyncError};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const MAX_TITLE_CHARS: usize = 80;

const SYSTEM_PROMPT: &str = "You write issue tracker titles. Reply with one short, \
    imperative title (at most 10 words) summarizing the report. No quotes, no trailing period.";

/// Produces a title from free-form text
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, description: &str) -> Result<String>;

    /// False when configured off; callers then skip straight to the fallback
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Title derived locally from the first non-empty line of the description
pub fn fallback_title(description: &str) -> String {
    let line = description
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    truncate_title(line)
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let cut: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}

/// Summarizer for deployments without an API key
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _description: &str) -> Result<String> {
        Err(SyncError::Config("summarizer is disabled".to_string()))
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client
pub struct OpenAiSummarizer {
    client: Client,
    completions_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiSummarizer {
    pub fn new(
        api_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static("issuesync/0.1"),
                );
                headers
            })
            .build()?;

        Ok(Self {
            client,
            completions_url: format!("{}/chat/completions", api_url.trim_end_matches('/')),
            model: model.into(),
            api_key: api_key.into(),
            timeout,
        })
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, description: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: description,
                },
            ],
            max_tokens: 40,
            temperature: 0.2,
        };

        debug!(model = %self.model, chars = description.len(), "Requesting title summary");

        let response = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: ChatResponse = response.json().await?;
                let title = body
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .map(|t| t.trim().trim_matches('"').trim().to_string())
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        SyncError::Integration("Summarizer returned no title".to_string())
                    })?;
                Ok(truncate_title(&title))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(SyncError::RateLimited(
                response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            )),
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(SyncError::Integration(format!(
                    "Summarizer error: HTTP {}: {}",
                    status, error_body
                )))
            }
        }
    }
}

/// Build the summarizer described by the config
pub fn from_config(config: &SummarizerConfig) -> Result<std::sync::Arc<dyn Summarizer>> {
    match (config.enabled, config.api_key()) {
        (true, Some(key)) => Ok(std::sync::Arc::new(OpenAiSummarizer::new(
            &config.api_url,
            config.model.clone(),
            key,
            config.timeout(),
        )?)),
        _ => Ok(std::sync::Arc::new(DisabledSummarizer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_summarizer_reports_disabled() {
        assert!(!DisabledSummarizer.is_enabled());
    }

    #[test]
    fn test_fallback_uses_first_line() {
        assert_eq!(
            fallback_title("\n  App crashes on launch  \nstack trace..."),
            "App crashes on launch"
        );
        assert_eq!(fallback_title(""), "");
    }

    #[test]
    fn test_fallback_is_truncated() {
        let long = "x".repeat(200);
        let title = fallback_title(&long);
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
        assert!(title.ends_with("..."));
    }

    #[tokio::test]
    async fn test_disabled_summarizer_fails() {
        assert!(DisabledSummarizer.summarize("anything").await.is_err());
    }

    #[test]
    fn test_completions_url() {
        let s = OpenAiSummarizer::new(
            "https://api.openai.com/v1/",
            "gpt-4o-mini",
            "key",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(s.completions_url, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_from_config_without_key_is_disabled() {
        let config = SummarizerConfig {
            api_key_env: "ISSUESYNC_TEST_UNSET_KEY".into(),
            ..Default::default()
        };
        assert!(from_config(&config).is_ok());
    }
}
