//! Slack Web API client
//!
//! Only the two calls the chat handlers need: read one message and resolve
//! its permalink. Slack reports failures as `{"ok": false, "error": ...}`
//! with HTTP 200, so both the status and the body are checked.

use super::retry::{with_retry, RetryConfig};
use super::tracker::{ChatClient, ChatMessage};
use crate::model::IntegrationAccount;
use crate::{Result, SyncError};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct HistoryData {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    #[serde(default)]
    text: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PermalinkData {
    permalink: String,
}

/// Slack Web API client implementing [`ChatClient`]
pub struct SlackClient {
    client: Client,
    api_url: String,
    retry: RetryConfig,
}

impl SlackClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
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
            api_url: api_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        token: &str,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .get(format!("{}/{}", self.api_url, method))
            .bearer_auth(token)
            .query(query)
            .timeout(READ_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let envelope: Envelope<T> = response.json().await?;
                parse_envelope(method, envelope)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let secs = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30);
                Err(SyncError::RateLimited(secs))
            }
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(SyncError::Integration(format!(
                    "Slack {} failed: HTTP {}: {}",
                    method, status, error_body
                )))
            }
        }
    }
}

fn parse_envelope<T>(method: &str, envelope: Envelope<T>) -> Result<T> {
    if !envelope.ok {
        return Err(SyncError::Integration(format!(
            "Slack {} failed: {}",
            method,
            envelope.error.unwrap_or_else(|| "unknown_error".to_string())
        )));
    }
    envelope
        .data
        .ok_or_else(|| SyncError::Integration(format!("Slack {} returned no data", method)))
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn fetch_message(
        &self,
        account: &IntegrationAccount,
        channel: &str,
        ts: &str,
    ) -> Result<ChatMessage> {
        let token = account.settings.access_token.as_deref().ok_or_else(|| {
            SyncError::Config(format!("Slack account {} has no access token", account.id))
        })?;

        debug!(channel = %channel, ts = %ts, "Fetching Slack message");

        let history_query = [
            ("channel", channel),
            ("latest", ts),
            ("inclusive", "true"),
            ("limit", "1"),
        ];
        let history_query = &history_query[..];
        let history: HistoryData = with_retry(&self.retry, "slack.conversations_history", move || {
            self.call(token, "conversations.history", history_query)
        })
        .await?;
        let message = history.messages.into_iter().next().ok_or_else(|| {
            SyncError::NotFound(format!("Slack message {} in {}", ts, channel))
        })?;

        let permalink_query = [("channel", channel), ("message_ts", ts)];
        let permalink_query = &permalink_query[..];
        let permalink: PermalinkData = with_retry(&self.retry, "slack.get_permalink", move || {
            self.call(token, "chat.getPermalink", permalink_query)
        })
        .await?;

        Ok(ChatMessage {
            text: message.text,
            permalink: permalink.permalink,
            user: message.user,
            thread_ts: message.thread_ts,
        })
    }
}
