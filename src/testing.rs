//! In-memory fakes of the external collaborators, for unit tests

use crate::integrations::{ChatClient, ChatMessage, ExternalItem, ExternalTracker};
use crate::model::{
    IntegrationAccount, IntegrationSettings, Issue, LinkedIssue, Provider, TeamMapping, UserId,
};
use crate::summarize::Summarizer;
use crate::{Result, SyncError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const BOT_LOGIN: &str = "issuesync[bot]";
pub(crate) const SLACK_BOT: &str = "U0BOT";

pub(crate) fn github_account(team: &str, repo: &str) -> IntegrationAccount {
    IntegrationAccount::new(
        Provider::GitHub,
        "inst-1",
        "ws-1",
        IntegrationSettings {
            bot_user_id: Some(BOT_LOGIN.into()),
            mappings: vec![TeamMapping::new(team, repo).bidirectional()],
            ..Default::default()
        },
    )
}

pub(crate) fn slack_account(team: &str, channel: &str) -> IntegrationAccount {
    IntegrationAccount::new(
        Provider::Slack,
        "T1",
        "ws-1",
        IntegrationSettings {
            bot_user_id: Some(SLACK_BOT.into()),
            mappings: vec![TeamMapping::new(team, channel)],
            access_token: Some("xoxb-test".into()),
            ..Default::default()
        },
    )
}

struct RecordedUpsert {
    existing: Option<String>,
    title: String,
}

/// Tracker that mints `1100 + number` as the external id
pub(crate) struct FakeTracker {
    upserts: Mutex<Vec<RecordedUpsert>>,
    comments: AtomicUsize,
    delay: Option<Duration>,
    /// Consumed one per upsert before falling back to `delay`
    delays: Mutex<VecDeque<Duration>>,
    fail: bool,
    panic: bool,
}

impl FakeTracker {
    pub(crate) fn new() -> Self {
        Self {
            upserts: Mutex::new(Vec::new()),
            comments: AtomicUsize::new(0),
            delay: None,
            delays: Mutex::new(VecDeque::new()),
            fail: false,
            panic: false,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Latency of the next upserts, in call order
    pub(crate) fn with_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.delays.lock().unwrap().extend(delays);
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    pub(crate) fn upsert_count(&self) -> usize {
        self.upserts.lock().unwrap().len()
    }

    /// Upserts made without an existing link, i.e. external items created
    pub(crate) fn created_count(&self) -> usize {
        self.upserts
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.existing.is_none())
            .count()
    }

    /// Titles in the order the upserts completed
    pub(crate) fn pushed_titles(&self) -> Vec<String> {
        self.upserts
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.title.clone())
            .collect()
    }

    pub(crate) fn comment_count(&self) -> usize {
        self.comments.load(Ordering::SeqCst)
    }

    /// `existing` link source ids passed to each upsert, in call order
    pub(crate) fn existing_seen(&self) -> Vec<Option<String>> {
        self.upserts
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.existing.clone())
            .collect()
    }
}

#[async_trait]
impl ExternalTracker for FakeTracker {
    fn provider(&self) -> Provider {
        Provider::GitHub
    }

    async fn upsert_item(
        &self,
        issue: &Issue,
        _account: &IntegrationAccount,
        _actor: Option<&UserId>,
        existing: Option<&LinkedIssue>,
    ) -> Result<ExternalItem> {
        let delay = self.delays.lock().unwrap().pop_front().or(self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic {
            panic!("tracker blew up on {}", issue.display_key());
        }
        self.upserts.lock().unwrap().push(RecordedUpsert {
            existing: existing.map(|l| l.source_id.clone()),
            title: issue.title.clone(),
        });
        if self.fail {
            return Err(SyncError::Integration(
                "GitHub API error: HTTP 422: invalid".into(),
            ));
        }

        let number = 1100 + issue.number;
        Ok(ExternalItem {
            external_id: number.to_string(),
            external_url: format!("https://github.com/acme/api/issues/{}", number),
            external_title: Some(issue.title.clone()),
            source_data: serde_json::json!({ "number": number }),
        })
    }

    async fn post_linking_comment(
        &self,
        _account: &IntegrationAccount,
        _issue: &Issue,
        _external_id: &str,
    ) -> Result<()> {
        self.comments.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Summarizer returning a fixed reply, or failing when it has none
pub(crate) struct FakeSummarizer {
    reply: Option<String>,
    delay: Option<Duration>,
    enabled: bool,
    calls: AtomicUsize,
}

impl FakeSummarizer {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            delay: None,
            enabled: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            delay: None,
            enabled: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, _description: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| SyncError::Integration("Summarizer error: HTTP 503: down".into()))
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Chat workspace with pre-seeded messages keyed by (channel, ts)
#[derive(Default)]
pub(crate) struct FakeChat {
    messages: HashMap<(String, String), ChatMessage>,
}

impl FakeChat {
    pub(crate) fn with_message(mut self, channel: &str, ts: &str, text: &str) -> Self {
        self.messages.insert(
            (channel.to_string(), ts.to_string()),
            ChatMessage {
                text: text.to_string(),
                permalink: permalink(channel, ts),
                user: Some("U123".to_string()),
                thread_ts: None,
            },
        );
        self
    }
}

pub(crate) fn permalink(channel: &str, ts: &str) -> String {
    format!(
        "https://acme.slack.com/archives/{}/p{}",
        channel,
        ts.replace('.', "")
    )
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn fetch_message(
        &self,
        _account: &IntegrationAccount,
        channel: &str,
        ts: &str,
    ) -> Result<ChatMessage> {
        self.messages
            .get(&(channel.to_string(), ts.to_string()))
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("message {} in {}", ts, channel)))
    }
}
