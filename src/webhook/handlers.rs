//! Per-kind event handlers
//!
//! Each handler turns one normalized event into at most one canonical
//! mutation through [`IssueService`]. Expected no-ops come back as
//! [`HandlerOutcome::Declined`]; only real failures are errors.

use super::normalize::{EventKind, InboundEvent, MessageEvent, ReactionEvent, TrackerIssueEvent};
use crate::integrations::{strip_sync_footer, ChatClient};
use crate::model::{IntegrationAccount, IssuePatch, LinkData, NewIssue, Patch, Provider};
use crate::service::{IssueService, MutationContext};
use crate::{Result, SyncError};
use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Dispatch key for the router's handler table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    Message,
    ReactionAdded,
    TrackerIssue,
}

impl HandlerKey {
    pub fn for_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Message(_) => Some(HandlerKey::Message),
            EventKind::ReactionAdded(_) => Some(HandlerKey::ReactionAdded),
            EventKind::TrackerIssue(_) => Some(HandlerKey::TrackerIssue),
            EventKind::Unknown(_) => None,
        }
    }
}

/// Why an event produced no mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    NoAccount,
    BotMessage,
    NotTriageReaction,
    ChannelNotMapped,
    RepositoryNotMapped,
    AlreadyLinked,
    NotLinked,
    NotThreaded,
    IgnoredMessage,
    IgnoredAction,
    Unchanged,
}

impl DeclineReason {
    pub fn message(&self) -> &'static str {
        match self {
            DeclineReason::NoAccount => "no integration account for this workspace",
            DeclineReason::BotMessage => "event was sent by the integration itself",
            DeclineReason::NotTriageReaction => "reaction is not the triage reaction",
            DeclineReason::ChannelNotMapped => "channel is not mapped to a team",
            DeclineReason::RepositoryNotMapped => "repository is not mapped bidirectionally",
            DeclineReason::AlreadyLinked => "message is already linked to an issue",
            DeclineReason::NotLinked => "no linked issue",
            DeclineReason::NotThreaded => "message is not a thread reply",
            DeclineReason::IgnoredMessage => "message subtype is ignored",
            DeclineReason::IgnoredAction => "event action is ignored",
            DeclineReason::Unchanged => "nothing changed",
        }
    }
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Handled(String),
    Declined(DeclineReason),
}

/// Handles one event kind for a resolved account
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn key(&self) -> HandlerKey;

    async fn handle(
        &self,
        event: &InboundEvent,
        account: &IntegrationAccount,
    ) -> Result<HandlerOutcome>;
}

fn source_id(channel: &str, ts: &str) -> String {
    format!("{}:{}", channel, ts)
}

/// Triage reaction on a chat message creates an issue from it
pub struct TriageHandler {
    service: Arc<IssueService>,
    chat: Arc<dyn ChatClient>,
}

impl TriageHandler {
    pub fn new(service: Arc<IssueService>, chat: Arc<dyn ChatClient>) -> Self {
        Self { service, chat }
    }

    async fn triage(
        &self,
        reaction: &ReactionEvent,
        event: &InboundEvent,
        account: &IntegrationAccount,
    ) -> Result<HandlerOutcome> {
        if reaction.reaction != account.settings.triage_reaction() {
            return Ok(HandlerOutcome::Declined(DeclineReason::NotTriageReaction));
        }
        let Some(mapping) = account.settings.mapping_for_external(&reaction.channel) else {
            return Ok(HandlerOutcome::Declined(DeclineReason::ChannelNotMapped));
        };

        let key = source_id(&reaction.channel, &reaction.ts);
        {
            let store = self.service.store().lock().await;
            if store.find_link_by_source_id(Provider::Slack, &key)?.is_some() {
                return Ok(HandlerOutcome::Declined(DeclineReason::AlreadyLinked));
            }
        }

        let message = self
            .chat
            .fetch_message(account, &reaction.channel, &reaction.ts)
            .await?;
        if self
            .service
            .store()
            .lock()
            .await
            .find_link_by_url(&message.permalink)?
            .is_some()
        {
            return Ok(HandlerOutcome::Declined(DeclineReason::AlreadyLinked));
        }

        let metadata = json!({
            "provider": "slack",
            "channel": reaction.channel,
            "ts": reaction.ts,
            "permalink": message.permalink,
            "author": message.user,
        });
        let link = LinkData::new(Provider::Slack, message.permalink.clone(), key)
            .with_source_data(json!({ "channel": reaction.channel, "ts": reaction.ts }));
        let ctx = MutationContext::new()
            .link(link)
            .source_metadata(metadata)
            .provenance(json!({
                "source": "slack",
                "event": "reaction_added",
                "user": event.actor,
            }));

        let created = self
            .service
            .create_issue(
                &mapping.team_id,
                NewIssue::new().with_description(message.text),
                ctx,
            )
            .await?;

        info!(
            issue = %created.issue.display_key(),
            channel = %reaction.channel,
            "Issue triaged from chat"
        );
        Ok(HandlerOutcome::Handled(format!(
            "created {}",
            created.issue.display_key()
        )))
    }
}

#[async_trait]
impl EventHandler for TriageHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::ReactionAdded
    }

    async fn handle(
        &self,
        event: &InboundEvent,
        account: &IntegrationAccount,
    ) -> Result<HandlerOutcome> {
        match &event.kind {
            EventKind::ReactionAdded(reaction) => self.triage(reaction, event, account).await,
            other => Err(SyncError::Other(format!(
                "triage handler got {} event",
                other.name()
            ))),
        }
    }
}

/// Thread replies under a linked message become issue comments
pub struct ThreadHandler {
    service: Arc<IssueService>,
}

impl ThreadHandler {
    pub fn new(service: Arc<IssueService>) -> Self {
        Self { service }
    }

    async fn mirror(&self, message: &MessageEvent, event: &InboundEvent) -> Result<HandlerOutcome> {
        if !message.is_thread_reply() {
            return Ok(HandlerOutcome::Declined(DeclineReason::NotThreaded));
        }
        if message.subtype.is_some() || message.text.trim().is_empty() {
            return Ok(HandlerOutcome::Declined(DeclineReason::IgnoredMessage));
        }
        let Some(root) = message.thread_ts.as_deref() else {
            return Ok(HandlerOutcome::Declined(DeclineReason::NotThreaded));
        };

        let link = self
            .service
            .store()
            .lock()
            .await
            .find_link_by_source_id(Provider::Slack, &source_id(&message.channel, root))?;
        let Some(link) = link else {
            return Ok(HandlerOutcome::Declined(DeclineReason::NotLinked));
        };

        let metadata = json!({
            "provider": "slack",
            "channel": message.channel,
            "ts": message.ts,
            "user": event.actor,
        });
        match self
            .service
            .add_comment(&link.issue_id, &message.text, None, Some(&metadata))
            .await
        {
            Ok(comment) => {
                debug!(issue_id = %link.issue_id, comment_id = %comment.id, "Thread reply mirrored");
                Ok(HandlerOutcome::Handled(format!(
                    "commented on {}",
                    link.issue_id
                )))
            }
            Err(SyncError::NotFound(_)) => Ok(HandlerOutcome::Declined(DeclineReason::NotLinked)),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl EventHandler for ThreadHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::Message
    }

    async fn handle(
        &self,
        event: &InboundEvent,
        _account: &IntegrationAccount,
    ) -> Result<HandlerOutcome> {
        match &event.kind {
            EventKind::Message(message) => self.mirror(message, event).await,
            other => Err(SyncError::Other(format!(
                "thread handler got {} event",
                other.name()
            ))),
        }
    }
}

/// Edits on a linked tracker issue flow back into the canonical issue
pub struct TrackerIssueHandler {
    service: Arc<IssueService>,
}

const APPLIED_ACTIONS: &[&str] = &["opened", "edited", "reopened"];

impl TrackerIssueHandler {
    pub fn new(service: Arc<IssueService>) -> Self {
        Self { service }
    }

    async fn apply(
        &self,
        tracked: &TrackerIssueEvent,
        event: &InboundEvent,
        account: &IntegrationAccount,
    ) -> Result<HandlerOutcome> {
        if !APPLIED_ACTIONS.contains(&tracked.action.as_str()) {
            return Ok(HandlerOutcome::Declined(DeclineReason::IgnoredAction));
        }
        let mapped = account
            .settings
            .mapping_for_external(&tracked.repository)
            .is_some_and(|m| m.bidirectional);
        if !mapped {
            return Ok(HandlerOutcome::Declined(DeclineReason::RepositoryNotMapped));
        }

        let (link, issue) = {
            let store = self.service.store().lock().await;
            let Some(link) = store.find_link_by_url(&tracked.issue.html_url)? else {
                return Ok(HandlerOutcome::Declined(DeclineReason::NotLinked));
            };
            let issue = store.get_issue(&link.issue_id)?;
            (link, issue)
        };
        let Some(issue) = issue.filter(|i| !i.is_deleted()) else {
            return Ok(HandlerOutcome::Declined(DeclineReason::NotLinked));
        };

        let title = tracked.issue.title.trim();
        let body = tracked
            .issue
            .body
            .as_deref()
            .map(strip_sync_footer)
            .map(str::trim)
            .filter(|b| !b.is_empty());

        let mut patch = IssuePatch::new();
        if !title.is_empty() && title != issue.title {
            patch = patch.title(title);
        }
        if body != issue.description.as_deref() {
            patch = patch.description(Patch::from_option(body.map(String::from)));
        }
        if patch.is_empty() {
            return Ok(HandlerOutcome::Declined(DeclineReason::Unchanged));
        }

        let ctx = MutationContext::new().provenance(json!({
            "source": "github",
            "action": tracked.action,
            "repository": tracked.repository,
            "number": tracked.issue.number,
            "sender": event.actor,
        }));
        match self
            .service
            .update_issue(&issue.team_id, &link.issue_id, patch, ctx)
            .await
        {
            Ok(updated) => {
                info!(
                    issue = %updated.issue.display_key(),
                    repo = %tracked.repository,
                    number = tracked.issue.number,
                    "Issue updated from tracker"
                );
                Ok(HandlerOutcome::Handled(format!(
                    "updated {}",
                    updated.issue.display_key()
                )))
            }
            Err(SyncError::NotFound(_)) => Ok(HandlerOutcome::Declined(DeclineReason::NotLinked)),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl EventHandler for TrackerIssueHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::TrackerIssue
    }

    async fn handle(
        &self,
        event: &InboundEvent,
        account: &IntegrationAccount,
    ) -> Result<HandlerOutcome> {
        match &event.kind {
            EventKind::TrackerIssue(tracked) => self.apply(tracked, event, account).await,
            other => Err(SyncError::Other(format!(
                "tracker handler got {} event",
                other.name()
            ))),
        }
    }
}
