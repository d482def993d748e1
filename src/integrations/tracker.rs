//! Contracts the sync engine needs from external providers

use crate::model::{IntegrationAccount, Issue, LinkedIssue, Provider, UserId};
use crate::Result;
use async_trait::async_trait;

/// External-side identity of an item after an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalItem {
    pub external_id: String,
    pub external_url: String,
    pub external_title: Option<String>,
    /// Provider payload kept on the link
    pub source_data: serde_json::Value,
}

/// Code-hosting issue tracker that mirrors canonical issues
#[async_trait]
pub trait ExternalTracker: Send + Sync {
    fn provider(&self) -> Provider;

    /// Create the external item, or update it when `existing` links one.
    /// Must be safe to call repeatedly for the same issue.
    async fn upsert_item(
        &self,
        issue: &Issue,
        account: &IntegrationAccount,
        actor: Option<&UserId>,
        existing: Option<&LinkedIssue>,
    ) -> Result<ExternalItem>;

    /// Tell the external side which canonical issue it is linked to
    async fn post_linking_comment(
        &self,
        account: &IntegrationAccount,
        issue: &Issue,
        external_id: &str,
    ) -> Result<()>;
}

/// A chat message as the triage and thread handlers need it
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub text: String,
    pub permalink: String,
    pub user: Option<String>,
    pub thread_ts: Option<String>,
}

/// Read access to a chat workspace
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn fetch_message(
        &self,
        account: &IntegrationAccount,
        channel: &str,
        ts: &str,
    ) -> Result<ChatMessage>;
}
