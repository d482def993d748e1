//! Core data structures
//!
//! - [`Issue`]: the canonical work item, plus [`NewIssue`] and the sparse [`IssuePatch`]
//! - [`IntegrationAccount`]: one external-tool connection with typed settings
//! - [`LinkedIssue`]: durable cross-reference to an external item
//! - [`IssueHistoryEntry`] and [`IssueComment`]: append-only records hanging off an issue

mod account;
mod ids;
mod issue;
mod linked_issue;

pub use account::{
    IntegrationAccount, IntegrationSettings, Provider, TeamMapping, DEFAULT_TRIAGE_REACTION,
};
pub use ids::{AccountId, IssueId, TeamId, UserId};
pub(crate) use ids::row_id;
pub use issue::{Issue, IssuePatch, NewIssue, Patch, TitleUpdate};
pub use linked_issue::{LinkData, LinkUpsert, LinkedIssue};

#[cfg(test)]
pub(crate) use issue::sample_issue;

use crate::diff::IssueDiff;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable record of one mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueHistoryEntry {
    pub id: String,
    pub issue_id: IssueId,
    /// None when inbound sync acted without a human
    pub actor_id: Option<UserId>,
    #[serde(flatten)]
    pub diff: IssueDiff,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Comment mirrored from a chat thread linked to an issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueComment {
    pub id: String,
    pub issue_id: IssueId,
    pub body: String,
    pub author_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
