//! Cross-references from canonical issues to external items

use super::{IssueId, Provider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted mapping from one canonical issue to one external item.
/// `url` is unique and is the upsert key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedIssue {
    pub id: String,
    pub issue_id: IssueId,
    pub url: String,
    /// Identifier of the item on the external side
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub source: Provider,
    #[serde(default)]
    pub source_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written by a link upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkData {
    pub url: String,
    pub source_id: String,
    pub title: Option<String>,
    pub source: Provider,
    #[serde(default)]
    pub source_data: serde_json::Value,
}

impl LinkData {
    pub fn new(source: Provider, url: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_id: source_id.into(),
            title: None,
            source,
            source_data: serde_json::Value::Null,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source_data(mut self, data: serde_json::Value) -> Self {
        self.source_data = data;
        self
    }
}

/// Result of upserting a link by url
#[derive(Debug, Clone, PartialEq)]
pub enum LinkUpsert {
    Inserted(LinkedIssue),
    Updated(LinkedIssue),
}

impl LinkUpsert {
    pub fn link(&self) -> &LinkedIssue {
        match self {
            LinkUpsert::Inserted(l) | LinkUpsert::Updated(l) => l,
        }
    }

    pub fn into_link(self) -> LinkedIssue {
        match self {
            LinkUpsert::Inserted(l) | LinkUpsert::Updated(l) => l,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, LinkUpsert::Inserted(_))
    }
}
