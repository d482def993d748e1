//! Canonical issue record and the values used to create or change it

use super::{IssueId, TeamId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The system's authoritative record of a work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: IssueId,

    pub team_id: TeamId,

    /// Team-scoped sequence number, assigned once at creation
    pub number: i64,

    pub title: String,

    /// True when the title came from the summarizer (or its fallback)
    /// rather than from a person. Only generated titles are regenerated.
    #[serde(default)]
    pub title_generated: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<UserId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<IssueId>,

    #[serde(default)]
    pub label_ids: Vec<String>,

    /// Opaque provenance of an externally created issue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_metadata: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Soft-delete timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Issue {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Human-facing identifier, e.g. `ENG-42` for team `eng`
    pub fn display_key(&self) -> String {
        format!("{}-{}", self.team_id.as_str().to_uppercase(), self.number)
    }
}

/// Fields supplied when creating an issue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIssue {
    /// Explicit title; when absent the description is summarized
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<UserId>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub state_id: Option<String>,
    #[serde(default)]
    pub estimate: Option<i64>,
    #[serde(default)]
    pub parent_id: Option<IssueId>,
    #[serde(default)]
    pub label_ids: Vec<String>,
}

impl NewIssue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<UserId>) -> Self {
        self.assignee_id = Some(assignee.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_state(mut self, state_id: impl Into<String>) -> Self {
        self.state_id = Some(state_id.into());
        self
    }

    pub fn with_estimate(mut self, estimate: i64) -> Self {
        self.estimate = Some(estimate);
        self
    }

    pub fn with_parent(mut self, parent: impl Into<IssueId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_ids = labels.into_iter().map(Into::into).collect();
        self
    }
}

/// Presence-aware change to one optional field
///
/// `Keep` leaves the field alone, `Set` overwrites it and `Clear` removes
/// the value. This keeps "not mentioned" distinct from "set to nothing".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Keep,
    Set(T),
    Clear,
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// Build from an optional value: `Some` sets, `None` clears
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        }
    }

    fn apply(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Set(v) => *slot = Some(v),
            Patch::Clear => *slot = None,
        }
    }
}

/// Where a new title came from.
///
/// A generated title only replaces a title that was itself generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleUpdate {
    /// Typed by a person or mirrored from an external tracker
    User(String),
    /// Produced by the summarizer
    Generated(String),
}

/// Sparse update: only fields that are not `Keep` are written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssuePatch {
    pub title: Option<TitleUpdate>,
    pub description: Patch<String>,
    pub assignee_id: Patch<UserId>,
    pub priority: Patch<i64>,
    pub state_id: Patch<String>,
    pub estimate: Patch<i64>,
    pub parent_id: Patch<IssueId>,
    /// Replaces the whole label list when present
    pub label_ids: Option<Vec<String>>,
}

impl IssuePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(TitleUpdate::User(title.into()));
        self
    }

    pub fn description(mut self, description: Patch<String>) -> Self {
        self.description = description;
        self
    }

    pub fn assignee(mut self, assignee: Patch<UserId>) -> Self {
        self.assignee_id = assignee;
        self
    }

    pub fn priority(mut self, priority: Patch<i64>) -> Self {
        self.priority = priority;
        self
    }

    pub fn state(mut self, state_id: Patch<String>) -> Self {
        self.state_id = state_id;
        self
    }

    pub fn estimate(mut self, estimate: Patch<i64>) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn parent(mut self, parent: Patch<IssueId>) -> Self {
        self.parent_id = parent;
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_ids = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    /// True when applying the patch cannot change anything
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_keep()
            && self.assignee_id.is_keep()
            && self.priority.is_keep()
            && self.state_id.is_keep()
            && self.estimate.is_keep()
            && self.parent_id.is_keep()
            && self.label_ids.is_none()
    }

    /// Apply to a snapshot, producing the post-image (timestamps untouched)
    pub fn apply_to(&self, issue: &Issue) -> Issue {
        let mut next = issue.clone();
        match &self.title {
            Some(TitleUpdate::User(t)) => {
                next.title = t.clone();
                next.title_generated = false;
            }
            // Never replaces a title a person typed
            Some(TitleUpdate::Generated(t)) if issue.title_generated => {
                next.title = t.clone();
            }
            Some(TitleUpdate::Generated(_)) => {}
            None => {}
        }
        self.description.clone().apply(&mut next.description);
        self.assignee_id.clone().apply(&mut next.assignee_id);
        self.priority.clone().apply(&mut next.priority);
        self.state_id.clone().apply(&mut next.state_id);
        self.estimate.clone().apply(&mut next.estimate);
        self.parent_id.clone().apply(&mut next.parent_id);
        if let Some(labels) = &self.label_ids {
            next.label_ids = labels.clone();
        }
        next
    }
}

#[cfg(test)]
pub(crate) fn sample_issue(team: &str, number: i64) -> Issue {
    let now = Utc::now();
    Issue {
        id: IssueId::new(format!("{}-{}", team, number)),
        team_id: TeamId::new(team),
        number,
        title: format!("Issue {}", number),
        title_generated: false,
        description: None,
        assignee_id: None,
        priority: None,
        state_id: None,
        estimate: None,
        parent_id: None,
        label_ids: Vec::new(),
        source_metadata: None,
        created_by: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_keep_set_clear() {
        let mut issue = sample_issue("eng", 1);
        issue.assignee_id = Some(UserId::new("u1"));
        issue.priority = Some(2);

        let next = IssuePatch::new()
            .assignee(Patch::Set(UserId::new("u2")))
            .priority(Patch::Clear)
            .apply_to(&issue);

        assert_eq!(next.assignee_id, Some(UserId::new("u2")));
        assert_eq!(next.priority, None);
        assert_eq!(next.title, issue.title);
    }

    #[test]
    fn test_title_update_tracks_origin() {
        let mut issue = sample_issue("eng", 1);
        issue.title_generated = true;

        let user = IssuePatch::new().title("Typed").apply_to(&issue);
        assert_eq!(user.title, "Typed");
        assert!(!user.title_generated);

        let generated = IssuePatch {
            title: Some(TitleUpdate::Generated("Summarized".into())),
            ..Default::default()
        };
        assert_eq!(generated.apply_to(&issue).title, "Summarized");
        assert!(generated.apply_to(&issue).title_generated);
        // A typed title survives a late summary
        assert_eq!(generated.apply_to(&user).title, "Typed");
    }

    #[test]
    fn test_empty_patch() {
        assert!(IssuePatch::new().is_empty());
        assert!(!IssuePatch::new().labels(["l1"]).is_empty());
    }

    #[test]
    fn test_display_key() {
        assert_eq!(sample_issue("eng", 42).display_key(), "ENG-42");
    }
}
