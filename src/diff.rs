//! Issue diff engine
//!
//! Computes the field-level change record between two snapshots of an issue.
//! The engine is pure: the same `(previous, next)` pair always produces the
//! same [`IssueDiff`] and the same serialized bytes.
//!
//! Tracked scalar fields are assignee, priority, parent, state and estimate.
//! Title and description are not tracked. Labels are compared as sets.

use crate::model::{Issue, IssueId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Before/after values of one tracked field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange<T> {
    /// Absent on creation, or when the field was previously unset
    pub from: Option<T>,
    pub to: Option<T>,
}

impl<T> FieldChange<T> {
    fn reversed(self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

/// Sparse change record: unchanged fields are `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IssueDiffWire", into = "IssueDiffWire")]
pub struct IssueDiff {
    pub assignee_id: Option<FieldChange<UserId>>,
    pub priority: Option<FieldChange<i64>>,
    pub parent_id: Option<FieldChange<IssueId>>,
    pub state_id: Option<FieldChange<String>>,
    pub estimate: Option<FieldChange<i64>>,
    /// Sorted
    pub added_label_ids: Vec<String>,
    /// Sorted
    pub removed_label_ids: Vec<String>,
}

impl IssueDiff {
    /// True when no tracked field and no label changed
    pub fn is_empty(&self) -> bool {
        self.assignee_id.is_none()
            && self.priority.is_none()
            && self.parent_id.is_none()
            && self.state_id.is_none()
            && self.estimate.is_none()
            && self.added_label_ids.is_empty()
            && self.removed_label_ids.is_empty()
    }

    /// The diff that undoes this one
    pub fn reversed(self) -> Self {
        Self {
            assignee_id: self.assignee_id.map(FieldChange::reversed),
            priority: self.priority.map(FieldChange::reversed),
            parent_id: self.parent_id.map(FieldChange::reversed),
            state_id: self.state_id.map(FieldChange::reversed),
            estimate: self.estimate.map(FieldChange::reversed),
            added_label_ids: self.removed_label_ids,
            removed_label_ids: self.added_label_ids,
        }
    }

    /// Names of the scalar fields present in this diff
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.assignee_id.is_some() {
            fields.push("assigneeId");
        }
        if self.priority.is_some() {
            fields.push("priority");
        }
        if self.parent_id.is_some() {
            fields.push("parentId");
        }
        if self.state_id.is_some() {
            fields.push("stateId");
        }
        if self.estimate.is_some() {
            fields.push("estimate");
        }
        fields
    }
}

/// Compute the change record for a mutation.
///
/// `previous = None` means creation: every tracked field with a value is
/// reported as `to` only and every label as added.
pub fn diff(previous: Option<&Issue>, next: &Issue) -> IssueDiff {
    let (added_label_ids, removed_label_ids) = label_changes(
        previous.map(|p| p.label_ids.as_slice()).unwrap_or(&[]),
        &next.label_ids,
    );

    IssueDiff {
        assignee_id: field_change(previous.map(|p| &p.assignee_id), &next.assignee_id),
        priority: field_change(previous.map(|p| &p.priority), &next.priority),
        parent_id: field_change(previous.map(|p| &p.parent_id), &next.parent_id),
        state_id: field_change(previous.map(|p| &p.state_id), &next.state_id),
        estimate: field_change(previous.map(|p| &p.estimate), &next.estimate),
        added_label_ids,
        removed_label_ids,
    }
}

fn field_change<T: Clone + PartialEq>(
    previous: Option<&Option<T>>,
    next: &Option<T>,
) -> Option<FieldChange<T>> {
    match previous {
        None => next.clone().map(|to| FieldChange {
            from: None,
            to: Some(to),
        }),
        Some(prev) if prev != next => Some(FieldChange {
            from: prev.clone(),
            to: next.clone(),
        }),
        Some(_) => None,
    }
}

fn label_changes(previous: &[String], next: &[String]) -> (Vec<String>, Vec<String>) {
    let previous: BTreeSet<&String> = previous.iter().collect();
    let next: BTreeSet<&String> = next.iter().collect();

    let added = next.difference(&previous).map(|s| (*s).clone()).collect();
    let removed = previous.difference(&next).map(|s| (*s).clone()).collect();
    (added, removed)
}

/// Flat `from<Field>`/`to<Field>` representation used on the wire and in storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueDiffWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_assignee_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to_assignee_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to_priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_parent_id: Option<IssueId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to_parent_id: Option<IssueId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_state_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to_state_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_estimate: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to_estimate: Option<i64>,
    #[serde(default)]
    added_label_ids: Vec<String>,
    #[serde(default)]
    removed_label_ids: Vec<String>,
}

fn split<T>(change: Option<FieldChange<T>>) -> (Option<T>, Option<T>) {
    match change {
        Some(c) => (c.from, c.to),
        None => (None, None),
    }
}

fn join<T>(from: Option<T>, to: Option<T>) -> Option<FieldChange<T>> {
    if from.is_none() && to.is_none() {
        None
    } else {
        Some(FieldChange { from, to })
    }
}

impl From<IssueDiff> for IssueDiffWire {
    fn from(d: IssueDiff) -> Self {
        let (from_assignee_id, to_assignee_id) = split(d.assignee_id);
        let (from_priority, to_priority) = split(d.priority);
        let (from_parent_id, to_parent_id) = split(d.parent_id);
        let (from_state_id, to_state_id) = split(d.state_id);
        let (from_estimate, to_estimate) = split(d.estimate);
        Self {
            from_assignee_id,
            to_assignee_id,
            from_priority,
            to_priority,
            from_parent_id,
            to_parent_id,
            from_state_id,
            to_state_id,
            from_estimate,
            to_estimate,
            added_label_ids: d.added_label_ids,
            removed_label_ids: d.removed_label_ids,
        }
    }
}

impl From<IssueDiffWire> for IssueDiff {
    fn from(w: IssueDiffWire) -> Self {
        Self {
            assignee_id: join(w.from_assignee_id, w.to_assignee_id),
            priority: join(w.from_priority, w.to_priority),
            parent_id: join(w.from_parent_id, w.to_parent_id),
            state_id: join(w.from_state_id, w.to_state_id),
            estimate: join(w.from_estimate, w.to_estimate),
            added_label_ids: w.added_label_ids,
            removed_label_ids: w.removed_label_ids,
        }
    }
}
