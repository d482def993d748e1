//! Append-only issue history
//!
//! One entry per mutation. Entries are never updated; they are only removed
//! in bulk when their issue is hard-deleted.

use crate::diff::IssueDiff;
use crate::model::{row_id, IssueHistoryEntry, IssueId, UserId};
use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

/// Append one entry. Empty diffs are recorded too.
pub fn record(
    conn: &Connection,
    actor_id: Option<&UserId>,
    issue_id: &IssueId,
    diff: &IssueDiff,
    provenance: Option<&serde_json::Value>,
) -> Result<IssueHistoryEntry> {
    let entry = IssueHistoryEntry {
        id: row_id(),
        issue_id: issue_id.clone(),
        actor_id: actor_id.cloned(),
        diff: diff.clone(),
        provenance: provenance.cloned(),
        created_at: Utc::now(),
    };

    conn.execute(
        r#"
        INSERT INTO issue_history (id, issue_id, actor_id, diff, provenance, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            &entry.id,
            entry.issue_id.as_str(),
            entry.actor_id.as_ref().map(|a| a.as_str()),
            serde_json::to_string(&entry.diff)?,
            entry
                .provenance
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            entry.created_at.to_rfc3339(),
        ],
    )?;

    tracing::debug!(
        issue_id = %issue_id,
        fields = ?diff.changed_fields(),
        added_labels = diff.added_label_ids.len(),
        removed_labels = diff.removed_label_ids.len(),
        "History entry recorded"
    );
    Ok(entry)
}

/// Delete every entry of an issue; returns how many were removed
pub fn purge(conn: &Connection, issue_id: &IssueId) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM issue_history WHERE issue_id = ?1",
        [issue_id.as_str()],
    )?;
    Ok(removed)
}

/// Entries of an issue in the order they were recorded
pub fn entries(conn: &Connection, issue_id: &IssueId) -> Result<Vec<IssueHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, issue_id, actor_id, diff, provenance, created_at \
         FROM issue_history WHERE issue_id = ?1 ORDER BY seq",
    )?;

    let rows = stmt.query_map([issue_id.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, issue_id, actor_id, diff, provenance, created_at) = row?;
        out.push(IssueHistoryEntry {
            id,
            issue_id: IssueId::new(issue_id),
            actor_id: actor_id.map(UserId::new),
            diff: serde_json::from_str(&diff)?,
            provenance: provenance.map(|p| serde_json::from_str(&p)).transpose()?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| SyncError::Storage(format!("bad history timestamp: {}", e)))?,
        });
    }
    Ok(out)
}
