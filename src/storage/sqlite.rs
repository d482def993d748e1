//! SQLite-backed store

use super::conversions::{
    account_from_row, comment_from_row, issue_from_row, link_from_row, ts_to_sql,
    ACCOUNT_COLUMNS, COMMENT_COLUMNS, ISSUE_COLUMNS, LINK_COLUMNS,
};
use super::schema::SCHEMA;
use crate::history;
use crate::model::{
    row_id, IntegrationAccount, Issue, IssueComment, IssueId, IssuePatch, LinkData, LinkUpsert,
    LinkedIssue, NewIssue, Provider, TeamId, UserId,
};
use crate::{Result, SyncError};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;

/// Everything needed to insert a new issue row except its number
#[derive(Debug, Clone)]
pub struct IssueDraft {
    pub title: String,
    pub title_generated: bool,
    pub fields: NewIssue,
    pub created_by: Option<UserId>,
    pub source_metadata: Option<serde_json::Value>,
}

/// Result of [`Store::create_issue`]
#[derive(Debug, Clone)]
pub struct CreatedIssue {
    pub issue: Issue,
    /// None when no link was requested or attaching it failed
    pub link: Option<LinkUpsert>,
}

/// Pre- and post-image of one committed update
#[derive(Debug, Clone)]
pub struct IssueUpdate {
    pub before: Issue,
    pub after: Issue,
    pub link: Option<LinkUpsert>,
}

/// SQLite store
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database file
    pub fn open(path: &Path, wal_mode: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "Opening issue database");

        let conn = Connection::open(path)?;
        if wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Underlying connection, for read-only helpers such as [`history::entries`]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // ------------------------------------------------------------------
    // Integration accounts
    // ------------------------------------------------------------------

    /// Insert or replace an account keyed by (provider, external workspace id)
    pub fn save_account(&self, account: &IntegrationAccount) -> Result<()> {
        let settings = serde_json::to_string(&account.settings)?;
        self.conn.execute(
            r#"
            INSERT INTO integration_accounts
                (id, provider, external_workspace_id, workspace_id, settings, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (provider, external_workspace_id) DO UPDATE SET
                workspace_id = excluded.workspace_id,
                settings = excluded.settings
            "#,
            params![
                account.id.as_str(),
                account.provider.as_str(),
                &account.external_workspace_id,
                &account.workspace_id,
                settings,
                ts_to_sql(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn accounts(&self) -> Result<Vec<IntegrationAccount>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM integration_accounts ORDER BY created_at, id",
            ACCOUNT_COLUMNS
        ))?;
        let rows = stmt.query_map([], account_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn accounts_for_provider(&self, provider: Provider) -> Result<Vec<IntegrationAccount>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM integration_accounts WHERE provider = ?1 ORDER BY created_at, id",
            ACCOUNT_COLUMNS
        ))?;
        let rows = stmt.query_map([provider.as_str()], account_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Account a webhook envelope belongs to
    pub fn find_account(
        &self,
        provider: Provider,
        external_workspace_id: &str,
    ) -> Result<Option<IntegrationAccount>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM integration_accounts \
                     WHERE provider = ?1 AND external_workspace_id = ?2",
                    ACCOUNT_COLUMNS
                ),
                params![provider.as_str(), external_workspace_id],
                account_from_row,
            )
            .optional()?)
    }

    // ------------------------------------------------------------------
    // Issues
    // ------------------------------------------------------------------

    /// Insert an issue with the next team number.
    ///
    /// The number is read and consumed inside one immediate transaction. A
    /// requested link is attached inside a savepoint; if that fails the
    /// issue is still created.
    pub fn create_issue(
        &mut self,
        team_id: &TeamId,
        draft: IssueDraft,
        link: Option<&LinkData>,
    ) -> Result<CreatedIssue> {
        let mut tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let number = next_issue_number(&tx, team_id)?;
        let now = Utc::now();
        let issue = Issue {
            id: IssueId::generate(),
            team_id: team_id.clone(),
            number,
            title: draft.title,
            title_generated: draft.title_generated,
            description: draft.fields.description,
            assignee_id: draft.fields.assignee_id,
            priority: draft.fields.priority,
            state_id: draft.fields.state_id,
            estimate: draft.fields.estimate,
            parent_id: draft.fields.parent_id,
            label_ids: draft.fields.label_ids,
            source_metadata: draft.source_metadata,
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        insert_issue(&tx, &issue)?;

        let link = match link {
            Some(data) => attach_link(&mut tx, &issue.id, data)?,
            None => None,
        };

        tx.commit()?;

        tracing::debug!(
            issue_id = %issue.id,
            team_id = %team_id,
            number = number,
            "Issue inserted"
        );
        Ok(CreatedIssue { issue, link })
    }

    /// Read the current snapshot and write the patched one as one atomic unit.
    ///
    /// Returns `NotFound` when the issue does not exist, belongs to another
    /// team, or is soft-deleted.
    pub fn update_issue(
        &mut self,
        team_id: &TeamId,
        issue_id: &IssueId,
        patch: &IssuePatch,
        link: Option<&LinkData>,
    ) -> Result<IssueUpdate> {
        let mut tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let before = select_issue(&tx, issue_id)?
            .filter(|i| &i.team_id == team_id && !i.is_deleted())
            .ok_or_else(|| SyncError::NotFound(format!("issue {}", issue_id)))?;

        let mut after = patch.apply_to(&before);
        after.updated_at = Utc::now();
        write_issue(&tx, &after)?;

        let link = match link {
            Some(data) => attach_link(&mut tx, issue_id, data)?,
            None => None,
        };

        tx.commit()?;
        Ok(IssueUpdate {
            before,
            after,
            link,
        })
    }

    /// Mark an issue deleted. None when absent or already deleted.
    pub fn soft_delete_issue(
        &mut self,
        team_id: &TeamId,
        issue_id: &IssueId,
    ) -> Result<Option<Issue>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut issue) = select_issue(&tx, issue_id)?
            .filter(|i| &i.team_id == team_id && !i.is_deleted())
        else {
            return Ok(None);
        };

        let now = Utc::now();
        issue.deleted_at = Some(now);
        issue.updated_at = now;
        tx.execute(
            "UPDATE issues SET deleted_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![ts_to_sql(&now), ts_to_sql(&now), issue_id.as_str()],
        )?;
        tx.commit()?;
        Ok(Some(issue))
    }

    /// Remove the issue row together with its links, comments and history.
    ///
    /// Returns the number of purged history entries, or None when the issue
    /// does not exist for this team.
    pub fn hard_delete_issue(
        &mut self,
        team_id: &TeamId,
        issue_id: &IssueId,
    ) -> Result<Option<usize>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = select_issue(&tx, issue_id)?.is_some_and(|i| &i.team_id == team_id);
        if !exists {
            return Ok(None);
        }

        tx.execute(
            "DELETE FROM issue_comments WHERE issue_id = ?1",
            [issue_id.as_str()],
        )?;
        tx.execute(
            "DELETE FROM linked_issues WHERE issue_id = ?1",
            [issue_id.as_str()],
        )?;
        tx.execute("DELETE FROM issues WHERE id = ?1", [issue_id.as_str()])?;
        let purged = history::purge(&tx, issue_id)?;

        tx.commit()?;
        Ok(Some(purged))
    }

    /// Fetch an issue regardless of deletion state
    pub fn get_issue(&self, issue_id: &IssueId) -> Result<Option<Issue>> {
        select_issue(&self.conn, issue_id)
    }

    /// Live issues of a team, by number
    pub fn list_issues(&self, team_id: &TeamId) -> Result<Vec<Issue>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM issues WHERE team_id = ?1 AND deleted_at IS NULL ORDER BY number",
            ISSUE_COLUMNS
        ))?;
        let rows = stmt.query_map([team_id.as_str()], issue_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ------------------------------------------------------------------
    // Linked issues
    // ------------------------------------------------------------------

    /// Upsert a link keyed by its url
    pub fn upsert_link(&mut self, issue_id: &IssueId, data: &LinkData) -> Result<LinkUpsert> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let upsert = upsert_link_in(&tx, issue_id, data)?;
        tx.commit()?;
        Ok(upsert)
    }

    pub fn find_link_by_url(&self, url: &str) -> Result<Option<LinkedIssue>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM linked_issues WHERE url = ?1", LINK_COLUMNS),
                [url],
                link_from_row,
            )
            .optional()?)
    }

    pub fn find_link_by_source_id(
        &self,
        source: Provider,
        source_id: &str,
    ) -> Result<Option<LinkedIssue>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM linked_issues WHERE source = ?1 AND source_id = ?2 \
                     ORDER BY created_at LIMIT 1",
                    LINK_COLUMNS
                ),
                params![source.as_str(), source_id],
                link_from_row,
            )
            .optional()?)
    }

    /// Oldest link of an issue to one provider
    pub fn primary_link(
        &self,
        issue_id: &IssueId,
        source: Provider,
    ) -> Result<Option<LinkedIssue>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM linked_issues WHERE issue_id = ?1 AND source = ?2 \
                     ORDER BY created_at, rowid LIMIT 1",
                    LINK_COLUMNS
                ),
                params![issue_id.as_str(), source.as_str()],
                link_from_row,
            )
            .optional()?)
    }

    pub fn links_for_issue(&self, issue_id: &IssueId) -> Result<Vec<LinkedIssue>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM linked_issues WHERE issue_id = ?1 ORDER BY created_at, rowid",
            LINK_COLUMNS
        ))?;
        let rows = stmt.query_map([issue_id.as_str()], link_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    pub fn add_comment(
        &self,
        issue_id: &IssueId,
        body: &str,
        author_id: Option<&UserId>,
        source_metadata: Option<&serde_json::Value>,
    ) -> Result<IssueComment> {
        let comment = IssueComment {
            id: row_id(),
            issue_id: issue_id.clone(),
            body: body.to_string(),
            author_id: author_id.cloned(),
            source_metadata: source_metadata.cloned(),
            created_at: Utc::now(),
        };
        let metadata = comment
            .source_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            r#"
            INSERT INTO issue_comments (id, issue_id, body, author_id, source_metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                &comment.id,
                comment.issue_id.as_str(),
                &comment.body,
                comment.author_id.as_ref().map(|a| a.as_str()),
                metadata,
                ts_to_sql(&comment.created_at),
            ],
        )?;
        Ok(comment)
    }

    pub fn comments(&self, issue_id: &IssueId) -> Result<Vec<IssueComment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM issue_comments WHERE issue_id = ?1 ORDER BY seq",
            COMMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([issue_id.as_str()], comment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// Next number for a team: one past both the counter and the live maximum.
/// The counter makes numbers of hard-deleted issues unavailable for reuse.
fn next_issue_number(conn: &Connection, team_id: &TeamId) -> Result<i64> {
    let counter: i64 = conn
        .query_row(
            "SELECT last_number FROM team_counters WHERE team_id = ?1",
            [team_id.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    let max_existing: i64 = conn.query_row(
        "SELECT COALESCE(MAX(number), 0) FROM issues WHERE team_id = ?1",
        [team_id.as_str()],
        |row| row.get(0),
    )?;

    let next = counter.max(max_existing) + 1;
    conn.execute(
        r#"
        INSERT INTO team_counters (team_id, last_number) VALUES (?1, ?2)
        ON CONFLICT (team_id) DO UPDATE SET last_number = excluded.last_number
        "#,
        params![team_id.as_str(), next],
    )?;
    Ok(next)
}

fn select_issue(conn: &Connection, issue_id: &IssueId) -> Result<Option<Issue>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM issues WHERE id = ?1", ISSUE_COLUMNS),
            [issue_id.as_str()],
            issue_from_row,
        )
        .optional()?)
}

fn insert_issue(conn: &Connection, issue: &Issue) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO issues ({}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            ISSUE_COLUMNS
        ),
        params![
            issue.id.as_str(),
            issue.team_id.as_str(),
            issue.number,
            &issue.title,
            issue.title_generated,
            issue.description.as_deref(),
            issue.assignee_id.as_ref().map(|a| a.as_str()),
            issue.priority,
            issue.state_id.as_deref(),
            issue.estimate,
            issue.parent_id.as_ref().map(|p| p.as_str()),
            serde_json::to_string(&issue.label_ids)?,
            issue
                .source_metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            issue.created_by.as_ref().map(|u| u.as_str()),
            ts_to_sql(&issue.created_at),
            ts_to_sql(&issue.updated_at),
            issue.deleted_at.as_ref().map(ts_to_sql),
        ],
    )?;
    Ok(())
}

fn write_issue(conn: &Connection, issue: &Issue) -> Result<()> {
    conn.execute(
        r#"
        UPDATE issues SET
            title = ?1, title_generated = ?2, description = ?3, assignee_id = ?4,
            priority = ?5, state_id = ?6, estimate = ?7, parent_id = ?8,
            label_ids = ?9, updated_at = ?10
        WHERE id = ?11
        "#,
        params![
            &issue.title,
            issue.title_generated,
            issue.description.as_deref(),
            issue.assignee_id.as_ref().map(|a| a.as_str()),
            issue.priority,
            issue.state_id.as_deref(),
            issue.estimate,
            issue.parent_id.as_ref().map(|p| p.as_str()),
            serde_json::to_string(&issue.label_ids)?,
            ts_to_sql(&issue.updated_at),
            issue.id.as_str(),
        ],
    )?;
    Ok(())
}

/// Attach a link inside a savepoint so a failure leaves the outer write intact
fn attach_link(
    tx: &mut Transaction<'_>,
    issue_id: &IssueId,
    data: &LinkData,
) -> Result<Option<LinkUpsert>> {
    let sp = tx.savepoint()?;
    match upsert_link_in(&sp, issue_id, data) {
        Ok(upsert) => {
            sp.commit()?;
            Ok(Some(upsert))
        }
        Err(e) => {
            tracing::warn!(
                issue_id = %issue_id,
                url = %data.url,
                error = %e,
                "Failed to attach linked issue; continuing without it"
            );
            Ok(None)
        }
    }
}

fn upsert_link_in(conn: &Connection, issue_id: &IssueId, data: &LinkData) -> Result<LinkUpsert> {
    let now = ts_to_sql(&Utc::now());
    let source_data = serde_json::to_string(&data.source_data)?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM linked_issues WHERE url = ?1",
            [&data.url],
            |row| row.get(0),
        )
        .optional()?;

    let inserted = match existing {
        Some(id) => {
            conn.execute(
                r#"
                UPDATE linked_issues SET
                    issue_id = ?1, source_id = ?2, title = ?3, source = ?4,
                    source_data = ?5, updated_at = ?6
                WHERE id = ?7
                "#,
                params![
                    issue_id.as_str(),
                    &data.source_id,
                    data.title.as_deref(),
                    data.source.as_str(),
                    source_data,
                    now,
                    id,
                ],
            )?;
            false
        }
        None => {
            conn.execute(
                &format!(
                    "INSERT INTO linked_issues ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                    LINK_COLUMNS
                ),
                params![
                    row_id(),
                    issue_id.as_str(),
                    &data.url,
                    &data.source_id,
                    data.title.as_deref(),
                    data.source.as_str(),
                    source_data,
                    now,
                ],
            )?;
            true
        }
    };

    let link = conn.query_row(
        &format!("SELECT {} FROM linked_issues WHERE url = ?1", LINK_COLUMNS),
        [&data.url],
        link_from_row,
    )?;

    Ok(if inserted {
        LinkUpsert::Inserted(link)
    } else {
        LinkUpsert::Updated(link)
    })
}
