//! Row <-> model conversions

use crate::model::{
    AccountId, IntegrationAccount, IntegrationSettings, Issue, IssueComment, IssueId, LinkedIssue,
    Provider, TeamId, UserId,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

/// Columns selected for every issue read, in [`issue_from_row`] order
pub(crate) const ISSUE_COLUMNS: &str = "id, team_id, number, title, title_generated, \
     description, assignee_id, priority, state_id, estimate, parent_id, label_ids, \
     source_metadata, created_by, created_at, updated_at, deleted_at";

pub(crate) const LINK_COLUMNS: &str =
    "id, issue_id, url, source_id, title, source, source_data, created_at, updated_at";

pub(crate) const ACCOUNT_COLUMNS: &str =
    "id, provider, external_workspace_id, workspace_id, settings";

pub(crate) const COMMENT_COLUMNS: &str =
    "id, issue_id, body, author_id, source_metadata, created_at";

pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn get_json(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn get_opt_json(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn get_provider(row: &Row<'_>, idx: usize) -> rusqlite::Result<Provider> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let labels_raw: String = row.get(11)?;
    let label_ids: Vec<String> =
        serde_json::from_str(&labels_raw).map_err(|e| conversion_error(11, e))?;

    Ok(Issue {
        id: IssueId::new(row.get::<_, String>(0)?),
        team_id: TeamId::new(row.get::<_, String>(1)?),
        number: row.get(2)?,
        title: row.get(3)?,
        title_generated: row.get(4)?,
        description: row.get(5)?,
        assignee_id: row.get::<_, Option<String>>(6)?.map(UserId::new),
        priority: row.get(7)?,
        state_id: row.get(8)?,
        estimate: row.get(9)?,
        parent_id: row.get::<_, Option<String>>(10)?.map(IssueId::new),
        label_ids,
        source_metadata: get_opt_json(row, 12)?,
        created_by: row.get::<_, Option<String>>(13)?.map(UserId::new),
        created_at: get_ts(row, 14)?,
        updated_at: get_ts(row, 15)?,
        deleted_at: get_opt_ts(row, 16)?,
    })
}

pub(crate) fn link_from_row(row: &Row<'_>) -> rusqlite::Result<LinkedIssue> {
    Ok(LinkedIssue {
        id: row.get(0)?,
        issue_id: IssueId::new(row.get::<_, String>(1)?),
        url: row.get(2)?,
        source_id: row.get(3)?,
        title: row.get(4)?,
        source: get_provider(row, 5)?,
        source_data: get_json(row, 6)?,
        created_at: get_ts(row, 7)?,
        updated_at: get_ts(row, 8)?,
    })
}

pub(crate) fn account_from_row(row: &Row<'_>) -> rusqlite::Result<IntegrationAccount> {
    let settings_raw = get_json(row, 4)?;
    let settings: IntegrationSettings =
        serde_json::from_value(settings_raw).map_err(|e| conversion_error(4, e))?;

    Ok(IntegrationAccount {
        id: AccountId::new(row.get::<_, String>(0)?),
        provider: get_provider(row, 1)?,
        external_workspace_id: row.get(2)?,
        workspace_id: row.get(3)?,
        settings,
    })
}

pub(crate) fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<IssueComment> {
    Ok(IssueComment {
        id: row.get(0)?,
        issue_id: IssueId::new(row.get::<_, String>(1)?),
        body: row.get(2)?,
        author_id: row.get::<_, Option<String>>(3)?.map(UserId::new),
        source_metadata: get_opt_json(row, 4)?,
        created_at: get_ts(row, 5)?,
    })
}
