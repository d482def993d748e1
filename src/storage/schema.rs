//! SQLite schema for the sync engine

/// All tables are created idempotently on open.
///
/// `issues(team_id, number)` is UNIQUE so a duplicate number surfaces as a
/// constraint violation (a retryable conflict) instead of silently succeeding.
/// `linked_issues.url` is UNIQUE because it is the link upsert key.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS integration_accounts (
    id TEXT PRIMARY KEY,
    provider TEXT NOT NULL,
    external_workspace_id TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    settings TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (provider, external_workspace_id)
);

CREATE TABLE IF NOT EXISTS team_counters (
    team_id TEXT PRIMARY KEY,
    last_number INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS issues (
    id TEXT PRIMARY KEY,
    team_id TEXT NOT NULL,
    number INTEGER NOT NULL,
    title TEXT NOT NULL,
    title_generated INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    assignee_id TEXT,
    priority INTEGER,
    state_id TEXT,
    estimate INTEGER,
    parent_id TEXT,
    label_ids TEXT NOT NULL DEFAULT '[]',
    source_metadata TEXT,
    created_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    UNIQUE (team_id, number)
);

CREATE TABLE IF NOT EXISTS linked_issues (
    id TEXT PRIMARY KEY,
    issue_id TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    source_id TEXT NOT NULL,
    title TEXT,
    source TEXT NOT NULL,
    source_data TEXT NOT NULL DEFAULT 'null',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS issue_history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    issue_id TEXT NOT NULL,
    actor_id TEXT,
    diff TEXT NOT NULL,
    provenance TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS issue_comments (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    issue_id TEXT NOT NULL,
    body TEXT NOT NULL,
    author_id TEXT,
    source_metadata TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_issues_team ON issues(team_id);
CREATE INDEX IF NOT EXISTS idx_linked_issues_issue ON linked_issues(issue_id);
CREATE INDEX IF NOT EXISTS idx_linked_issues_source ON linked_issues(source, source_id);
CREATE INDEX IF NOT EXISTS idx_issue_history_issue ON issue_history(issue_id);
CREATE INDEX IF NOT EXISTS idx_issue_comments_issue ON issue_comments(issue_id);
"#;
