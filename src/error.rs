//! Error types for issuesync
//!
//! One error enum covers every failure mode of the sync engine. Expected
//! declines (unknown account, bot-originated event, unhandled kind) are not
//! errors and never appear here; they are outcome values returned by the
//! router and the mutation service.

use crate::integrations::retry::{RetryDecision, RetryableError};
use rusqlite::ErrorCode;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for issuesync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Comprehensive error type for issuesync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage errors that are not SQLite errors (e.g. corrupt rows)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed webhook payloads
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Issue (or other record) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Data-integrity failure: duplicate issue number, concurrent writer.
    /// The caller may retry the whole mutation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// External provider returned an error
    #[error("Integration error: {0}")]
    Integration(String),

    /// An external call exceeded its own timeout
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Webhook signature did not verify
    #[error("Signature verification failed: {0}")]
    Signature(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limited (with retry-after duration in seconds)
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Build a timeout error for a named external operation
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        SyncError::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Whether the caller can retry the operation that produced this error
    pub fn is_retryable(&self) -> bool {
        !matches!(self.retry_decision(), RetryDecision::NoRetry)
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::ConstraintViolation
                        | ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                ) =>
            {
                SyncError::Conflict(err.to_string())
            }
            _ => SyncError::Database(err),
        }
    }
}

impl RetryableError for SyncError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            SyncError::Conflict(_) => RetryDecision::Retry,
            SyncError::Timeout { .. } => RetryDecision::Retry,
            SyncError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    RetryDecision::Retry
                } else if let Some(status) = e.status() {
                    match status.as_u16() {
                        429 => RetryDecision::RetryAfter(Duration::from_secs(60)),
                        500..=599 => RetryDecision::Retry,
                        _ => RetryDecision::NoRetry,
                    }
                } else {
                    RetryDecision::NoRetry
                }
            }
            SyncError::RateLimited(secs) => RetryDecision::RetryAfter(Duration::from_secs(*secs)),
            SyncError::Integration(msg) => {
                if msg.contains("HTTP 5") {
                    RetryDecision::Retry
                } else {
                    RetryDecision::NoRetry
                }
            }
            SyncError::Config(_)
            | SyncError::Storage(_)
            | SyncError::Parse(_)
            | SyncError::Io(_)
            | SyncError::NotFound(_)
            | SyncError::Signature(_)
            | SyncError::Json(_)
            | SyncError::Yaml(_)
            | SyncError::Database(_)
            | SyncError::Other(_) => RetryDecision::NoRetry,
        }
    }

    fn non_idempotent_retry_decision(&self) -> RetryDecision {
        match self {
            // The connection was never established, so nothing was sent
            SyncError::Http(e) if e.is_connect() => RetryDecision::Retry,
            _ => RetryDecision::NoRetry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_maps_to_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (n INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let err: SyncError = conn
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap_err()
            .into();

        assert!(matches!(err, SyncError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_sqlite_errors_are_fatal() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: SyncError = conn
            .execute("SELECT * FROM missing_table", [])
            .unwrap_err()
            .into();

        assert!(matches!(err, SyncError::Database(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retry_classification() {
        assert!(SyncError::timeout("summarize", Duration::from_secs(1)).is_retryable());
        assert!(SyncError::Integration("GitHub API error: HTTP 502".into()).is_retryable());
        assert!(!SyncError::Integration("GitHub API error: HTTP 404".into()).is_retryable());
        assert!(!SyncError::NotFound("issue".into()).is_retryable());
        assert_eq!(
            SyncError::RateLimited(5).retry_decision(),
            RetryDecision::RetryAfter(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_delivered_failures_are_not_resent() {
        let delivered = [
            SyncError::timeout("github.create_issue", Duration::from_secs(3)),
            SyncError::Integration("GitHub API error: HTTP 502".into()),
            SyncError::RateLimited(5),
            SyncError::Conflict("busy".into()),
        ];
        for err in delivered {
            assert_eq!(err.non_idempotent_retry_decision(), RetryDecision::NoRetry);
        }
    }
}
