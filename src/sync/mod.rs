//! Two-way sync
//!
//! Pushes canonical issue changes to the external tracker linked to the
//! issue's team, and records the resulting [`LinkedIssue`](crate::model::LinkedIssue).
//!
//! # Flow
//!
//! 1. Wait for earlier syncs of the same issue, then reload it from the store
//! 2. Find an account whose settings map the issue's team bidirectionally
//! 3. Upsert the external item (updating the primary link's item if one exists)
//! 4. Upsert the link by url
//! 5. On creation with a newly inserted link, post one linking comment
//!
//! Every external call has its own timeout. Failures degrade to
//! [`SyncOutcome::Failed`]; they never fail the mutation that triggered them.

mod coordinator;

pub use coordinator::{
    IssueAction, SyncCoordinator, SyncCoordinatorConfig, SyncMode, SyncOutcome,
};
