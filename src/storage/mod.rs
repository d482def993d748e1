//! Storage layer
//!
//! SQLite persistence for issues, integration accounts, linked issues,
//! history and comments. One [`Store`] owns one connection; the async side
//! shares it as a [`SharedStore`] so every write transaction is serialized.

mod conversions;
mod schema;
mod sqlite;

pub use schema::SCHEMA;
pub use sqlite::{CreatedIssue, IssueDraft, IssueUpdate, Store};

use std::sync::Arc;
use tokio::sync::Mutex;

/// Store handle shared between the webhook handlers, the mutation service
/// and the sync coordinator
pub type SharedStore = Arc<Mutex<Store>>;

/// Wrap a store for shared async use
pub fn shared(store: Store) -> SharedStore {
    Arc::new(Mutex::new(store))
}
