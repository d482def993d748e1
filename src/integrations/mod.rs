//! External integrations
//!
//! Provider clients behind the traits the sync engine depends on.
//!
//! - **GitHub**: REST adapter implementing [`ExternalTracker`]
//! - **Slack**: Web API client implementing [`ChatClient`]
//!
//! Both retry transient HTTP failures through [`retry::with_retry`]. Calls
//! that create something on the provider side are not resent once they may
//! have been delivered.

pub mod github;
pub mod retry;
pub mod slack;
mod tracker;

pub use github::{strip_sync_footer, GitHubIssue, GitHubTracker};
pub use retry::{
    with_retry, with_retry_non_idempotent, RetryConfig, RetryDecision, RetryableError,
};
pub use slack::SlackClient;
pub use tracker::{ChatClient, ChatMessage, ExternalItem, ExternalTracker};
