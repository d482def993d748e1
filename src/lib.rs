//! issuesync - webhook-driven issue synchronization
//!
//! Keeps one canonical issue store in step with external collaboration
//! tools. Chat reactions and thread replies become issues and comments,
//! edits on linked GitHub issues flow back, and every canonical mutation
//! is recorded as history and mirrored out to the team's tracker.
//!
//! # Architecture
//!
//! - **model**: Core data structures (Issue, IssuePatch, IntegrationAccount, LinkedIssue)
//! - **diff**: Field-level change sets between issue snapshots
//! - **storage**: SQLite persistence with per-team issue numbering
//! - **history**: Append-only audit log
//! - **service**: Issue mutations (create, update, delete, comment)
//! - **webhook**: Inbound event normalization, routing and handlers
//! - **sync**: Outbound coordinator mirroring issues into external trackers
//! - **integrations**: GitHub and Slack clients, retry helper
//! - **server**: axum HTTP front door
//! - **config**: YAML configuration

// Core modules
pub mod config;
pub mod diff;
pub mod error;
pub mod history;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod storage;

// Components
pub mod integrations;
pub mod server;
pub mod service;
pub mod summarize;
pub mod sync;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use error::{Result, SyncError};
