//! Configuration system
//!
//! Loads ~/.config/issuesync/config.yaml with sections for:
//! - The webhook server
//! - The SQLite database
//! - Outbound sync timeouts and retries
//! - The title summarizer, GitHub and Slack endpoints

mod sync_config;
pub mod validation;

pub use sync_config::{
    DatabaseConfig, GitHubConfig, ServerConfig, SlackConfig, SummarizerConfig, SyncConfig,
    SyncSettings,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
