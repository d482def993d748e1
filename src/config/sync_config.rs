//! issuesync configuration file handling
//!
//! Loads and manages ~/.config/issuesync/config.yaml. Every section has
//! serde defaults, so an empty file is a valid configuration.

use crate::sync::SyncMode;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Webhook HTTP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Largest accepted webhook body, in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8088".to_string()
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// SQLite database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

fn default_database_path() -> PathBuf {
    config_dir().join("issues.db")
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            wal_mode: true,
        }
    }
}

/// Outbound sync behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// `background` acknowledges webhooks before pushing to trackers
    #[serde(default)]
    pub mode: SyncMode,

    /// Timeout applied to each external tracker call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Retries of transient HTTP failures per call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

impl SyncSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            call_timeout_secs: default_call_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Title summarizer (OpenAI-compatible chat completions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_openai_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_summarizer_timeout_secs")]
    pub timeout_secs: u64,

    /// Environment variable holding the API key
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_summarizer_timeout_secs() -> u64 {
    8
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl SummarizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_openai_url(),
            model: default_model(),
            timeout_secs: default_summarizer_timeout_secs(),
            api_key_env: default_openai_key_env(),
        }
    }
}

/// GitHub REST API and inbound webhooks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_url")]
    pub api_url: String,

    /// Environment variable holding a fallback token for accounts without one
    #[serde(default = "default_github_token_env")]
    pub token_env: String,

    /// Secret for `x-hub-signature-256`; account settings take precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

fn default_github_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

impl GitHubConfig {
    pub fn fallback_token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_url(),
            token_env: default_github_token_env(),
            webhook_secret: None,
        }
    }
}

/// Slack Web API and Events API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default = "default_slack_url")]
    pub api_url: String,

    /// Secret for `x-slack-signature`; account settings take precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,
}

fn default_slack_url() -> String {
    "https://slack.com/api".to_string()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_url: default_slack_url(),
            signing_secret: None,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub summarizer: SummarizerConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub slack: SlackConfig,
}

fn config_dir() -> PathBuf {
    // Always ~/.config, on macOS too
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("issuesync");
    path
}

impl SyncConfig {
    /// Load from the default path (~/.config/issuesync/config.yaml)
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path())
    }

    /// Load from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::SyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading issuesync configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        tracing::debug!(
            bind = %config.server.bind,
            database = %config.database.path.display(),
            sync_mode = ?config.sync.mode,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save to a specific path, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving issuesync configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Default config path (~/.config/issuesync/config.yaml)
    pub fn default_path() -> PathBuf {
        config_dir().join("config.yaml")
    }

    /// Check the configuration, returning every problem at once
    pub fn validate(&self) -> Result<()> {
        super::validation::validate_config_result(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.server.bind, "127.0.0.1:8088");
        assert_eq!(config.sync.mode, SyncMode::Background);
        assert_eq!(config.sync.call_timeout(), Duration::from_secs(10));
        assert!(config.database.path.ends_with("issuesync/issues.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("conf").join("config.yaml");

        let mut config = SyncConfig::default();
        config.sync.mode = SyncMode::Inline;
        config.database.path = temp.path().join("db.sqlite");
        config.slack.signing_secret = Some("shh".into());
        config.save(&path).unwrap();

        let loaded = SyncConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "sync:\n  mode: inline\n  call_timeout_secs: 3\ngithub:\n  api_url: http://localhost:9000\n";
        let config: SyncConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.sync.mode, SyncMode::Inline);
        assert_eq!(config.sync.call_timeout_secs, 3);
        assert_eq!(config.sync.max_retries, 2);
        assert_eq!(config.github.api_url, "http://localhost:9000");
        assert_eq!(config.slack.api_url, "https://slack.com/api");
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "").unwrap();
        assert_eq!(SyncConfig::load(&path).unwrap(), SyncConfig::default());
    }

    #[test]
    fn test_load_missing_file() {
        let err = SyncConfig::load("/nonexistent/issuesync.yaml").unwrap_err();
        assert!(matches!(err, crate::SyncError::Config(_)));
    }
}
