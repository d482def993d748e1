//! Configuration validation
//!
//! Collects every problem instead of stopping at the first one:
//! - Bind address parses as a socket address
//! - API base URLs are http(s)
//! - Timeouts and body limits are non-zero
//! - Every tracker attempt and its backoff fit in the sync call timeout

use super::sync_config::SyncConfig;
use crate::integrations::RetryConfig;
use crate::SyncError;
use std::net::SocketAddr;
use std::time::Duration;

/// Shortest per-attempt HTTP timeout worth making a request with
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// One configuration problem
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Config section, e.g. `github`
    pub section: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.section {
            Some(section) => write!(f, "{}.{}: {}", section, self.field, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

pub fn validate_config(config: &SyncConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.server.bind.parse::<SocketAddr>().is_err() {
        errors.push(
            ValidationError::new(
                "bind",
                format!("Invalid socket address: {}", config.server.bind),
            )
            .in_section("server"),
        );
    }
    if config.server.max_body_size == 0 {
        errors.push(
            ValidationError::new("max_body_size", "Must be greater than 0").in_section("server"),
        );
    }

    if config.database.path.as_os_str().is_empty() {
        errors.push(ValidationError::new("path", "Cannot be empty").in_section("database"));
    }

    if config.sync.call_timeout_secs == 0 {
        errors.push(
            ValidationError::new("call_timeout_secs", "Must be greater than 0").in_section("sync"),
        );
    } else if !matches!(
        RetryConfig::with_max_retries(config.sync.max_retries)
            .attempt_timeout(config.sync.call_timeout()),
        Some(t) if t >= MIN_ATTEMPT_TIMEOUT
    ) {
        errors.push(
            ValidationError::new(
                "call_timeout_secs",
                format!(
                    "Too short for {} retries: each attempt needs at least {:?}",
                    config.sync.max_retries, MIN_ATTEMPT_TIMEOUT
                ),
            )
            .in_section("sync"),
        );
    }

    if config.summarizer.enabled {
        check_url(&mut errors, "summarizer", &config.summarizer.api_url);
        if config.summarizer.model.trim().is_empty() {
            errors.push(
                ValidationError::new("model", "Cannot be empty when enabled")
                    .in_section("summarizer"),
            );
        }
        if config.summarizer.timeout_secs == 0 {
            errors.push(
                ValidationError::new("timeout_secs", "Must be greater than 0")
                    .in_section("summarizer"),
            );
        }
        if config.summarizer.api_key().is_none() {
            tracing::warn!(
                env_var = %config.summarizer.api_key_env,
                "Summarizer API key not set; untitled issues will get fallback titles"
            );
        }
    }

    check_url(&mut errors, "github", &config.github.api_url);
    check_url(&mut errors, "slack", &config.slack.api_url);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, section: &str, url: &str) {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        errors.push(
            ValidationError::new("api_url", format!("Invalid URL: {}", url)).in_section(section),
        );
    }
}

/// Validate and fold all problems into one config error
pub fn validate_config_result(config: &SyncConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        SyncError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
