//! Integration accounts and their typed settings
//!
//! Providers hand us an opaque settings document. It is parsed once, when the
//! account is loaded, into [`IntegrationSettings`] so sync decisions never
//! walk an untyped map.

use super::{AccountId, TeamId};
use crate::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default emoji that turns a chat message into a triaged issue
pub const DEFAULT_TRIAGE_REACTION: &str = "eyes";

/// External collaboration tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Chat
    Slack,
    /// Code hosting / external tracker
    #[serde(rename = "github")]
    GitHub,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Slack => "slack",
            Provider::GitHub => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "slack" => Ok(Provider::Slack),
            "github" => Ok(Provider::GitHub),
            other => Err(SyncError::Config(format!("Unknown provider: {}", other))),
        }
    }
}

/// Maps one team to one external channel or repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMapping {
    pub team_id: TeamId,

    /// Push canonical changes back out to the external side
    #[serde(default)]
    pub bidirectional: bool,

    /// Channel id (chat) or `owner/repo` (code hosting)
    #[serde(default, alias = "repository", alias = "channelId")]
    pub external_id: Option<String>,
}

impl TeamMapping {
    pub fn new(team_id: impl Into<TeamId>, external_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            bidirectional: false,
            external_id: Some(external_id.into()),
        }
    }

    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }
}

/// Typed form of a provider settings document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSettings {
    /// Identity the integration itself acts as; events from it are dropped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_user_id: Option<String>,

    #[serde(default, alias = "repositoryMappings", alias = "channelMappings")]
    pub mappings: Vec<TeamMapping>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triage_reaction: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,
}

impl IntegrationSettings {
    /// Parse a raw settings document
    pub fn from_json(value: &serde_json::Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Active bidirectional mapping for a team, if any
    pub fn bidirectional_mapping(&self, team_id: &TeamId) -> Option<&TeamMapping> {
        self.mappings
            .iter()
            .find(|m| m.bidirectional && &m.team_id == team_id)
    }

    /// Mapping whose external side is the given channel or repository
    pub fn mapping_for_external(&self, external_id: &str) -> Option<&TeamMapping> {
        self.mappings
            .iter()
            .find(|m| m.external_id.as_deref() == Some(external_id))
    }

    /// Whether an event actor is the integration's own identity
    pub fn is_own_actor(&self, actor: Option<&str>) -> bool {
        match (self.bot_user_id.as_deref(), actor) {
            (Some(bot), Some(actor)) => bot == actor,
            _ => false,
        }
    }

    pub fn triage_reaction(&self) -> &str {
        self.triage_reaction
            .as_deref()
            .unwrap_or(DEFAULT_TRIAGE_REACTION)
    }
}

/// One external-tool connection for a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationAccount {
    pub id: AccountId,

    pub provider: Provider,

    /// Team/installation id the provider puts in its webhook envelopes
    pub external_workspace_id: String,

    /// Owning workspace on our side
    pub workspace_id: String,

    #[serde(default)]
    pub settings: IntegrationSettings,
}

impl IntegrationAccount {
    pub fn new(
        provider: Provider,
        external_workspace_id: impl Into<String>,
        workspace_id: impl Into<String>,
        settings: IntegrationSettings,
    ) -> Self {
        Self {
            id: AccountId::generate(),
            provider,
            external_workspace_id: external_workspace_id.into(),
            workspace_id: workspace_id.into(),
            settings,
        }
    }
}
