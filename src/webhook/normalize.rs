//! Provider payload -> canonical inbound event
//!
//! Slack sends Events API envelopes; GitHub names the event in the
//! `x-github-event` header. Anything we do not act on becomes
//! [`EventKind::Unknown`] so the router can report it explicitly.

use crate::integrations::GitHubIssue;
use crate::model::Provider;
use crate::{Result, SyncError};
use axum::http::HeaderMap;
use serde::Deserialize;

/// Chat message, possibly a thread reply
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub channel: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub text: String,
    /// Set for edits, joins and other non-plain messages
    pub subtype: Option<String>,
}

impl MessageEvent {
    /// Reply inside an existing thread (not the thread root itself)
    pub fn is_thread_reply(&self) -> bool {
        matches!(&self.thread_ts, Some(root) if root != &self.ts)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    pub reaction: String,
    pub channel: String,
    /// Timestamp of the message that was reacted to
    pub ts: String,
}

#[derive(Debug, Clone)]
pub struct TrackerIssueEvent {
    pub action: String,
    /// `owner/repo`
    pub repository: String,
    pub issue: GitHubIssue,
}

/// What happened, with the data its handler needs
#[derive(Debug, Clone)]
pub enum EventKind {
    Message(MessageEvent),
    ReactionAdded(ReactionEvent),
    TrackerIssue(TrackerIssueEvent),
    Unknown(String),
}

impl EventKind {
    pub fn name(&self) -> &str {
        match self {
            EventKind::Message(_) => "message",
            EventKind::ReactionAdded(_) => "reaction_added",
            EventKind::TrackerIssue(_) => "issues",
            EventKind::Unknown(name) => name,
        }
    }
}

/// Canonical form of one webhook delivery
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub provider: Provider,
    pub kind: EventKind,
    /// Provider identity that caused the event
    pub actor: Option<String>,
    pub external_workspace_id: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// A delivery is either a handshake or an event
#[derive(Debug, Clone)]
pub enum Envelope {
    Verification { challenge: String },
    Event(Box<InboundEvent>),
}

pub fn normalize(provider: Provider, headers: &HeaderMap, body: &[u8]) -> Result<Envelope> {
    match provider {
        Provider::Slack => normalize_slack(headers, body),
        Provider::GitHub => normalize_github(headers, body),
    }
}

#[derive(Debug, Deserialize)]
struct SlackEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    team_id: Option<String>,
    #[serde(default)]
    event: Option<SlackEvent>,
}

#[derive(Debug, Deserialize)]
struct SlackEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    reaction: Option<String>,
    #[serde(default)]
    item: Option<SlackItem>,
}

#[derive(Debug, Deserialize)]
struct SlackItem {
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value.ok_or_else(|| SyncError::Parse(format!("missing field `{}`", field)))
}

fn normalize_slack(headers: &HeaderMap, body: &[u8]) -> Result<Envelope> {
    let envelope: SlackEnvelope = serde_json::from_slice(body)
        .map_err(|e| SyncError::Parse(format!("invalid Slack payload: {}", e)))?;

    if envelope.kind == "url_verification" {
        return Ok(Envelope::Verification {
            challenge: required(envelope.challenge, "challenge")?,
        });
    }

    let external_workspace_id = required(envelope.team_id, "team_id")?;
    let (kind, actor) = match (envelope.kind.as_str(), envelope.event) {
        ("event_callback", Some(event)) => {
            let actor = event.user.clone().or_else(|| event.bot_id.clone());
            let kind = match event.kind.as_str() {
                "message" => EventKind::Message(MessageEvent {
                    channel: required(event.channel, "event.channel")?,
                    ts: required(event.ts, "event.ts")?,
                    thread_ts: event.thread_ts,
                    text: event.text.unwrap_or_default(),
                    subtype: event.subtype,
                }),
                "reaction_added" => {
                    let item = event
                        .item
                        .ok_or_else(|| SyncError::Parse("missing field `event.item`".into()))?;
                    EventKind::ReactionAdded(ReactionEvent {
                        reaction: required(event.reaction, "event.reaction")?,
                        channel: required(item.channel, "event.item.channel")?,
                        ts: required(item.ts, "event.item.ts")?,
                    })
                }
                other => EventKind::Unknown(other.to_string()),
            };
            (kind, actor)
        }
        (other, _) => (EventKind::Unknown(other.to_string()), None),
    };

    Ok(Envelope::Event(Box::new(InboundEvent {
        provider: Provider::Slack,
        kind,
        actor,
        external_workspace_id,
        headers: headers.clone(),
        body: body.to_vec(),
    })))
}

#[derive(Debug, Deserialize)]
struct GitHubPayload {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    issue: Option<GitHubIssue>,
    #[serde(default)]
    repository: Option<GitHubRepository>,
    #[serde(default)]
    installation: Option<GitHubInstallation>,
    #[serde(default)]
    sender: Option<GitHubSender>,
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    full_name: String,
    #[serde(default)]
    owner: Option<GitHubSender>,
}

#[derive(Debug, Deserialize)]
struct GitHubInstallation {
    id: InstallationId,
}

/// Numeric on github.com, but some GitHub-compatible hosts send strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InstallationId {
    Number(u64),
    Text(String),
}

impl InstallationId {
    fn into_string(self) -> String {
        match self {
            InstallationId::Number(n) => n.to_string(),
            InstallationId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubSender {
    login: String,
}

fn normalize_github(headers: &HeaderMap, body: &[u8]) -> Result<Envelope> {
    let event_name = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| SyncError::Parse("missing x-github-event header".into()))?
        .to_string();

    let payload: GitHubPayload = serde_json::from_slice(body)
        .map_err(|e| SyncError::Parse(format!("invalid GitHub payload: {}", e)))?;

    let external_workspace_id = match (payload.installation, &payload.repository) {
        (Some(installation), _) => installation.id.into_string(),
        (None, Some(GitHubRepository { owner: Some(owner), .. })) => owner.login.clone(),
        _ => String::new(),
    };
    let actor = payload.sender.map(|s| s.login);

    let kind = match (event_name.as_str(), payload.issue, payload.repository) {
        ("issues", Some(issue), Some(repository)) => EventKind::TrackerIssue(TrackerIssueEvent {
            action: required(payload.action, "action")?,
            repository: repository.full_name,
            issue,
        }),
        ("issues", _, _) => {
            return Err(SyncError::Parse(
                "issues event without issue or repository".into(),
            ))
        }
        (other, _, _) => EventKind::Unknown(other.to_string()),
    };

    Ok(Envelope::Event(Box::new(InboundEvent {
        provider: Provider::GitHub,
        kind,
        actor,
        external_workspace_id,
        headers: headers.clone(),
        body: body.to_vec(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slack(body: serde_json::Value) -> Envelope {
        normalize(Provider::Slack, &HeaderMap::new(), body.to_string().as_bytes()).unwrap()
    }

    fn event(envelope: Envelope) -> InboundEvent {
        match envelope {
            Envelope::Event(e) => *e,
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_url_verification_returns_challenge() {
        match slack(json!({ "type": "url_verification", "challenge": "abc123" })) {
            Envelope::Verification { challenge } => assert_eq!(challenge, "abc123"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_thread_reply() {
        let e = event(slack(json!({
            "type": "event_callback",
            "team_id": "T1",
            "event": {
                "type": "message", "channel": "C1", "user": "U1",
                "text": "any update?", "ts": "2.0", "thread_ts": "1.0"
            }
        })));
        assert_eq!(e.external_workspace_id, "T1");
        assert_eq!(e.actor.as_deref(), Some("U1"));
        match e.kind {
            EventKind::Message(m) => {
                assert!(m.is_thread_reply());
                assert_eq!(m.text, "any update?");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reaction_added() {
        let e = event(slack(json!({
            "type": "event_callback",
            "team_id": "T1",
            "event": {
                "type": "reaction_added", "user": "U1", "reaction": "eyes",
                "item": { "type": "message", "channel": "C1", "ts": "1.0" }
            }
        })));
        match e.kind {
            EventKind::ReactionAdded(r) => {
                assert_eq!(
                    (r.reaction.as_str(), r.channel.as_str(), r.ts.as_str()),
                    ("eyes", "C1", "1.0")
                )
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_slack_event() {
        let e = event(slack(json!({
            "type": "event_callback",
            "team_id": "T1",
            "event": { "type": "app_mention", "user": "U1" }
        })));
        assert_eq!(e.kind.name(), "app_mention");
        assert!(matches!(e.kind, EventKind::Unknown(_)));
    }

    #[test]
    fn test_github_issues_event() {
        let mut headers = HeaderMap::new();
        headers.insert("x-github-event", "issues".parse().unwrap());
        let body = json!({
            "action": "edited",
            "issue": {
                "number": 12, "title": "Crash", "body": "details",
                "html_url": "https://github.com/acme/api/issues/12"
            },
            "repository": { "full_name": "acme/api", "owner": { "login": "acme" } },
            "installation": { "id": 42 },
            "sender": { "login": "octocat" }
        });

        let e = event(normalize(Provider::GitHub, &headers, body.to_string().as_bytes()).unwrap());
        assert_eq!(e.external_workspace_id, "42");
        assert_eq!(e.actor.as_deref(), Some("octocat"));
        match e.kind {
            EventKind::TrackerIssue(t) => {
                assert_eq!(t.action, "edited");
                assert_eq!(t.repository, "acme/api");
                assert_eq!(t.issue.number, 12);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_github_requires_event_header() {
        let err = normalize(Provider::GitHub, &HeaderMap::new(), b"{}").unwrap_err();
        assert!(matches!(err, SyncError::Parse(_)));
    }

    #[test]
    fn test_garbage_body_is_parse_error() {
        let err = normalize(Provider::Slack, &HeaderMap::new(), b"not json").unwrap_err();
        assert!(matches!(err, SyncError::Parse(_)));
    }
}
