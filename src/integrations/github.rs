//! GitHub Issues adapter
//!
//! Mirrors canonical issues into the repository mapped to their team, via
//! the REST API. Creation is keyed on the existing link: when one is passed
//! the issue is patched instead of created, so repeated syncs never produce
//! a second GitHub issue. POSTs are only resent after a connect failure,
//! since a create whose response was lost may already exist.

use super::retry::{with_retry, with_retry_non_idempotent, RetryConfig};
use super::tracker::{ExternalItem, ExternalTracker};
use crate::model::{IntegrationAccount, Issue, LinkedIssue, Provider, UserId};
use crate::{Result, SyncError};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Per-attempt timeout for writes unless configured
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

const FOOTER_PREFIX: &str = "_Synced from ";

/// Issue body without the footer we append when mirroring
pub fn strip_sync_footer(body: &str) -> &str {
    let trimmed = body.trim_end();
    match trimmed.rfind(FOOTER_PREFIX) {
        Some(idx) if trimmed.ends_with('_') && !trimmed[idx..].contains('\n') => {
            trimmed[..idx].trim_end()
        }
        _ => body,
    }
}

/// GitHub issue (REST API format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubIssue {
    pub number: u64,
    #[serde(default)]
    pub id: Option<u64>,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize)]
struct IssueRequest<'a> {
    title: &'a str,
    body: String,
}

#[derive(Debug, Clone, Serialize)]
struct CommentRequest {
    body: String,
}

/// GitHub REST client implementing [`ExternalTracker`]
pub struct GitHubTracker {
    client: Client,
    api_url: String,
    fallback_token: Option<String>,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl GitHubTracker {
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static("issuesync/0.1"),
                );
                headers.insert(
                    header::ACCEPT,
                    header::HeaderValue::from_static("application/vnd.github+json"),
                );
                headers
            })
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            fallback_token: None,
            retry: RetryConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Token used for accounts whose settings carry none
    pub fn with_fallback_token(mut self, token: Option<String>) -> Self {
        self.fallback_token = token;
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Timeout of each write attempt. Keep attempts plus backoff inside the
    /// caller's own timeout, see [`RetryConfig::attempt_timeout`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn token<'a>(&'a self, account: &'a IntegrationAccount) -> Option<&'a str> {
        account
            .settings
            .access_token
            .as_deref()
            .or(self.fallback_token.as_deref())
    }

    /// `owner/repo` mapped bidirectionally to the issue's team
    fn repository<'a>(&self, account: &'a IntegrationAccount, issue: &Issue) -> Result<&'a str> {
        account
            .settings
            .bidirectional_mapping(&issue.team_id)
            .and_then(|m| m.external_id.as_deref())
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "No repository mapped for team {} on account {}",
                    issue.team_id, account.id
                ))
            })
    }

    fn issue_body(issue: &Issue) -> String {
        let description = issue.description.as_deref().unwrap_or("").trim();
        if description.is_empty() {
            format!("{}{}_", FOOTER_PREFIX, issue.display_key())
        } else {
            format!("{}\n\n{}{}_", description, FOOTER_PREFIX, issue.display_key())
        }
    }

    async fn send_issue(
        &self,
        token: Option<&str>,
        repo: &str,
        number: Option<&str>,
        request: &IssueRequest<'_>,
    ) -> Result<GitHubIssue> {
        let (mut http_request, expected) = match number {
            Some(n) => (
                self.client
                    .patch(format!("{}/repos/{}/issues/{}", self.api_url, repo, n)),
                StatusCode::OK,
            ),
            None => (
                self.client
                    .post(format!("{}/repos/{}/issues", self.api_url, repo)),
                StatusCode::CREATED,
            ),
        };
        if let Some(token) = token {
            http_request = http_request.bearer_auth(token);
        }

        let response = http_request
            .json(request)
            .timeout(self.request_timeout)
            .send()
            .await?;

        match response.status() {
            status if status == expected => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED => Err(SyncError::Integration(
                "GitHub authentication failed".to_string(),
            )),
            StatusCode::NOT_FOUND => Err(SyncError::Integration(format!(
                "GitHub issue not found: {}#{}",
                repo,
                number.unwrap_or("new")
            ))),
            StatusCode::TOO_MANY_REQUESTS => Err(SyncError::RateLimited(retry_after(&response))),
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(SyncError::Integration(format!(
                    "GitHub API error: HTTP {}: {}",
                    status, error_body
                )))
            }
        }
    }

    async fn send_comment(
        &self,
        token: Option<&str>,
        repo: &str,
        number: &str,
        body: &str,
    ) -> Result<()> {
        let mut http_request = self.client.post(format!(
            "{}/repos/{}/issues/{}/comments",
            self.api_url, repo, number
        ));
        if let Some(token) = token {
            http_request = http_request.bearer_auth(token);
        }

        let response = http_request
            .json(&CommentRequest {
                body: body.to_string(),
            })
            .timeout(self.request_timeout)
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => Ok(()),
            StatusCode::TOO_MANY_REQUESTS => Err(SyncError::RateLimited(retry_after(&response))),
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(SyncError::Integration(format!(
                    "GitHub comment failed: HTTP {}: {}",
                    status, error_body
                )))
            }
        }
    }
}

fn retry_after(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(60)
}

#[async_trait]
impl ExternalTracker for GitHubTracker {
    fn provider(&self) -> Provider {
        Provider::GitHub
    }

    async fn upsert_item(
        &self,
        issue: &Issue,
        account: &IntegrationAccount,
        actor: Option<&UserId>,
        existing: Option<&LinkedIssue>,
    ) -> Result<ExternalItem> {
        let repo = self.repository(account, issue)?;
        let token = self.token(account);
        let number = existing.map(|l| l.source_id.as_str());
        let body = Self::issue_body(issue);
        let request = IssueRequest {
            title: &issue.title,
            body,
        };

        debug!(
            issue = %issue.display_key(),
            repo = %repo,
            number = ?number,
            actor = ?actor,
            "Upserting GitHub issue"
        );

        let request = &request;
        let send = move || self.send_issue(token, repo, number, request);
        let gh = match number {
            Some(_) => with_retry(&self.retry, "github.update_issue", send).await?,
            None => with_retry_non_idempotent(&self.retry, "github.create_issue", send).await?,
        };

        info!(
            issue = %issue.display_key(),
            repo = %repo,
            number = gh.number,
            created = existing.is_none(),
            "GitHub issue synced"
        );

        Ok(ExternalItem {
            external_id: gh.number.to_string(),
            external_url: gh.html_url.clone(),
            external_title: Some(gh.title.clone()),
            source_data: serde_json::json!({
                "repository": repo,
                "number": gh.number,
                "id": gh.id,
            }),
        })
    }

    async fn post_linking_comment(
        &self,
        account: &IntegrationAccount,
        issue: &Issue,
        external_id: &str,
    ) -> Result<()> {
        let repo = self.repository(account, issue)?;
        let token = self.token(account);
        let body = format!(
            "This issue is linked to {} and kept in sync.",
            issue.display_key()
        );

        let body = body.as_str();
        with_retry_non_idempotent(&self.retry, "github.post_linking_comment", move || {
            self.send_comment(token, repo, external_id, body)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{sample_issue, IntegrationSettings, TeamMapping};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn account(token: Option<&str>) -> IntegrationAccount {
        IntegrationAccount::new(
            Provider::GitHub,
            "inst-1",
            "ws-1",
            IntegrationSettings {
                mappings: vec![
                    TeamMapping::new("eng", "acme/api").bidirectional(),
                    TeamMapping::new("ops", "acme/ops"),
                ],
                access_token: token.map(String::from),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_repository_requires_bidirectional_mapping() {
        let tracker = GitHubTracker::new("https://api.github.com/").unwrap();
        let acct = account(None);

        assert_eq!(
            tracker.repository(&acct, &sample_issue("eng", 1)).unwrap(),
            "acme/api"
        );
        assert!(tracker.repository(&acct, &sample_issue("ops", 1)).is_err());
        assert_eq!(tracker.api_url, "https://api.github.com");
    }

    #[test]
    fn test_request_timeout_is_configurable() {
        let tracker = GitHubTracker::new("https://api.github.com").unwrap();
        assert_eq!(tracker.request_timeout, DEFAULT_REQUEST_TIMEOUT);

        let tracker = tracker.with_request_timeout(Duration::from_secs(2));
        assert_eq!(tracker.request_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_account_token_wins_over_fallback() {
        let tracker = GitHubTracker::new("https://api.github.com")
            .unwrap()
            .with_fallback_token(Some("env-token".into()));

        assert_eq!(tracker.token(&account(Some("acct"))), Some("acct"));
        assert_eq!(tracker.token(&account(None)), Some("env-token"));
    }

    #[test]
    fn test_issue_body_footer() {
        let mut issue = sample_issue("eng", 7);
        assert_eq!(GitHubTracker::issue_body(&issue), "_Synced from ENG-7_");

        issue.description = Some("Crash on start".into());
        assert_eq!(
            GitHubTracker::issue_body(&issue),
            "Crash on start\n\n_Synced from ENG-7_"
        );
    }

    #[test]
    fn test_strip_sync_footer() {
        assert_eq!(strip_sync_footer("Crash on start\n\n_Synced from ENG-7_"), "Crash on start");
        assert_eq!(strip_sync_footer("_Synced from ENG-7_"), "");
        assert_eq!(strip_sync_footer("plain body"), "plain body");
        assert_eq!(
            strip_sync_footer("_Synced from X_ is how it starts\nthen more"),
            "_Synced from X_ is how it starts\nthen more"
        );
    }

    #[test]
    fn test_issue_deserializes_from_webhook_shape() {
        let raw = serde_json::json!({
            "number": 12,
            "id": 99,
            "title": "Bug",
            "body": null,
            "state": "open",
            "html_url": "https://github.com/acme/api/issues/12",
            "labels": []
        });
        let issue: GitHubIssue = serde_json::from_value(raw).unwrap();
        assert_eq!(issue.number, 12);
        assert!(issue.body.is_none());
    }

    /// Server that accepts every create but answers too late
    async fn slow_create_server(hits: Arc<AtomicUsize>) -> String {
        let app = axum::Router::new().route(
            "/repos/acme/api/issues",
            axum::routing::post(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    StatusCode::CREATED
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_create_with_lost_response_is_sent_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let api_url = slow_create_server(hits.clone()).await;
        let tracker = GitHubTracker::new(&api_url)
            .unwrap()
            .with_retry_config(RetryConfig {
                max_retries: 3,
                initial_backoff: Duration::from_millis(1),
                jitter: false,
                ..Default::default()
            })
            .with_request_timeout(Duration::from_millis(100));

        let result = tracker
            .upsert_item(&sample_issue("eng", 1), &account(Some("t")), None, None)
            .await;

        assert!(result.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
