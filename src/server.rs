//! HTTP front door
//!
//! # Routes
//!
//! - `POST /webhooks/{provider}` - Deliver one provider webhook (`slack`, `github`)
//! - `GET /health` - Liveness probe
//! - `GET /metrics` - Prometheus text exposition
//!
//! Every routed webhook answers 200 unless the payload was unreadable
//! (400), the signature did not verify (401) or a handler failed (500),
//! so providers only redeliver events that can succeed on retry.

use crate::config::SyncConfig;
use crate::integrations::{GitHubTracker, RetryConfig, SlackClient};
use crate::model::Provider;
use crate::service::{IssueService, IssueServiceConfig};
use crate::storage::{self, Store};
use crate::summarize;
use crate::sync::{SyncCoordinator, SyncCoordinatorConfig};
use crate::webhook::{EventRouter, RouteOutcome, ThreadHandler, TrackerIssueHandler, TriageHandler};
use crate::{metrics, Result, SyncError};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Error body returned with non-2xx responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

struct AppState {
    router: EventRouter,
}

pub struct SyncServer {
    state: Arc<AppState>,
    max_body_size: usize,
}

impl SyncServer {
    pub fn new(router: EventRouter, max_body_size: usize) -> Self {
        Self {
            state: Arc::new(AppState { router }),
            max_body_size,
        }
    }

    /// Wire the store, outbound clients, service and handlers from config
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let store = storage::shared(Store::open(&config.database.path, config.database.wal_mode)?);
        let retry = RetryConfig::with_max_retries(config.sync.max_retries);
        let request_timeout = retry
            .attempt_timeout(config.sync.call_timeout())
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "sync.call_timeout_secs {} leaves no time for {} retries",
                    config.sync.call_timeout_secs, config.sync.max_retries
                ))
            })?;

        let github = GitHubTracker::new(&config.github.api_url)?
            .with_fallback_token(config.github.fallback_token())
            .with_retry_config(retry.clone())
            .with_request_timeout(request_timeout);
        let coordinator = Arc::new(
            SyncCoordinator::new(
                store.clone(),
                SyncCoordinatorConfig::default().with_call_timeout(config.sync.call_timeout()),
            )
            .with_tracker(Arc::new(github)),
        );

        let service = Arc::new(IssueService::new(
            store.clone(),
            summarize::from_config(&config.summarizer)?,
            coordinator,
            IssueServiceConfig::default()
                .with_sync_mode(config.sync.mode)
                .with_summarize_timeout(config.summarizer.timeout()),
        ));

        let slack = Arc::new(SlackClient::new(&config.slack.api_url)?.with_retry_config(retry));
        let router = EventRouter::new(store)
            .with_handler(
                Provider::Slack,
                Arc::new(TriageHandler::new(service.clone(), slack)),
            )
            .with_handler(Provider::Slack, Arc::new(ThreadHandler::new(service.clone())))
            .with_handler(
                Provider::GitHub,
                Arc::new(TrackerIssueHandler::new(service)),
            )
            .with_signing_secret(Provider::Slack, config.slack.signing_secret.clone())
            .with_signing_secret(Provider::GitHub, config.github.webhook_secret.clone());

        Ok(Self::new(router, config.server.max_body_size))
    }

    pub fn app(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics_text))
            .route("/webhooks/{provider}", post(webhook))
            .layer(DefaultBodyLimit::max(self.max_body_size))
            .with_state(self.state.clone())
    }

    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SyncError::Config(format!("cannot bind {}: {}", addr, e)))?;

        info!(
            addr = addr,
            max_body_size = self.max_body_size,
            "Webhook server listening"
        );

        axum::serve(listener, self.app()).await?;
        Ok(())
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn metrics_text() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provider: Provider = match provider.parse() {
        Ok(p) => p,
        Err(_) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("unknown provider: {}", provider),
            )
        }
    };

    match state.router.route(provider, &headers, &body).await {
        Ok(RouteOutcome::Verification(challenge)) => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        Ok(RouteOutcome::Dispatched(_)) => Json(json!({ "status": 200 })).into_response(),
        Ok(RouteOutcome::Declined(reason)) => {
            Json(json!({ "message": reason.message() })).into_response()
        }
        Ok(RouteOutcome::Unhandled(kind)) => {
            Json(json!({ "message": format!("unhandled event: {}", kind) })).into_response()
        }
        Err(e @ SyncError::Signature(_)) => error_response(StatusCode::UNAUTHORIZED, e.to_string()),
        Err(e @ SyncError::Parse(_)) => {
            warn!(provider = %provider, error = %e, "Malformed webhook");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            error!(provider = %provider, error = %e, "Webhook handling failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
