//! Event routing
//!
//! Order matters: verification handshakes answer before anything else,
//! then the account is resolved, the signature checked and events caused
//! by the integration's own identity dropped. Only then is a handler
//! chosen by event kind.

use super::handlers::{DeclineReason, EventHandler, HandlerKey, HandlerOutcome};
use super::normalize::{normalize, Envelope};
use super::signature;
use crate::metrics;
use crate::model::Provider;
use crate::storage::SharedStore;
use crate::Result;
use axum::http::HeaderMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the router did with one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handshake; the challenge goes back verbatim
    Verification(String),
    /// A handler ran and mutated state
    Dispatched(String),
    Declined(DeclineReason),
    /// No handler for this event kind
    Unhandled(String),
}

impl RouteOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RouteOutcome::Verification(_) => "verification",
            RouteOutcome::Dispatched(_) => "dispatched",
            RouteOutcome::Declined(_) => "declined",
            RouteOutcome::Unhandled(_) => "unhandled",
        }
    }
}

pub struct EventRouter {
    store: SharedStore,
    handlers: HashMap<(Provider, HandlerKey), Arc<dyn EventHandler>>,
    /// Provider-wide signing secrets for accounts that carry none
    secrets: HashMap<Provider, String>,
}

impl EventRouter {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            secrets: HashMap::new(),
        }
    }

    pub fn with_handler(mut self, provider: Provider, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert((provider, handler.key()), handler);
        self
    }

    pub fn with_signing_secret(mut self, provider: Provider, secret: Option<String>) -> Self {
        match secret {
            Some(secret) => {
                self.secrets.insert(provider, secret);
            }
            None => {
                self.secrets.remove(&provider);
            }
        }
        self
    }

    /// Route one raw delivery. Errors are parse, signature and handler
    /// failures; expected no-ops are outcomes.
    pub async fn route(
        &self,
        provider: Provider,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<RouteOutcome> {
        let outcome = self.route_inner(provider, headers, body).await;
        match &outcome {
            Ok(o) => metrics::record_webhook(provider.as_str(), o.label()),
            Err(_) => metrics::record_webhook(provider.as_str(), "error"),
        }
        outcome
    }

    async fn route_inner(
        &self,
        provider: Provider,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<RouteOutcome> {
        let event = match normalize(provider, headers, body)? {
            Envelope::Verification { challenge } => {
                info!(provider = %provider, "Answering URL verification");
                return Ok(RouteOutcome::Verification(challenge));
            }
            Envelope::Event(event) => event,
        };

        let account = self
            .store
            .lock()
            .await
            .find_account(provider, &event.external_workspace_id)?;
        let Some(account) = account else {
            debug!(
                provider = %provider,
                workspace = %event.external_workspace_id,
                "No account for webhook"
            );
            return Ok(RouteOutcome::Declined(DeclineReason::NoAccount));
        };

        let secret = account
            .settings
            .signing_secret
            .as_deref()
            .or_else(|| self.secrets.get(&provider).map(String::as_str));
        if let Some(secret) = secret {
            if let Err(e) = signature::verify(provider, secret, &event.headers, &event.body) {
                warn!(provider = %provider, account = %account.id, error = %e, "Rejected webhook");
                return Err(e);
            }
        }

        if account.settings.is_own_actor(event.actor.as_deref()) {
            debug!(provider = %provider, kind = event.kind.name(), "Dropping self-originated event");
            return Ok(RouteOutcome::Declined(DeclineReason::BotMessage));
        }

        let handler = HandlerKey::for_kind(&event.kind)
            .and_then(|key| self.handlers.get(&(provider, key)));
        let Some(handler) = handler else {
            debug!(provider = %provider, kind = event.kind.name(), "Unhandled event kind");
            return Ok(RouteOutcome::Unhandled(event.kind.name().to_string()));
        };

        match handler.handle(&event, &account).await? {
            HandlerOutcome::Handled(detail) => {
                debug!(provider = %provider, kind = event.kind.name(), detail = %detail, "Event handled");
                Ok(RouteOutcome::Dispatched(detail))
            }
            HandlerOutcome::Declined(reason) => {
                debug!(provider = %provider, kind = event.kind.name(), reason = %reason, "Event declined");
                Ok(RouteOutcome::Declined(reason))
            }
        }
    }
}
