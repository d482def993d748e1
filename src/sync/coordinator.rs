//! Outbound sync coordinator

use crate::integrations::ExternalTracker;
use crate::metrics;
use crate::model::{IntegrationAccount, Issue, IssueId, LinkData, LinkedIssue, Provider, UserId};
use crate::storage::SharedStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Mutation that triggered a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueAction {
    Created,
    Updated,
}

impl IssueAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueAction::Created => "created",
            IssueAction::Updated => "updated",
        }
    }
}

/// Whether a mutation waits for its outbound sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Await the sync before returning (CLI, tests)
    Inline,
    /// Spawn the sync on the runtime so webhooks are acknowledged promptly
    #[default]
    Background,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// No bidirectional mapping with a registered tracker
    NotMapped,
    /// The issue was deleted before its turn came
    Gone,
    Synced {
        link: LinkedIssue,
        /// The link row was inserted rather than updated
        created_link: bool,
        linking_comment_sent: bool,
    },
    /// An external call or the link write failed; the mutation stands
    Failed { reason: String },
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            SyncOutcome::NotMapped => "not_mapped",
            SyncOutcome::Gone => "gone",
            SyncOutcome::Synced { .. } => "synced",
            SyncOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncCoordinatorConfig {
    /// Timeout applied to each tracker call independently
    pub call_timeout: Duration,
}

impl Default for SyncCoordinatorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncCoordinatorConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// Orders syncs of the same issue by the time they were requested
#[derive(Default)]
struct IssueQueue {
    /// Completion signal of the last sync queued per issue
    tails: Mutex<HashMap<IssueId, oneshot::Receiver<()>>>,
}

/// A place in an issue's queue. Dropping it lets the next sync run.
struct Turn {
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl IssueQueue {
    async fn enqueue(&self, issue_id: &IssueId) -> Turn {
        let mut tails = self.tails.lock().await;
        // A closed channel means that sync has finished
        tails.retain(|_, done| {
            matches!(done.try_recv(), Err(oneshot::error::TryRecvError::Empty))
        });

        let (done, tail) = oneshot::channel();
        let previous = tails.insert(issue_id.clone(), tail);
        Turn {
            previous,
            _done: done,
        }
    }
}

impl Turn {
    async fn wait(&mut self) {
        if let Some(previous) = self.previous.take() {
            // Resolves with an error once the previous turn is dropped
            let _ = previous.await;
        }
    }
}

/// Pushes issue changes to linked external trackers.
///
/// Syncs of one issue run one at a time, in request order, and each pushes
/// the issue as stored when its turn comes rather than the snapshot it was
/// requested with. A later sync therefore always sees the link an earlier
/// one created, and the last push carries the latest content.
pub struct SyncCoordinator {
    store: SharedStore,
    trackers: HashMap<Provider, Arc<dyn ExternalTracker>>,
    config: SyncCoordinatorConfig,
    queue: IssueQueue,
}

struct SyncTarget {
    account: IntegrationAccount,
    tracker: Arc<dyn ExternalTracker>,
    existing: Option<LinkedIssue>,
}

impl SyncCoordinator {
    pub fn new(store: SharedStore, config: SyncCoordinatorConfig) -> Self {
        Self {
            store,
            trackers: HashMap::new(),
            config,
            queue: IssueQueue::default(),
        }
    }

    /// Register the tracker for its provider, replacing any previous one
    pub fn with_tracker(mut self, tracker: Arc<dyn ExternalTracker>) -> Self {
        self.trackers.insert(tracker.provider(), tracker);
        self
    }

    pub fn has_trackers(&self) -> bool {
        !self.trackers.is_empty()
    }

    /// Queue a sync and run it on the runtime.
    ///
    /// The place in the issue's queue is taken before this returns, so
    /// syncs spawned one after another run in that order. A panicking sync
    /// is logged, counted and reported as `Failed`.
    pub async fn spawn(
        self: &Arc<Self>,
        issue: Issue,
        action: IssueAction,
        actor: Option<UserId>,
    ) -> JoinHandle<SyncOutcome> {
        let turn = self.queue.enqueue(&issue.id).await;
        let coordinator = Arc::clone(self);
        let key = issue.display_key();
        let task = tokio::spawn(async move {
            coordinator
                .sync_in_turn(turn, &issue, action, actor.as_ref())
                .await
        });

        tokio::spawn(async move {
            match task.await {
                Ok(outcome) => {
                    debug!(issue = %key, outcome = outcome.label(), "Background sync finished");
                    outcome
                }
                Err(e) => {
                    metrics::record_external_failure("sync.task");
                    warn!(issue = %key, error = %e, "Background sync task aborted");
                    SyncOutcome::Failed {
                        reason: format!("sync task aborted: {}", e),
                    }
                }
            }
        })
    }

    /// Propagate one committed mutation. Never returns an error.
    pub async fn sync(
        &self,
        issue: &Issue,
        action: IssueAction,
        actor: Option<&UserId>,
    ) -> SyncOutcome {
        let turn = self.queue.enqueue(&issue.id).await;
        self.sync_in_turn(turn, issue, action, actor).await
    }

    async fn sync_in_turn(
        &self,
        mut turn: Turn,
        requested: &Issue,
        action: IssueAction,
        actor: Option<&UserId>,
    ) -> SyncOutcome {
        turn.wait().await;

        let reloaded = self.store.lock().await.get_issue(&requested.id);
        let issue = match reloaded {
            Ok(Some(issue)) if !issue.is_deleted() => issue,
            Ok(_) => {
                debug!(issue = %requested.display_key(), "Issue deleted before sync; skipping");
                return SyncOutcome::Gone;
            }
            Err(e) => return self.failed("sync.reload_issue", requested, e.to_string()),
        };

        let target = match self.resolve_target(&issue).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                debug!(issue = %issue.display_key(), "No bidirectional mapping; skipping sync");
                return SyncOutcome::NotMapped;
            }
            Err(e) => return self.failed("sync.resolve_target", &issue, e.to_string()),
        };

        let provider = target.tracker.provider();
        let started = Instant::now();
        let outcome = self.push(&issue, action, actor, &target).await;
        metrics::record_sync_duration(
            provider.as_str(),
            outcome.label(),
            started.elapsed().as_secs_f64(),
        );
        outcome
    }

    async fn push(
        &self,
        issue: &Issue,
        action: IssueAction,
        actor: Option<&UserId>,
        target: &SyncTarget,
    ) -> SyncOutcome {
        let provider = target.tracker.provider();
        let upsert_op = format!("{}.upsert_item", provider);

        let upsert = tokio::time::timeout(
            self.config.call_timeout,
            target
                .tracker
                .upsert_item(issue, &target.account, actor, target.existing.as_ref()),
        )
        .await;
        let item = match upsert {
            Ok(Ok(item)) => item,
            Ok(Err(e)) => return self.failed(&upsert_op, issue, e.to_string()),
            Err(_) => {
                return self.failed(
                    &upsert_op,
                    issue,
                    format!("timed out after {:?}", self.config.call_timeout),
                )
            }
        };

        let mut data = LinkData::new(provider, item.external_url, item.external_id.clone())
            .with_source_data(item.source_data);
        if let Some(title) = item.external_title {
            data = data.with_title(title);
        }

        let upserted = {
            let mut store = self.store.lock().await;
            store.upsert_link(&issue.id, &data)
        };
        let upserted = match upserted {
            Ok(u) => u,
            Err(e) => return self.failed("sync.upsert_link", issue, e.to_string()),
        };
        let created_link = upserted.is_new();

        let mut linking_comment_sent = false;
        if action == IssueAction::Created && created_link {
            let comment_op = format!("{}.post_linking_comment", provider);
            let posted = tokio::time::timeout(
                self.config.call_timeout,
                target
                    .tracker
                    .post_linking_comment(&target.account, issue, &item.external_id),
            )
            .await;
            match posted {
                Ok(Ok(())) => linking_comment_sent = true,
                Ok(Err(e)) => {
                    metrics::record_external_failure(&comment_op);
                    warn!(issue = %issue.display_key(), error = %e, "Linking comment failed");
                }
                Err(_) => {
                    metrics::record_external_failure(&comment_op);
                    warn!(
                        issue = %issue.display_key(),
                        timeout = ?self.config.call_timeout,
                        "Linking comment timed out"
                    );
                }
            }
        }

        info!(
            issue = %issue.display_key(),
            action = action.as_str(),
            provider = %provider,
            url = %upserted.link().url,
            created_link,
            linking_comment_sent,
            "Issue synced"
        );

        SyncOutcome::Synced {
            link: upserted.into_link(),
            created_link,
            linking_comment_sent,
        }
    }

    /// First account mapping the team bidirectionally whose provider has a tracker
    async fn resolve_target(&self, issue: &Issue) -> Result<Option<SyncTarget>> {
        let store = self.store.lock().await;
        for account in store.accounts()? {
            let Some(tracker) = self.trackers.get(&account.provider) else {
                continue;
            };
            if account
                .settings
                .bidirectional_mapping(&issue.team_id)
                .is_none()
            {
                continue;
            }
            let existing = store.primary_link(&issue.id, account.provider)?;
            return Ok(Some(SyncTarget {
                tracker: Arc::clone(tracker),
                account,
                existing,
            }));
        }
        Ok(None)
    }

    fn failed(&self, operation: &str, issue: &Issue, reason: String) -> SyncOutcome {
        metrics::record_external_failure(operation);
        warn!(
            issue = %issue.display_key(),
            operation,
            reason = %reason,
            "Sync failed; mutation kept"
        );
        SyncOutcome::Failed { reason }
    }
}
