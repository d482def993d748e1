//! Issue mutation service
//!
//! Owns every write to canonical issues. Each mutation commits first; the
//! history entry and the outbound sync follow as best-effort steps whose
//! failures are logged and counted but never undo the commit.
//!
//! Lifecycle: `Active -> SoftDeleted -> HardDeleted`, with edits keeping an
//! issue `Active`.

use crate::diff::diff;
use crate::history;
use crate::integrations::{with_retry, RetryConfig};
use crate::metrics;
use crate::model::{
    Issue, IssueComment, IssueHistoryEntry, IssueId, IssuePatch, LinkData, LinkUpsert, NewIssue,
    Patch, TeamId, TitleUpdate, UserId,
};
use crate::storage::{IssueDraft, SharedStore, Store};
use crate::summarize::{fallback_title, Summarizer};
use crate::sync::{IssueAction, SyncCoordinator, SyncMode, SyncOutcome};
use crate::{Result, SyncError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Who is acting and what external context comes with the mutation
#[derive(Debug, Clone, Default)]
pub struct MutationContext {
    /// None when inbound sync acts without a human
    pub actor: Option<UserId>,
    /// External item to link in the same transaction
    pub link: Option<LinkData>,
    /// Stored on the history entry
    pub provenance: Option<serde_json::Value>,
    /// Stored on a newly created issue
    pub source_metadata: Option<serde_json::Value>,
}

impl MutationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(mut self, actor: impl Into<UserId>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn link(mut self, link: LinkData) -> Self {
        self.link = Some(link);
        self
    }

    pub fn provenance(mut self, provenance: serde_json::Value) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn source_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.source_metadata = Some(metadata);
        self
    }
}

/// What a create or update produced
#[derive(Debug, Clone)]
pub struct MutationResult {
    /// Post-image of the issue
    pub issue: Issue,
    /// None if recording history failed
    pub history: Option<IssueHistoryEntry>,
    /// None if no link was requested or attaching it failed
    pub link: Option<LinkUpsert>,
    /// None in background mode
    pub sync: Option<SyncOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardDeleteOutcome {
    Deleted { purged_history: usize },
    NotFound,
}

#[derive(Debug, Clone)]
pub struct IssueServiceConfig {
    pub summarize_timeout: Duration,
    pub sync_mode: SyncMode,
    /// Retries of a create that hit a storage conflict
    pub conflict_retries: u32,
}

impl Default for IssueServiceConfig {
    fn default() -> Self {
        Self {
            summarize_timeout: Duration::from_secs(8),
            sync_mode: SyncMode::Background,
            conflict_retries: 2,
        }
    }
}

impl IssueServiceConfig {
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    pub fn with_summarize_timeout(mut self, timeout: Duration) -> Self {
        self.summarize_timeout = timeout;
        self
    }
}

/// Create, update and delete canonical issues
pub struct IssueService {
    store: SharedStore,
    summarizer: Arc<dyn Summarizer>,
    coordinator: Arc<SyncCoordinator>,
    config: IssueServiceConfig,
}

impl IssueService {
    pub fn new(
        store: SharedStore,
        summarizer: Arc<dyn Summarizer>,
        coordinator: Arc<SyncCoordinator>,
        config: IssueServiceConfig,
    ) -> Self {
        Self {
            store,
            summarizer,
            coordinator,
            config,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Create an issue with the next team number.
    ///
    /// Without an explicit title the description is summarized; a failed or
    /// slow summarizer yields a fallback title instead of an error.
    pub async fn create_issue(
        &self,
        team_id: &TeamId,
        fields: NewIssue,
        ctx: MutationContext,
    ) -> Result<MutationResult> {
        let explicit = fields
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from);
        let (title, title_generated) = match explicit {
            Some(title) => (title, false),
            None => {
                let description = fields.description.as_deref().unwrap_or("");
                (self.generate_title(description).await, true)
            }
        };

        let draft = IssueDraft {
            title,
            title_generated,
            fields,
            created_by: ctx.actor.clone(),
            source_metadata: ctx.source_metadata.clone(),
        };

        let retry = RetryConfig {
            initial_backoff: Duration::from_millis(10),
            ..RetryConfig::with_max_retries(self.config.conflict_retries)
        };
        let ctx = &ctx;
        let (created, history) = with_retry(&retry, "store.create_issue", || {
            let draft = draft.clone();
            async move {
                let mut store = self.store.lock().await;
                let created = store.create_issue(team_id, draft, ctx.link.as_ref())?;
                let history = record_history(&store, None, &created.issue, ctx);
                Ok::<_, SyncError>((created, history))
            }
        })
        .await?;

        let issue = created.issue;
        metrics::record_mutation("created");
        info!(
            issue = %issue.display_key(),
            issue_id = %issue.id,
            title_generated,
            "Issue created"
        );

        let sync = self
            .dispatch_sync(&issue, IssueAction::Created, ctx.actor.as_ref())
            .await;

        Ok(MutationResult {
            issue,
            history,
            link: created.link,
            sync,
        })
    }

    /// Apply a sparse patch to a live issue.
    ///
    /// A new description regenerates the title only when the patch carries
    /// no title and the current title was generated.
    pub async fn update_issue(
        &self,
        team_id: &TeamId,
        issue_id: &IssueId,
        mut patch: IssuePatch,
        ctx: MutationContext,
    ) -> Result<MutationResult> {
        if patch.title.is_none() {
            if let Patch::Set(description) = &patch.description {
                let current = self.store.lock().await.get_issue(issue_id)?;
                if current.is_some_and(|c| c.title_generated) && !description.trim().is_empty() {
                    let title = self.generate_title(description).await;
                    patch.title = Some(TitleUpdate::Generated(title));
                }
            }
        }

        // History is appended under the same guard so entries follow commit order
        let (update, history) = {
            let mut store = self.store.lock().await;
            let update = store.update_issue(team_id, issue_id, &patch, ctx.link.as_ref())?;
            let history = record_history(&store, Some(&update.before), &update.after, &ctx);
            (update, history)
        };

        metrics::record_mutation("updated");
        debug!(issue = %update.after.display_key(), "Issue updated");

        let sync = self
            .dispatch_sync(&update.after, IssueAction::Updated, ctx.actor.as_ref())
            .await;

        Ok(MutationResult {
            issue: update.after,
            history,
            link: update.link,
            sync,
        })
    }

    /// Mark a live issue deleted. History is kept and nothing is synced.
    pub async fn soft_delete_issue(&self, team_id: &TeamId, issue_id: &IssueId) -> Result<Issue> {
        let deleted = self
            .store
            .lock()
            .await
            .soft_delete_issue(team_id, issue_id)?
            .ok_or_else(|| SyncError::NotFound(format!("issue {}", issue_id)))?;

        metrics::record_mutation("soft_deleted");
        info!(issue = %deleted.display_key(), "Issue soft-deleted");
        Ok(deleted)
    }

    /// Remove an issue with its links, comments and history. Deleting an
    /// absent issue is a no-op.
    pub async fn hard_delete_issue(
        &self,
        team_id: &TeamId,
        issue_id: &IssueId,
    ) -> Result<HardDeleteOutcome> {
        let purged = self
            .store
            .lock()
            .await
            .hard_delete_issue(team_id, issue_id)?;

        Ok(match purged {
            Some(purged_history) => {
                metrics::record_mutation("hard_deleted");
                info!(issue_id = %issue_id, purged_history, "Issue hard-deleted");
                HardDeleteOutcome::Deleted { purged_history }
            }
            None => {
                debug!(issue_id = %issue_id, "Hard delete of absent issue");
                HardDeleteOutcome::NotFound
            }
        })
    }

    /// Attach a comment to a live issue
    pub async fn add_comment(
        &self,
        issue_id: &IssueId,
        body: &str,
        author: Option<&UserId>,
        source_metadata: Option<&serde_json::Value>,
    ) -> Result<IssueComment> {
        let store = self.store.lock().await;
        match store.get_issue(issue_id)? {
            Some(issue) if !issue.is_deleted() => {}
            _ => return Err(SyncError::NotFound(format!("issue {}", issue_id))),
        }
        let comment = store.add_comment(issue_id, body, author, source_metadata)?;
        metrics::record_mutation("commented");
        Ok(comment)
    }

    pub async fn get_issue(&self, issue_id: &IssueId) -> Result<Option<Issue>> {
        self.store.lock().await.get_issue(issue_id)
    }

    pub async fn history(&self, issue_id: &IssueId) -> Result<Vec<IssueHistoryEntry>> {
        let store = self.store.lock().await;
        history::entries(store.conn(), issue_id)
    }

    async fn generate_title(&self, description: &str) -> String {
        if description.trim().is_empty() {
            return String::new();
        }
        if !self.summarizer.is_enabled() {
            debug!("Summarizer disabled; using fallback title");
            return fallback_title(description);
        }

        match tokio::time::timeout(
            self.config.summarize_timeout,
            self.summarizer.summarize(description),
        )
        .await
        {
            Ok(Ok(title)) if !title.trim().is_empty() => title.trim().to_string(),
            Ok(Ok(_)) => {
                warn!("Summarizer returned an empty title; using fallback");
                metrics::record_external_failure("summarizer");
                fallback_title(description)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Summarizer failed; using fallback title");
                metrics::record_external_failure("summarizer");
                fallback_title(description)
            }
            Err(_) => {
                warn!(
                    timeout = ?self.config.summarize_timeout,
                    "Summarizer timed out; using fallback title"
                );
                metrics::record_external_failure("summarizer");
                fallback_title(description)
            }
        }
    }

    async fn dispatch_sync(
        &self,
        issue: &Issue,
        action: IssueAction,
        actor: Option<&UserId>,
    ) -> Option<SyncOutcome> {
        match self.config.sync_mode {
            SyncMode::Inline => Some(self.coordinator.sync(issue, action, actor).await),
            SyncMode::Background if self.coordinator.has_trackers() => {
                // Detached; the task logs its own outcome
                self.coordinator
                    .spawn(issue.clone(), action, actor.cloned())
                    .await;
                None
            }
            SyncMode::Background => None,
        }
    }
}

/// Append the entry for a committed mutation. Failures are logged and
/// counted, never returned.
fn record_history(
    store: &Store,
    before: Option<&Issue>,
    after: &Issue,
    ctx: &MutationContext,
) -> Option<IssueHistoryEntry> {
    let change = diff(before, after);
    match history::record(
        store.conn(),
        ctx.actor.as_ref(),
        &after.id,
        &change,
        ctx.provenance.as_ref(),
    ) {
        Ok(entry) => Some(entry),
        Err(e) => {
            metrics::record_external_failure("history.record");
            warn!(issue = %after.display_key(), error = %e, "Failed to record history");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provider;
    use crate::storage;
    use crate::sync::SyncCoordinatorConfig;
    use crate::testing::{github_account, FakeSummarizer, FakeTracker};
    use serde_json::json;

    struct Harness {
        service: Arc<IssueService>,
        tracker: Arc<FakeTracker>,
        summarizer: Arc<FakeSummarizer>,
    }

    fn harness(summarizer: FakeSummarizer) -> Harness {
        harness_with(summarizer, FakeTracker::new(), SyncMode::Inline)
    }

    fn harness_with(summarizer: FakeSummarizer, tracker: FakeTracker, mode: SyncMode) -> Harness {
        let store = storage::shared(Store::open_in_memory().unwrap());
        store
            .try_lock()
            .unwrap()
            .save_account(&github_account("eng", "acme/api"))
            .unwrap();
        let tracker = Arc::new(tracker);
        let summarizer = Arc::new(summarizer);
        let coordinator = Arc::new(
            SyncCoordinator::new(store.clone(), SyncCoordinatorConfig::default())
                .with_tracker(tracker.clone()),
        );
        let service = Arc::new(IssueService::new(
            store,
            summarizer.clone(),
            coordinator,
            IssueServiceConfig::default()
                .with_sync_mode(mode)
                .with_summarize_timeout(Duration::from_millis(100)),
        ));
        Harness {
            service,
            tracker,
            summarizer,
        }
    }

    fn eng() -> TeamId {
        TeamId::new("eng")
    }

    /// Background syncs are detached, so poll the tracker instead
    async fn wait_for_upserts(tracker: &FakeTracker, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while tracker.upsert_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_numbers_follow_team_maximum() {
        let h = harness(FakeSummarizer::failing());
        for expected in 1..=3 {
            let created = h
                .service
                .create_issue(&eng(), NewIssue::new().with_title("t"), MutationContext::new())
                .await
                .unwrap();
            assert_eq!(created.issue.number, expected);
        }
        let ops = h
            .service
            .create_issue(
                &TeamId::new("ops"),
                NewIssue::new().with_title("t"),
                MutationContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(ops.issue.number, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_never_duplicate_numbers() {
        let h = harness(FakeSummarizer::failing());
        let mut handles = Vec::new();
        for i in 0..20 {
            let service = Arc::clone(&h.service);
            handles.push(tokio::spawn(async move {
                service
                    .create_issue(
                        &TeamId::new("eng"),
                        NewIssue::new().with_title(format!("issue {}", i)),
                        MutationContext::new(),
                    )
                    .await
                    .map(|r| r.issue.number)
            }));
        }

        let mut numbers = Vec::new();
        for handle in futures::future::join_all(handles).await {
            numbers.push(handle.unwrap().unwrap());
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=20).collect::<Vec<i64>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_chain_history() {
        let h = harness(FakeSummarizer::failing());
        let issue = h
            .service
            .create_issue(
                &eng(),
                NewIssue::new().with_title("t").with_priority(0),
                MutationContext::new(),
            )
            .await
            .unwrap()
            .issue;

        let mut handles = Vec::new();
        for priority in 1..=40 {
            let service = Arc::clone(&h.service);
            let id = issue.id.clone();
            handles.push(tokio::spawn(async move {
                service
                    .update_issue(
                        &TeamId::new("eng"),
                        &id,
                        IssuePatch::new().priority(Patch::Set(priority)),
                        MutationContext::new(),
                    )
                    .await
                    .map(|_| ())
            }));
        }
        for handle in futures::future::join_all(handles).await {
            handle.unwrap().unwrap();
        }

        let entries = h.service.history(&issue.id).await.unwrap();
        assert_eq!(entries.len(), 41);
        let changes: Vec<_> = entries
            .iter()
            .map(|e| e.diff.priority.clone().unwrap())
            .collect();
        assert_eq!(changes[0].from, None);
        for pair in changes.windows(2) {
            assert_eq!(pair[1].from, pair[0].to);
        }
        let last = h.service.get_issue(&issue.id).await.unwrap().unwrap();
        assert_eq!(changes[40].to, last.priority);
    }

    #[tokio::test]
    async fn test_background_create_then_update_creates_one_item() {
        let tracker = FakeTracker::new().with_delays([Duration::from_millis(150)]);
        let h = harness_with(FakeSummarizer::failing(), tracker, SyncMode::Background);

        let created = h
            .service
            .create_issue(&eng(), NewIssue::new().with_title("v1"), MutationContext::new())
            .await
            .unwrap();
        assert!(created.sync.is_none());
        h.service
            .update_issue(
                &eng(),
                &created.issue.id,
                IssuePatch::new().title("v2"),
                MutationContext::new(),
            )
            .await
            .unwrap();

        wait_for_upserts(&h.tracker, 2).await;
        assert_eq!(h.tracker.created_count(), 1);
        assert_eq!(h.tracker.comment_count(), 1);
        assert_eq!(h.tracker.pushed_titles().last().map(String::as_str), Some("v2"));
        let links = h
            .service
            .store()
            .lock()
            .await
            .links_for_issue(&created.issue.id)
            .unwrap();
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn test_background_updates_end_on_latest_title() {
        let tracker = FakeTracker::new().with_delays([
            Duration::ZERO,
            Duration::from_millis(150),
            Duration::from_millis(10),
        ]);
        let h = harness_with(FakeSummarizer::failing(), tracker, SyncMode::Background);

        let issue = h
            .service
            .create_issue(&eng(), NewIssue::new().with_title("v1"), MutationContext::new())
            .await
            .unwrap()
            .issue;
        wait_for_upserts(&h.tracker, 1).await;

        for title in ["v2", "v3"] {
            h.service
                .update_issue(
                    &eng(),
                    &issue.id,
                    IssuePatch::new().title(title),
                    MutationContext::new(),
                )
                .await
                .unwrap();
        }

        wait_for_upserts(&h.tracker, 3).await;
        assert_eq!(h.tracker.pushed_titles().last().map(String::as_str), Some("v3"));
        assert_eq!(h.tracker.created_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_summarizer_is_not_called() {
        let h = harness(FakeSummarizer::replying("unused").disabled());
        let created = h
            .service
            .create_issue(
                &eng(),
                NewIssue::new().with_description("printer on fire
details"),
                MutationContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(created.issue.title, "printer on fire");
        assert!(created.issue.title_generated);
        assert_eq!(h.summarizer.calls(), 0);
    }

    #[tokio::test]
    async fn test_summarized_title_scenario() {
        let h = harness(FakeSummarizer::replying("Fix crash on startup"));

        let created = h
            .service
            .create_issue(
                &eng(),
                NewIssue::new().with_description("fix crash"),
                MutationContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(created.issue.title, "Fix crash on startup");
        assert!(created.issue.title_generated);

        let history = h.service.history(&created.issue.id).await.unwrap();
        assert_eq!(history.len(), 1);
        let entry = serde_json::to_value(&history[0]).unwrap();
        assert_eq!(entry["addedLabelIds"], json!([]));
        assert!(entry.get("toTitle").is_none());

        assert_eq!(h.tracker.upsert_count(), 1);
        assert!(created.sync.unwrap().is_synced());
    }

    #[tokio::test]
    async fn test_failed_summarizer_falls_back() {
        let h = harness(FakeSummarizer::failing());
        let created = h
            .service
            .create_issue(
                &eng(),
                NewIssue::new().with_description("fix crash\nmore detail"),
                MutationContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(created.issue.title, "fix crash");
    }

    #[tokio::test]
    async fn test_slow_summarizer_does_not_block_create() {
        let h = harness(
            FakeSummarizer::replying("Late title").with_delay(Duration::from_secs(5)),
        );
        let created = h
            .service
            .create_issue(
                &eng(),
                NewIssue::new().with_description("login page is blank"),
                MutationContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(created.issue.title, "login page is blank");
    }

    #[tokio::test]
    async fn test_assignee_and_labels_update_scenario() {
        let h = harness(FakeSummarizer::failing());
        let created = h
            .service
            .create_issue(
                &eng(),
                NewIssue::new()
                    .with_title("t")
                    .with_assignee("u1")
                    .with_labels(["l1", "l2"]),
                MutationContext::new(),
            )
            .await
            .unwrap();

        let updated = h
            .service
            .update_issue(
                &eng(),
                &created.issue.id,
                IssuePatch::new()
                    .assignee(Patch::Set(UserId::new("u2")))
                    .labels(["l2", "l3"]),
                MutationContext::new().actor("u9"),
            )
            .await
            .unwrap();

        let entry = updated.history.unwrap();
        assert_eq!(entry.actor_id, Some(UserId::new("u9")));
        let value = serde_json::to_value(&entry.diff).unwrap();
        assert_eq!(
            value,
            json!({
                "fromAssigneeId": "u1",
                "toAssigneeId": "u2",
                "addedLabelIds": ["l3"],
                "removedLabelIds": ["l1"]
            })
        );
        assert_eq!(h.service.history(&created.issue.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_title_regenerated_only_when_generated() {
        let h = harness(FakeSummarizer::replying("Summary"));
        let generated = h
            .service
            .create_issue(&eng(), NewIssue::new().with_description("a"), MutationContext::new())
            .await
            .unwrap()
            .issue;
        let typed = h
            .service
            .create_issue(&eng(), NewIssue::new().with_title("Mine"), MutationContext::new())
            .await
            .unwrap()
            .issue;
        assert_eq!(h.summarizer.calls(), 1);

        let patch = IssuePatch::new().description(Patch::Set("new body".into()));
        h.service
            .update_issue(&eng(), &generated.id, patch.clone(), MutationContext::new())
            .await
            .unwrap();
        assert_eq!(h.summarizer.calls(), 2);

        let after = h
            .service
            .update_issue(&eng(), &typed.id, patch, MutationContext::new())
            .await
            .unwrap();
        assert_eq!(h.summarizer.calls(), 2);
        assert_eq!(after.issue.title, "Mine");

        // Priority-only edits never summarize
        h.service
            .update_issue(
                &eng(),
                &generated.id,
                IssuePatch::new().priority(Patch::Set(1)),
                MutationContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(h.summarizer.calls(), 2);
    }

    #[tokio::test]
    async fn test_hard_delete_purges_and_second_is_noop() {
        let h = harness(FakeSummarizer::failing());
        let issue = h
            .service
            .create_issue(&eng(), NewIssue::new().with_title("t"), MutationContext::new())
            .await
            .unwrap()
            .issue;
        h.service
            .update_issue(
                &eng(),
                &issue.id,
                IssuePatch::new().priority(Patch::Set(2)),
                MutationContext::new(),
            )
            .await
            .unwrap();

        let first = h.service.hard_delete_issue(&eng(), &issue.id).await.unwrap();
        assert_eq!(first, HardDeleteOutcome::Deleted { purged_history: 2 });
        assert!(h.service.history(&issue.id).await.unwrap().is_empty());
        assert!(h.service.get_issue(&issue.id).await.unwrap().is_none());

        let second = h.service.hard_delete_issue(&eng(), &issue.id).await.unwrap();
        assert_eq!(second, HardDeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_soft_deleted_issue_rejects_updates() {
        let h = harness(FakeSummarizer::failing());
        let issue = h
            .service
            .create_issue(&eng(), NewIssue::new().with_title("t"), MutationContext::new())
            .await
            .unwrap()
            .issue;

        h.service.soft_delete_issue(&eng(), &issue.id).await.unwrap();
        let err = h
            .service
            .update_issue(
                &eng(),
                &issue.id,
                IssuePatch::new().priority(Patch::Set(1)),
                MutationContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
        assert!(h.service.soft_delete_issue(&eng(), &issue.id).await.is_err());
        assert!(h
            .service
            .add_comment(&issue.id, "late", None, None)
            .await
            .is_err());
        // History is kept
        assert_eq!(h.service.history(&issue.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_link_failure_does_not_fail_create() {
        let h = harness(FakeSummarizer::failing());
        h.service
            .store()
            .lock()
            .await
            .conn()
            .execute_batch("DROP TABLE linked_issues")
            .unwrap();

        let created = h
            .service
            .create_issue(
                &eng(),
                NewIssue::new().with_title("t"),
                MutationContext::new().link(LinkData::new(Provider::Slack, "https://x/p1", "C1:1")),
            )
            .await
            .unwrap();
        assert!(created.link.is_none());
        assert!(h.service.get_issue(&created.issue.id).await.unwrap().is_some());
    }
}
