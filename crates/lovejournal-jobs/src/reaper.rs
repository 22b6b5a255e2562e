//! Account reaper: permanent deletion of accounts whose removal grace period
//! has elapsed.
//!
//! Each run selects at most one batch of eligible users and purges them one
//! at a time. A user's cascade runs in a fixed order:
//!
//! 1. every image referenced by the user's memories plus every image listed
//!    under the user's folder on the image host, one destroy per image
//! 2. memory records
//! 3. anniversary events, then effects
//! 4. the per-user stats document
//! 5. the user record
//! 6. the authentication identity
//!
//! The first failing step stops that user's cascade and the run moves on to
//! the next user. Nothing already deleted is restored, and the user stays
//! `removed`, so the next run retries whatever is left. "Not found" answers
//! from the image store or identity provider count as already deleted.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use lovejournal_core::defaults::{
    GRACE_PERIOD_DAYS, IMAGE_LIST_MAX_PAGES, IMAGE_ROOT_FOLDER, REAPER_BATCH_SIZE, REAPER_JOB,
};
use lovejournal_core::{
    collect_all, public_id_from_reference, user_folder, DeleteOutcome, DocumentStore,
    IdentityProvider, ImageStore, Result, RunAudit, RunStatus, UserRecord,
};

use crate::handler::{timeout_message, JobContext, JobHandler, JobResult};
use crate::schedule::Schedule;

/// Cascade step at which a purge stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeStage {
    LoadMemories,
    ListImages,
    Images,
    Memories,
    Events,
    Effects,
    Stats,
    UserRecord,
    Identity,
}

impl PurgeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurgeStage::LoadMemories => "load memories",
            PurgeStage::ListImages => "image listing",
            PurgeStage::Images => "image deletion",
            PurgeStage::Memories => "memory deletion",
            PurgeStage::Events => "event deletion",
            PurgeStage::Effects => "effect deletion",
            PurgeStage::Stats => "stats deletion",
            PurgeStage::UserRecord => "user record deletion",
            PurgeStage::Identity => "identity deletion",
        }
    }
}

impl fmt::Display for PurgeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user whose cascade stopped early.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFailure {
    pub user_id: String,
    pub stage: PurgeStage,
    /// Image being destroyed when the image phase failed.
    pub public_id: Option<String>,
    pub message: String,
    /// Images destroyed before the failure.
    pub images_deleted: u64,
}

impl fmt::Display for AccountFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.public_id {
            Some(public_id) => write!(
                f,
                "{}: {} failed for {}: {}",
                self.user_id, self.stage, public_id, self.message
            ),
            None => write!(f, "{}: {} failed: {}", self.user_id, self.stage, self.message),
        }
    }
}

impl std::error::Error for AccountFailure {}

/// A user purged completely.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeOutcome {
    pub user_id: String,
    pub images_deleted: u64,
    /// Images the store reported as already gone.
    pub images_missing: u64,
    /// Images found only by listing the user's folder.
    pub images_unreferenced: u64,
    /// References that did not yield a public id and were skipped.
    pub references_skipped: u64,
    pub memories_deleted: u64,
    pub events_deleted: u64,
    pub effects_deleted: u64,
    pub identity: DeleteOutcome,
}

/// Result of one reaper run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReapReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Removal cutoff used for selection.
    pub cutoff: DateTime<Utc>,
    pub purged: Vec<PurgeOutcome>,
    pub failures: Vec<AccountFailure>,
}

impl ReapReport {
    pub fn accounts_processed(&self) -> usize {
        self.purged.len() + self.failures.len()
    }

    pub fn accounts_deleted(&self) -> usize {
        self.purged.len()
    }

    pub fn accounts_failed(&self) -> usize {
        self.failures.len()
    }

    /// Images destroyed during the run, including those of users whose
    /// cascade later failed.
    pub fn images_deleted(&self) -> u64 {
        self.purged.iter().map(|p| p.images_deleted).sum::<u64>()
            + self.failures.iter().map(|f| f.images_deleted).sum::<u64>()
    }

    pub fn memories_deleted(&self) -> u64 {
        self.purged.iter().map(|p| p.memories_deleted).sum()
    }

    pub fn status(&self) -> RunStatus {
        if self.failures.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::PartialFailure
        }
    }

    pub fn to_audit(&self) -> RunAudit {
        let mut audit = RunAudit::begin(REAPER_JOB, self.started_at);
        audit.run_id = self.run_id;
        audit.accounts_processed = self.accounts_processed() as i64;
        audit.accounts_deleted = self.accounts_deleted() as i64;
        audit.accounts_failed = self.accounts_failed() as i64;
        audit.images_deleted = self.images_deleted() as i64;
        audit.memories_deleted = self.memories_deleted() as i64;
        audit.records_affected = self.accounts_deleted() as i64;
        audit.errors = self.failures.iter().map(ToString::to_string).collect();
        audit.finish(self.status(), self.finished_at)
    }
}

/// Batch deleter for accounts past their grace period.
pub struct AccountReaper {
    store: DocumentStore,
    images: Arc<dyn ImageStore>,
    identity: Arc<dyn IdentityProvider>,
    grace_period: Duration,
    batch_size: usize,
    root_folder: String,
    max_image_pages: usize,
}

impl AccountReaper {
    pub fn new(
        store: DocumentStore,
        images: Arc<dyn ImageStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            images,
            identity,
            grace_period: Duration::days(GRACE_PERIOD_DAYS),
            batch_size: REAPER_BATCH_SIZE,
            root_folder: IMAGE_ROOT_FOLDER.to_string(),
            max_image_pages: IMAGE_LIST_MAX_PAGES,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Folder under which user uploads live, `<root>/<uid>/`.
    pub fn with_root_folder(mut self, root_folder: impl Into<String>) -> Self {
        self.root_folder = root_folder.into();
        self
    }

    pub fn with_max_image_pages(mut self, max_pages: usize) -> Self {
        self.max_image_pages = max_pages.max(1);
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Run one batch relative to the current time.
    pub async fn reap(&self) -> Result<ReapReport> {
        self.reap_at(Utc::now()).await
    }

    /// Run one batch under a fresh run id.
    pub async fn reap_at(&self, now: DateTime<Utc>) -> Result<ReapReport> {
        self.reap_run(Uuid::now_v7(), now).await
    }

    /// Run one batch, selecting users removed at or before `now - grace`.
    ///
    /// The run is recorded in the audit collections under `run_id` whether
    /// it succeeds or the selection fails. A failed selection is returned as
    /// the error.
    pub async fn reap_run(&self, run_id: Uuid, now: DateTime<Utc>) -> Result<ReapReport> {
        let cutoff = now - self.grace_period;

        info!(
            subsystem = "jobs",
            component = "reaper",
            op = "select",
            %run_id,
            %cutoff,
            batch_size = self.batch_size,
            "Selecting accounts past grace period"
        );

        let users = match self
            .store
            .users
            .list_removed_before(cutoff, self.batch_size)
            .await
        {
            Ok(users) => users,
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "reaper",
                    %run_id,
                    error = %e,
                    "Account selection failed, aborting run"
                );
                let mut audit = RunAudit::begin(REAPER_JOB, now);
                audit.run_id = run_id;
                audit.errors.push(format!("selection failed: {e}"));
                self.record(&audit.finish(RunStatus::Failed, Utc::now()))
                    .await;
                return Err(e);
            }
        };

        let mut report = ReapReport {
            run_id,
            started_at: now,
            finished_at: now,
            cutoff,
            purged: Vec::new(),
            failures: Vec::new(),
        };

        for user in &users {
            match self.purge_account(user).await {
                Ok(outcome) => report.purged.push(outcome),
                Err(failure) => {
                    warn!(
                        subsystem = "jobs",
                        component = "reaper",
                        %run_id,
                        user_id = %failure.user_id,
                        stage = %failure.stage,
                        public_id = failure.public_id.as_deref().unwrap_or(""),
                        error = %failure.message,
                        "Account purge stopped"
                    );
                    report.failures.push(failure);
                }
            }
        }

        report.finished_at = Utc::now().max(now);
        self.record(&report.to_audit()).await;

        info!(
            subsystem = "jobs",
            component = "reaper",
            op = "complete",
            %run_id,
            accounts_processed = report.accounts_processed(),
            accounts_deleted = report.accounts_deleted(),
            accounts_failed = report.accounts_failed(),
            images_deleted = report.images_deleted(),
            "Reaper run finished"
        );
        Ok(report)
    }

    /// Run one user's cascade.
    pub async fn purge_account(
        &self,
        user: &UserRecord,
    ) -> std::result::Result<PurgeOutcome, AccountFailure> {
        let uid = user.id.as_str();
        let fail = |stage: PurgeStage, images_deleted: u64, e: lovejournal_core::Error| {
            AccountFailure {
                user_id: uid.to_string(),
                stage,
                public_id: None,
                message: e.to_string(),
                images_deleted,
            }
        };

        let memories = self
            .store
            .memories
            .list_for_user(uid)
            .await
            .map_err(|e| fail(PurgeStage::LoadMemories, 0, e))?;

        let mut seen = HashSet::new();
        let mut public_ids = Vec::new();
        let mut references_skipped = 0u64;
        for reference in memories.iter().flat_map(|m| m.images.iter()) {
            match public_id_from_reference(reference) {
                Some(id) => {
                    if seen.insert(id.clone()) {
                        public_ids.push(id);
                    }
                }
                None => {
                    references_skipped += 1;
                    debug!(user_id = uid, reference, "Skipping unparseable image reference");
                }
            }
        }

        let folder = user_folder(&self.root_folder, uid);
        let listed = collect_all(self.images.as_ref(), &folder, self.max_image_pages)
            .await
            .map_err(|e| fail(PurgeStage::ListImages, 0, e))?;
        let mut images_unreferenced = 0u64;
        for image in listed {
            if seen.insert(image.public_id.clone()) {
                images_unreferenced += 1;
                public_ids.push(image.public_id);
            }
        }

        let mut images_deleted = 0u64;
        let mut images_missing = 0u64;
        for public_id in &public_ids {
            match self.images.destroy(public_id).await {
                Ok(DeleteOutcome::Deleted) => images_deleted += 1,
                Ok(DeleteOutcome::NotFound) => images_missing += 1,
                Err(e) => {
                    return Err(AccountFailure {
                        public_id: Some(public_id.clone()),
                        ..fail(PurgeStage::Images, images_deleted, e)
                    })
                }
            }
        }

        let memories_deleted = self
            .store
            .memories
            .delete_for_user(uid)
            .await
            .map_err(|e| fail(PurgeStage::Memories, images_deleted, e))?;
        let events_deleted = self
            .store
            .events
            .delete_for_user(uid)
            .await
            .map_err(|e| fail(PurgeStage::Events, images_deleted, e))?;
        let effects_deleted = self
            .store
            .effects
            .delete_for_user(uid)
            .await
            .map_err(|e| fail(PurgeStage::Effects, images_deleted, e))?;
        self.store
            .stats
            .delete_user_stats(uid)
            .await
            .map_err(|e| fail(PurgeStage::Stats, images_deleted, e))?;
        self.store
            .users
            .delete(uid)
            .await
            .map_err(|e| fail(PurgeStage::UserRecord, images_deleted, e))?;
        let identity = self
            .identity
            .delete_identity(uid)
            .await
            .map_err(|e| fail(PurgeStage::Identity, images_deleted, e))?;

        debug!(
            subsystem = "jobs",
            component = "reaper",
            user_id = uid,
            images_deleted,
            images_missing,
            images_unreferenced,
            memories_deleted,
            "Account purged"
        );

        Ok(PurgeOutcome {
            user_id: uid.to_string(),
            images_deleted,
            images_missing,
            images_unreferenced,
            references_skipped,
            memories_deleted,
            events_deleted,
            effects_deleted,
            identity,
        })
    }

    /// Record a run that was abandoned at the job timeout. Whatever the
    /// cascade finished stays deleted; the next run picks up the rest.
    pub async fn record_timeout(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        timeout: std::time::Duration,
    ) {
        let mut audit = RunAudit::begin(REAPER_JOB, started_at);
        audit.run_id = run_id;
        audit.errors.push(timeout_message(timeout));
        let finished_at = Utc::now().max(started_at);
        self.record(&audit.finish(RunStatus::Failed, finished_at)).await;
    }

    async fn record(&self, audit: &RunAudit) {
        if let Err(e) = self.store.audit.record_run(audit).await {
            error!(
                subsystem = "jobs",
                component = "reaper",
                run_id = %audit.run_id,
                error = %e,
                "Failed to record run audit"
            );
        }
    }
}

/// Scheduled entry point for the reaper.
pub struct ReaperHandler {
    reaper: Arc<AccountReaper>,
    schedule: Schedule,
}

impl ReaperHandler {
    pub fn new(reaper: Arc<AccountReaper>, schedule: Schedule) -> Self {
        Self { reaper, schedule }
    }
}

#[async_trait]
impl JobHandler for ReaperHandler {
    fn name(&self) -> &'static str {
        REAPER_JOB
    }

    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        ctx.report_progress(0, Some("Selecting accounts"));
        match self.reaper.reap_run(ctx.run_id, ctx.started_at).await {
            Ok(report) => {
                ctx.report_progress(100, Some("Done"));
                JobResult::Success(Some(json!({
                    "runId": report.run_id,
                    "status": report.status().as_str(),
                    "accountsProcessed": report.accounts_processed(),
                    "accountsDeleted": report.accounts_deleted(),
                    "accountsFailed": report.accounts_failed(),
                    "imagesDeleted": report.images_deleted(),
                })))
            }
            Err(e) => JobResult::Failed(e.to_string()),
        }
    }

    async fn on_timeout(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        timeout: std::time::Duration,
    ) {
        self.reaper.record_timeout(run_id, started_at, timeout).await;
    }
}
