//! Audit pruning and stats refresh jobs, plus the per-user stats recompute
//! shared with the HTTP layer.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{error, info};

use lovejournal_core::defaults::{AUDIT_PRUNE_JOB, AUDIT_RETENTION_DAYS, STATS_JOB};
use lovejournal_core::{
    DocumentStore, Error, GlobalStats, Result, RunAudit, RunStatus, UserStats,
};
use uuid::Uuid;

use crate::handler::{timeout_message, JobContext, JobHandler, JobResult};
use crate::schedule::Schedule;

/// Count a user's memories, images and events into their stats document.
pub async fn recompute_user_stats(store: &DocumentStore, user_id: &str) -> Result<UserStats> {
    let memories = store.memories.list_for_user(user_id).await?;
    let events = store.events.list_for_user(user_id).await?;

    let stats = UserStats {
        user_id: user_id.to_string(),
        memory_count: memories.len() as i64,
        image_count: memories.iter().map(|m| m.images.len() as i64).sum(),
        event_count: events.len() as i64,
        computed_at: Utc::now(),
    };
    store.stats.put_user_stats(&stats).await?;
    Ok(stats)
}

/// Recompute application-wide counts.
pub async fn refresh_global_stats(store: &DocumentStore) -> Result<GlobalStats> {
    let users = store.users.count_by_status().await?;
    let (memory_count, image_count) = store.memories.totals().await?;

    let stats = GlobalStats {
        users,
        memory_count,
        image_count,
        computed_at: Utc::now(),
    };
    store.stats.put_global_stats(&stats).await?;
    Ok(stats)
}

/// Persist a housekeeping run and turn it into a job result.
async fn finish_run(
    store: &DocumentStore,
    mut audit: RunAudit,
    outcome: Result<serde_json::Value>,
) -> JobResult {
    let (status, result) = match outcome {
        Ok(summary) => (RunStatus::Success, JobResult::Success(Some(summary))),
        Err(e) => {
            audit.errors.push(e.to_string());
            (RunStatus::Failed, JobResult::Failed(e.to_string()))
        }
    };
    let finished_at = Utc::now().max(audit.started_at);
    let audit = audit.finish(status, finished_at);

    if let Err(e) = store.audit.record_run(&audit).await {
        error!(
            subsystem = "jobs",
            job = %audit.job_name,
            run_id = %audit.run_id,
            error = %e,
            "Failed to record run audit"
        );
    }
    result
}

/// Record a run the scheduler abandoned at its timeout.
async fn record_timeout(
    store: &DocumentStore,
    job: &'static str,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    timeout: std::time::Duration,
) {
    let mut audit = RunAudit::begin(job, started_at);
    audit.run_id = run_id;
    let outcome = Err(Error::Internal(timeout_message(timeout)));
    finish_run(store, audit, outcome).await;
}

/// Deletes run history older than the retention window.
pub struct AuditPruneHandler {
    store: DocumentStore,
    retention: Duration,
    schedule: Schedule,
}

impl AuditPruneHandler {
    pub fn new(store: DocumentStore, schedule: Schedule) -> Self {
        Self {
            store,
            retention: Duration::days(AUDIT_RETENTION_DAYS),
            schedule,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Prune relative to `now`. Returns the number of entries removed.
    pub async fn prune_at(&self, now: DateTime<Utc>) -> Result<u64> {
        let pruned = self.store.audit.prune_history(now - self.retention).await?;
        info!(
            subsystem = "jobs",
            job = AUDIT_PRUNE_JOB,
            pruned,
            retention_days = self.retention.num_days(),
            "Pruned run history"
        );
        Ok(pruned)
    }
}

#[async_trait]
impl JobHandler for AuditPruneHandler {
    fn name(&self) -> &'static str {
        AUDIT_PRUNE_JOB
    }

    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let mut audit = RunAudit::begin(AUDIT_PRUNE_JOB, ctx.started_at);
        audit.run_id = ctx.run_id;

        let outcome = self.prune_at(ctx.started_at).await.map(|pruned| {
            audit.records_affected = pruned as i64;
            json!({ "pruned": pruned })
        });
        finish_run(&self.store, audit, outcome).await
    }

    async fn on_timeout(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        timeout: std::time::Duration,
    ) {
        record_timeout(&self.store, AUDIT_PRUNE_JOB, run_id, started_at, timeout).await;
    }
}

/// Recomputes the application-wide stats document.
pub struct StatsRefreshHandler {
    store: DocumentStore,
    schedule: Schedule,
}

impl StatsRefreshHandler {
    pub fn new(store: DocumentStore, schedule: Schedule) -> Self {
        Self { store, schedule }
    }
}

#[async_trait]
impl JobHandler for StatsRefreshHandler {
    fn name(&self) -> &'static str {
        STATS_JOB
    }

    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let mut audit = RunAudit::begin(STATS_JOB, ctx.started_at);
        audit.run_id = ctx.run_id;

        let outcome = refresh_global_stats(&self.store).await.map(|stats| {
            audit.records_affected = 1;
            info!(
                subsystem = "jobs",
                job = STATS_JOB,
                active_users = stats.users.active,
                memories = stats.memory_count,
                images = stats.image_count,
                "Refreshed global stats"
            );
            json!({
                "memoryCount": stats.memory_count,
                "imageCount": stats.image_count,
            })
        });
        finish_run(&self.store, audit, outcome).await
    }

    async fn on_timeout(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        timeout: std::time::Duration,
    ) {
        record_timeout(&self.store, STATS_JOB, run_id, started_at, timeout).await;
    }
}
