//! Job handler contract.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::schedule::Schedule;

/// Progress callback type for job handlers.
pub type ProgressCallback = Box<dyn Fn(i32, Option<&str>) + Send + Sync>;

/// Context provided to job handlers.
pub struct JobContext {
    /// Identifier of this execution, shared with scheduler events.
    pub run_id: Uuid,
    pub job_name: String,
    /// Instant the run was triggered; jobs compute their cutoffs from it.
    pub started_at: DateTime<Utc>,
    progress_callback: Option<ProgressCallback>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job_name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            job_name: job_name.into(),
            started_at,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32, Option<&str>) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress to the callback.
    pub fn report_progress(&self, percent: i32, message: Option<&str>) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent, message);
        }
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed with optional summary data. Per-item failures a job
    /// tolerates are reported inside the summary, not here.
    Success(Option<JsonValue>),
    /// Job aborted.
    Failed(String),
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success(_))
    }
}

/// A named job that runs on a schedule.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Stable job name, also used as the audit key.
    fn name(&self) -> &'static str;

    /// When the scheduler should fire this job.
    fn schedule(&self) -> &Schedule;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Called after the scheduler abandoned a run at its timeout. The run's
    /// own bookkeeping never finished, so jobs that audit their runs record
    /// the failure here under the same `run_id`.
    async fn on_timeout(&self, _run_id: Uuid, _started_at: DateTime<Utc>, _timeout: Duration) {}
}

/// Failure message for a run abandoned at the job timeout.
pub fn timeout_message(timeout: Duration) -> String {
    format!("Job exceeded timeout of {}s", timeout.as_secs())
}

/// No-op handler for testing.
pub struct NoOpHandler {
    name: &'static str,
    schedule: Schedule,
}

impl NoOpHandler {
    pub fn new(name: &'static str, schedule: Schedule) -> Self {
        Self { name, schedule }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        ctx.report_progress(50, Some("Processing..."));
        ctx.report_progress(100, Some("Done"));
        JobResult::Success(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_job_context_new() {
        let now = Utc::now();
        let ctx = JobContext::new("account-reaper", now);
        assert_eq!(ctx.job_name, "account-reaper");
        assert_eq!(ctx.started_at, now);
        assert!(ctx.progress_callback.is_none());
    }

    #[test]
    fn test_job_context_run_ids_differ() {
        let now = Utc::now();
        assert_ne!(
            JobContext::new("a", now).run_id,
            JobContext::new("a", now).run_id
        );
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(
            timeout_message(Duration::from_secs(540)),
            "Job exceeded timeout of 540s"
        );
    }

    #[tokio::test]
    async fn test_noop_handler_reports_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ctx = JobContext::new("noop", Utc::now())
            .with_progress_callback(move |pct, _| sink.lock().unwrap().push(pct));

        let handler = NoOpHandler::new("noop", Schedule::every_minutes(5));
        assert_eq!(handler.name(), "noop");

        let result = handler.execute(ctx).await;
        assert!(result.is_success());
        assert_eq!(*seen.lock().unwrap(), vec![50, 100]);
    }
}
