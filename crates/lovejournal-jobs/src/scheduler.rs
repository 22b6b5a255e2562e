//! Scheduler that fires registered job handlers when their schedule is due.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use lovejournal_core::defaults::{EVENT_BUS_CAPACITY, JOB_TIMEOUT_SECS};
use lovejournal_core::{Error, Result};

use crate::handler::{timeout_message, JobContext, JobHandler, JobResult};

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Whether scheduled firing is enabled. `run_now` works regardless.
    pub enabled: bool,
    /// Upper bound on a single job execution.
    pub job_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            job_timeout: Duration::from_secs(JOB_TIMEOUT_SECS),
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SCHEDULER_ENABLED` | `true` | Enable/disable scheduled jobs |
    pub fn from_env() -> Self {
        let enabled = std::env::var("SCHEDULER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Enable or disable scheduled firing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the per-job timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// Event emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A job run began.
    JobStarted { run_id: Uuid, job: &'static str },
    /// Job progress was updated.
    JobProgress {
        run_id: Uuid,
        percent: i32,
        message: Option<String>,
    },
    /// A job run completed.
    JobCompleted {
        run_id: Uuid,
        job: &'static str,
        duration_ms: u64,
    },
    /// A job run failed or timed out.
    JobFailed {
        run_id: Uuid,
        job: &'static str,
        error: String,
    },
    SchedulerStarted,
    SchedulerStopped,
}

/// Handle for controlling a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<SchedulerEvent>,
    task: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the scheduler to stop and wait for the loop to exit. A job that
    /// is running finishes first.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Scheduler task failed: {e}")))
    }

    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Runs registered jobs one at a time when their schedules come due.
#[derive(Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    handlers: Arc<BTreeMap<&'static str, Arc<dyn JobHandler>>>,
    event_tx: broadcast::Sender<SchedulerEvent>,
}

impl Scheduler {
    /// Names of the registered jobs.
    pub fn job_names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Execute a registered job immediately, outside its schedule.
    pub async fn run_now(&self, name: &str) -> Result<JobResult> {
        let handler = self
            .handlers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {name}")))?;
        Ok(self.execute(handler, Utc::now()).await)
    }

    /// Start the scheduler loop and return a handle for control.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let task = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        SchedulerHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "scheduler"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled || self.handlers.is_empty() {
            info!(
                enabled = self.config.enabled,
                jobs = self.handlers.len(),
                "Scheduler idle, waiting for shutdown"
            );
            let _ = shutdown_rx.recv().await;
            return;
        }

        let now = Utc::now();
        let mut next_runs: BTreeMap<&'static str, DateTime<Utc>> = self
            .handlers
            .iter()
            .map(|(name, handler)| (*name, handler.schedule().next_after(now)))
            .collect();

        for (name, at) in &next_runs {
            info!(job = name, next_run = %at, "Job scheduled");
        }
        let _ = self.event_tx.send(SchedulerEvent::SchedulerStarted);

        loop {
            let Some(due_at) = next_runs.values().min().copied() else {
                break;
            };
            let wait = (due_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                _ = sleep(wait) => {}
            }

            let now = Utc::now();
            let due: Vec<&'static str> = next_runs
                .iter()
                .filter(|(_, at)| **at <= now)
                .map(|(name, _)| *name)
                .collect();

            for name in due {
                let Some(handler) = self.handlers.get(name).cloned() else {
                    continue;
                };
                self.execute(handler.clone(), now).await;
                next_runs.insert(name, handler.schedule().next_after(Utc::now()));
            }
        }

        let _ = self.event_tx.send(SchedulerEvent::SchedulerStopped);
        info!("Scheduler stopped");
    }

    async fn execute(&self, handler: Arc<dyn JobHandler>, started_at: DateTime<Utc>) -> JobResult {
        let start = Instant::now();
        let job = handler.name();
        let event_tx = self.event_tx.clone();
        let ctx = JobContext::new(job, started_at);
        let run_id = ctx.run_id;
        let ctx = ctx.with_progress_callback(move |percent, message| {
            let _ = event_tx.send(SchedulerEvent::JobProgress {
                run_id,
                percent,
                message: message.map(String::from),
            });
        });

        info!(job, %run_id, "Running job");
        let _ = self
            .event_tx
            .send(SchedulerEvent::JobStarted { run_id, job });

        let timeout = self.config.job_timeout;
        let result = match tokio::time::timeout(timeout, handler.execute(ctx)).await {
            Ok(result) => result,
            Err(_) => {
                let message = timeout_message(timeout);
                warn!(job, %run_id, "{message}");
                handler.on_timeout(run_id, started_at, timeout).await;
                JobResult::Failed(message)
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            JobResult::Success(summary) => {
                info!(job, %run_id, duration_ms, "Job completed");
                debug!(job, summary = ?summary, "Job summary");
                let _ = self.event_tx.send(SchedulerEvent::JobCompleted {
                    run_id,
                    job,
                    duration_ms,
                });
            }
            JobResult::Failed(error) => {
                warn!(job, %run_id, %error, duration_ms, "Job failed");
                let _ = self.event_tx.send(SchedulerEvent::JobFailed {
                    run_id,
                    job,
                    error: error.clone(),
                });
            }
        }
        result
    }
}

/// Builder for creating a scheduler with handlers.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    handlers: Vec<Arc<dyn JobHandler>>,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Set the scheduler configuration.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a handler. A later handler with the same name replaces an earlier one.
    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn build(self) -> Scheduler {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let mut handlers = BTreeMap::new();
        for handler in self.handlers {
            debug!(job = handler.name(), schedule = %handler.schedule(), "Registered job handler");
            handlers.insert(handler.name(), handler);
        }
        Scheduler {
            config: self.config,
            handlers: Arc::new(handlers),
            event_tx,
        }
    }
}
