//! # lovejournal-jobs
//!
//! Scheduled background jobs for the Love Journal backend.
//!
//! This crate provides:
//! - A small in-process scheduler with declarative schedules
//!   (`every day 02:00`, `every 6 hours`) and a per-job timeout
//! - The account reaper, which permanently deletes accounts whose removal
//!   grace period has elapsed
//! - Housekeeping jobs for audit pruning and stats refresh
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lovejournal_jobs::{AccountReaper, ReaperHandler, Schedule, SchedulerBuilder};
//!
//! let reaper = Arc::new(AccountReaper::new(store, images, identity));
//! let scheduler = SchedulerBuilder::new()
//!     .with_handler(ReaperHandler::new(reaper, "every day 02:00".parse()?))
//!     .build();
//!
//! let handle = scheduler.start();
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod handler;
pub mod housekeeping;
pub mod reaper;
pub mod schedule;
pub mod scheduler;

pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler};
pub use housekeeping::{
    recompute_user_stats, refresh_global_stats, AuditPruneHandler, StatsRefreshHandler,
};
pub use reaper::{
    AccountFailure, AccountReaper, PurgeOutcome, PurgeStage, ReapReport, ReaperHandler,
};
pub use schedule::Schedule;
pub use scheduler::{
    Scheduler, SchedulerBuilder, SchedulerConfig, SchedulerEvent, SchedulerHandle,
};
