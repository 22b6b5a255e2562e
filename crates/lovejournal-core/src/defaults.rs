//! Centralized default constants for the Love Journal backend.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// ACCOUNT DELETION
// =============================================================================

/// Days a removed account waits before it is permanently deleted.
pub const GRACE_PERIOD_DAYS: i64 = 7;

/// Maximum number of accounts the reaper processes per run.
pub const REAPER_BATCH_SIZE: usize = 50;

// =============================================================================
// AUDIT
// =============================================================================

/// Days of run history kept before the prune job deletes it.
pub const AUDIT_RETENTION_DAYS: i64 = 30;

/// Default number of history rows returned by the history endpoint.
pub const AUDIT_HISTORY_LIMIT: i64 = 20;

/// Upper bound on the history endpoint's `limit` parameter.
pub const AUDIT_HISTORY_MAX_LIMIT: i64 = 200;

// =============================================================================
// SCHEDULED JOBS
// =============================================================================

/// Job name of the account reaper.
pub const REAPER_JOB: &str = "account-reaper";

/// Job name of the audit history prune.
pub const AUDIT_PRUNE_JOB: &str = "audit-prune";

/// Job name of the global stats refresh.
pub const STATS_JOB: &str = "stats-refresh";

/// Default schedule for the account reaper (UTC).
pub const REAPER_SCHEDULE: &str = "every day 02:00";

/// Default schedule for the audit history prune (UTC).
pub const AUDIT_PRUNE_SCHEDULE: &str = "every day 03:00";

/// Default schedule for the global stats refresh.
pub const STATS_SCHEDULE: &str = "every 6 hours";

/// Per-invocation timeout for a scheduled job (seconds).
///
/// Matches the managed function runtime's 9 minute ceiling.
pub const JOB_TIMEOUT_SECS: u64 = 540;

/// Capacity of the scheduler's broadcast event channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// IMAGE HOST
// =============================================================================

/// Root folder under which every user's images are stored.
pub const IMAGE_ROOT_FOLDER: &str = "love-journal";

/// Page size requested when listing images by prefix.
pub const IMAGE_LIST_PAGE_SIZE: u32 = 500;

/// Maximum number of pages followed when listing a user's images.
pub const IMAGE_LIST_MAX_PAGES: usize = 20;

/// Context key that ties an uploaded image to its memory record.
pub const MEMORY_ID_CONTEXT_KEY: &str = "memory_id";

// =============================================================================
// HTTP
// =============================================================================

/// Timeout for outbound requests to the image host and identity provider.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Default listen port for the API server.
pub const API_PORT: u16 = 3000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grace_period_is_one_week() {
        assert_eq!(GRACE_PERIOD_DAYS, 7);
    }

    #[test]
    fn test_history_limit_within_max() {
        assert!(AUDIT_HISTORY_LIMIT <= AUDIT_HISTORY_MAX_LIMIT);
    }

    #[test]
    fn test_job_names_are_distinct() {
        assert_ne!(REAPER_JOB, AUDIT_PRUNE_JOB);
        assert_ne!(REAPER_JOB, STATS_JOB);
        assert_ne!(AUDIT_PRUNE_JOB, STATS_JOB);
    }
}
