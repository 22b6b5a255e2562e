//! Core traits for the Love Journal backend.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy: the document store repositories, the image host and the
//! identity provider. Jobs and handlers only see these traits, so every
//! backend can be swapped for an in-memory double in tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// DOCUMENT STORE REPOSITORIES
// =============================================================================

/// Repository for user records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert or replace a user record.
    async fn upsert(&self, user: &UserRecord) -> Result<()>;

    /// Fetch a user record, if present.
    async fn get(&self, id: &str) -> Result<Option<UserRecord>>;

    /// Change a user's status. `removed_at` is stored as given.
    async fn set_status(
        &self,
        id: &str,
        status: UserStatus,
        removed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Users with status `removed` and `removed_at <= cutoff`, oldest first,
    /// at most `limit` of them.
    async fn list_removed_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<UserRecord>>;

    /// Delete a user record. Returns whether a record existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Count users in each status.
    async fn count_by_status(&self) -> Result<UserCounts>;
}

/// Repository for memory records.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Insert a memory record.
    async fn insert(&self, memory: &Memory) -> Result<()>;

    /// Fetch a memory record, if present.
    async fn get(&self, id: Uuid) -> Result<Option<Memory>>;

    /// All memories owned by a user, newest date first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Memory>>;

    /// Remove one image reference from a memory. Returns whether it was present.
    async fn remove_image(&self, id: Uuid, reference: &str) -> Result<bool>;

    /// Delete a single memory record. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Delete every memory owned by a user. Returns the number deleted.
    async fn delete_for_user(&self, user_id: &str) -> Result<u64>;

    /// Total number of memories and of image references across all memories.
    async fn totals(&self) -> Result<(i64, i64)>;
}

/// Repository for anniversary events.
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert(&self, event: &AnniversaryEvent) -> Result<()>;

    /// All events owned by a user, ordered by date.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<AnniversaryEvent>>;

    /// Delete every event owned by a user. Returns the number deleted.
    async fn delete_for_user(&self, user_id: &str) -> Result<u64>;
}

/// Repository for per-user effect configurations.
#[async_trait]
pub trait EffectRepository: Send + Sync {
    async fn insert(&self, effect: &Effect) -> Result<()>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Effect>>;

    /// Delete every effect owned by a user. Returns the number deleted.
    async fn delete_for_user(&self, user_id: &str) -> Result<u64>;
}

/// Repository for aggregate counts.
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn put_user_stats(&self, stats: &UserStats) -> Result<()>;

    async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>>;

    /// Delete a user's stats document. Returns whether it existed.
    async fn delete_user_stats(&self, user_id: &str) -> Result<bool>;

    async fn put_global_stats(&self, stats: &GlobalStats) -> Result<()>;

    async fn get_global_stats(&self) -> Result<Option<GlobalStats>>;
}

/// Repository for job run audits.
///
/// Every run is written twice: the latest-run document per job is replaced
/// and a copy is appended to the history log.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Persist a finished run.
    async fn record_run(&self, audit: &RunAudit) -> Result<()>;

    /// Latest run of a job, if any.
    async fn latest(&self, job_name: &str) -> Result<Option<RunAudit>>;

    /// Most recent history entries for a job, newest first.
    async fn history(&self, job_name: &str, limit: i64) -> Result<Vec<RunAudit>>;

    /// Delete history entries that started before `before`. Returns the count.
    async fn prune_history(&self, before: DateTime<Utc>) -> Result<u64>;
}

/// Bundle of document store repositories handed to jobs and handlers.
#[derive(Clone)]
pub struct DocumentStore {
    pub users: Arc<dyn UserRepository>,
    pub memories: Arc<dyn MemoryRepository>,
    pub events: Arc<dyn EventRepository>,
    pub effects: Arc<dyn EffectRepository>,
    pub stats: Arc<dyn StatsRepository>,
    pub audit: Arc<dyn AuditRepository>,
}

// =============================================================================
// EXTERNAL SERVICES
// =============================================================================

/// Remote image hosting.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Permanently delete an image by public id.
    async fn destroy(&self, public_id: &str) -> Result<DeleteOutcome>;

    /// List images whose public id starts with `prefix`, one page at a time.
    async fn list_by_prefix(&self, prefix: &str, cursor: Option<&str>) -> Result<ResourcePage>;
}

/// Authentication service holding user identities.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate a bearer token and return the uid it was issued to.
    async fn verify_token(&self, token: &str) -> Result<String>;

    /// Delete the identity for `uid`.
    async fn delete_identity(&self, uid: &str) -> Result<DeleteOutcome>;
}
