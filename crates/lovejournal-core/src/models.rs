//! Core data models for the Love Journal backend.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// USERS
// =============================================================================

/// Account lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
    /// Marked for deletion; permanently deleted after the grace period.
    Removed,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            "removed" => Ok(UserStatus::Removed),
            other => Err(Error::InvalidInput(format!("unknown user status: {other}"))),
        }
    }
}

/// A user account record, keyed by the identity provider's uid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub status: UserStatus,
    pub removed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Create an active user.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: None,
            status: UserStatus::Active,
            removed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Mark this record removed at the given instant.
    pub fn mark_removed(mut self, at: DateTime<Utc>) -> Self {
        self.status = UserStatus::Removed;
        self.removed_at = Some(at);
        self
    }

    /// Whether the reaper may permanently delete this account given `cutoff`
    /// (now minus the grace period).
    pub fn is_reapable(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == UserStatus::Removed && self.removed_at.is_some_and(|at| at <= cutoff)
    }
}

// =============================================================================
// MEMORIES
// =============================================================================

/// A journal entry with its photos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub text: String,
    pub date: NaiveDate,
    /// Image references: public ids or delivery URLs.
    pub images: Vec<String>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        date: NaiveDate,
        images: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            title: title.into(),
            text: String::new(),
            date,
            images,
            location_name: None,
            latitude: None,
            longitude: None,
            created_at: Utc::now(),
        }
    }
}

/// Request body for creating a memory from already-uploaded images.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemoryRequest {
    pub title: String,
    #[serde(default)]
    pub text: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub images: Vec<String>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl CreateMemoryRequest {
    /// Build the record owned by `user_id`.
    pub fn into_memory(self, user_id: &str) -> Memory {
        Memory {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            title: self.title,
            text: self.text,
            date: self.date,
            images: self.images,
            location_name: self.location_name,
            latitude: self.latitude,
            longitude: self.longitude,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// SUBORDINATE RECORDS
// =============================================================================

/// An anniversary the couple wants to be reminded of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnniversaryEvent {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub date: NaiveDate,
    /// Repeats every year on the same month/day.
    pub recurring: bool,
    pub created_at: DateTime<Utc>,
}

impl AnniversaryEvent {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            title: title.into(),
            date,
            recurring: true,
            created_at: Utc::now(),
        }
    }
}

/// A per-user visual effect configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effect {
    pub id: Uuid,
    pub user_id: String,
    pub kind: String,
    pub settings: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl Effect {
    pub fn new(user_id: impl Into<String>, kind: impl Into<String>, settings: JsonValue) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            kind: kind.into(),
            settings,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// STATS
// =============================================================================

/// Aggregate counts for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: String,
    pub memory_count: i64,
    pub image_count: i64,
    pub event_count: i64,
    pub computed_at: DateTime<Utc>,
}

/// Number of users in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCounts {
    pub active: i64,
    pub suspended: i64,
    pub removed: i64,
}

/// Application-wide aggregate counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub users: UserCounts,
    pub memory_count: i64,
    pub image_count: i64,
    pub computed_at: DateTime<Utc>,
}

// =============================================================================
// RUN AUDIT
// =============================================================================

/// Outcome of one scheduled job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Finished, but at least one item failed.
    PartialFailure,
    /// Aborted before processing items.
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::Failed => "failed",
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunStatus::Success),
            "partial_failure" => Ok(RunStatus::PartialFailure),
            "failed" => Ok(RunStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown run status: {other}"))),
        }
    }
}

/// Audit record of one job execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAudit {
    pub run_id: Uuid,
    pub job_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub accounts_processed: i64,
    pub accounts_deleted: i64,
    pub accounts_failed: i64,
    pub images_deleted: i64,
    pub memories_deleted: i64,
    /// Rows touched by housekeeping jobs (pruned history, refreshed stats).
    pub records_affected: i64,
    pub errors: Vec<String>,
}

impl RunAudit {
    /// Start an audit record with zeroed counters.
    pub fn begin(job_name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            job_name: job_name.into(),
            status: RunStatus::Success,
            started_at,
            finished_at: started_at,
            duration_ms: 0,
            accounts_processed: 0,
            accounts_deleted: 0,
            accounts_failed: 0,
            images_deleted: 0,
            memories_deleted: 0,
            records_affected: 0,
            errors: Vec::new(),
        }
    }

    /// Stamp the finish time and duration.
    pub fn finish(mut self, status: RunStatus, finished_at: DateTime<Utc>) -> Self {
        self.status = status;
        self.finished_at = finished_at;
        self.duration_ms = (finished_at - self.started_at).num_milliseconds().max(0);
        self
    }
}

// =============================================================================
// IMAGE HOST
// =============================================================================

/// Result of a delete call against an external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    /// The object was already gone.
    NotFound,
}

/// An image as listed by the image host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    pub public_id: String,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Custom context key/value tags attached at upload time.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePage {
    pub resources: Vec<StoredImage>,
    pub next_cursor: Option<String>,
}

/// A photo within an aggregated memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryImage {
    pub public_id: String,
    pub url: String,
}

/// A memory assembled from listed images and the matching record, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryView {
    pub id: String,
    pub title: String,
    pub text: String,
    pub date: Option<NaiveDate>,
    pub images: Vec<MemoryImage>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Whether fields were merged from a stored memory record.
    pub has_record: bool,
}
