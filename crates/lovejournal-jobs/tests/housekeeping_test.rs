//! Audit pruning, stats refresh and per-user stats.

use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, Utc};
use lovejournal_core::{AnniversaryEvent, Memory, RunAudit, RunStatus, UserRecord};
use lovejournal_db::InMemoryStore;
use uuid::Uuid;
use lovejournal_jobs::{
    recompute_user_stats, AuditPruneHandler, JobContext, JobHandler, JobResult, Schedule,
    StatsRefreshHandler,
};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 9, 1).unwrap()
}

#[tokio::test]
async fn test_recompute_user_stats_counts_owned_records() {
    let store = InMemoryStore::new();
    let docs = store.document_store();
    docs.memories
        .insert(&Memory::new("u1", "a", date(), vec!["x".into(), "y".into()]))
        .await
        .unwrap();
    docs.memories
        .insert(&Memory::new("u1", "b", date(), vec!["z".into()]))
        .await
        .unwrap();
    docs.memories
        .insert(&Memory::new("u2", "c", date(), vec!["w".into()]))
        .await
        .unwrap();
    docs.events
        .insert(&AnniversaryEvent::new("u1", "Wedding", date()))
        .await
        .unwrap();

    let stats = recompute_user_stats(&docs, "u1").await.unwrap();
    assert_eq!(stats.memory_count, 2);
    assert_eq!(stats.image_count, 3);
    assert_eq!(stats.event_count, 1);

    let stored = docs.stats.get_user_stats("u1").await.unwrap().unwrap();
    assert_eq!(stored, stats);
}

#[tokio::test]
async fn test_audit_prune_removes_old_history_and_records_itself() {
    let store = InMemoryStore::new();
    let docs = store.document_store();
    let now = Utc::now();
    for days in [45, 31, 2] {
        let at = now - Duration::days(days);
        docs.audit
            .record_run(&RunAudit::begin("account-reaper", at).finish(RunStatus::Success, at))
            .await
            .unwrap();
    }

    let handler = AuditPruneHandler::new(docs.clone(), Schedule::daily_at(3, 0).unwrap());
    let result = handler
        .execute(JobContext::new("audit-prune", now))
        .await;
    assert!(result.is_success());

    assert_eq!(docs.audit.history("account-reaper", 10).await.unwrap().len(), 1);
    let own = docs.audit.latest("audit-prune").await.unwrap().unwrap();
    assert_eq!(own.records_affected, 2);
    assert_eq!(own.status, RunStatus::Success);
}

#[tokio::test]
async fn test_audit_prune_failure_is_recorded() {
    let store = InMemoryStore::new();
    store.fail_on("audit.prune_history");
    let docs = store.document_store();

    let handler = AuditPruneHandler::new(docs.clone(), Schedule::daily_at(3, 0).unwrap())
        .with_retention(Duration::days(10));
    let result = handler
        .execute(JobContext::new("audit-prune", Utc::now()))
        .await;
    assert!(matches!(result, JobResult::Failed(_)));

    let own = docs.audit.latest("audit-prune").await.unwrap().unwrap();
    assert_eq!(own.status, RunStatus::Failed);
    assert_eq!(own.errors.len(), 1);
}

#[tokio::test]
async fn test_stats_refresh_writes_global_counts() {
    let store = InMemoryStore::new();
    let docs = store.document_store();
    docs.users
        .upsert(&UserRecord::new("u1", "u1@example.com"))
        .await
        .unwrap();
    docs.users
        .upsert(&UserRecord::new("u2", "u2@example.com").mark_removed(Utc::now()))
        .await
        .unwrap();
    docs.memories
        .insert(&Memory::new("u1", "a", date(), vec!["x".into(), "y".into()]))
        .await
        .unwrap();

    let handler = StatsRefreshHandler::new(docs.clone(), Schedule::every_hours(6));
    assert!(handler
        .execute(JobContext::new("stats-refresh", Utc::now()))
        .await
        .is_success());

    let global = docs.stats.get_global_stats().await.unwrap().unwrap();
    assert_eq!(global.users.active, 1);
    assert_eq!(global.users.removed, 1);
    assert_eq!(global.memory_count, 1);
    assert_eq!(global.image_count, 2);

    let own = docs.audit.latest("stats-refresh").await.unwrap().unwrap();
    assert_eq!(own.status, RunStatus::Success);
}

#[tokio::test]
async fn test_timed_out_run_is_recorded_as_failed() {
    let store = InMemoryStore::new();
    let docs = store.document_store();
    let started_at = Utc::now() - Duration::minutes(10);
    let run_id = Uuid::now_v7();

    let handler = StatsRefreshHandler::new(docs.clone(), Schedule::every_hours(6));
    handler
        .on_timeout(run_id, started_at, StdDuration::from_secs(540))
        .await;

    let own = docs.audit.latest("stats-refresh").await.unwrap().unwrap();
    assert_eq!(own.run_id, run_id);
    assert_eq!(own.status, RunStatus::Failed);
    assert_eq!(own.started_at, started_at);
    assert!(own.errors[0].contains("timeout of 540s"));
}
