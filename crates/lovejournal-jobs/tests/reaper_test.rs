//! Account reaper behavior against the in-memory store and service doubles.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use lovejournal_core::{
    AnniversaryEvent, DeleteOutcome, DocumentStore, Effect, ImageStore, Memory, ResourcePage,
    RunStatus, StoredImage, UserRecord, UserStats, UserStatus,
};
use lovejournal_db::InMemoryStore;
use lovejournal_jobs::{
    AccountReaper, JobContext, JobHandler, JobResult, PurgeStage, ReaperHandler, Schedule,
    SchedulerBuilder, SchedulerConfig, SchedulerEvent,
};
use lovejournal_media::mock::{MockIdentityProvider, MockImageStore};

const JOB: &str = "account-reaper";

struct Fixture {
    store: InMemoryStore,
    docs: DocumentStore,
    images: MockImageStore,
    identity: MockIdentityProvider,
}

impl Fixture {
    fn new(images: MockImageStore, identity: MockIdentityProvider) -> Self {
        let store = InMemoryStore::new();
        let docs = store.document_store();
        Self {
            store,
            docs,
            images,
            identity,
        }
    }

    fn reaper(&self) -> AccountReaper {
        AccountReaper::new(
            self.docs.clone(),
            Arc::new(self.images.clone()),
            Arc::new(self.identity.clone()),
        )
    }

    /// A removed user owning one memory per image reference, plus one event,
    /// one effect and a stats document.
    async fn seed_user(&self, uid: &str, removed_at: Option<DateTime<Utc>>, images: &[&str]) {
        let mut user = UserRecord::new(uid, format!("{uid}@example.com"));
        if let Some(at) = removed_at {
            user = user.mark_removed(at);
        }
        self.docs.users.upsert(&user).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 2, 14).unwrap();
        for (i, image) in images.iter().enumerate() {
            let memory = Memory::new(uid, format!("memory {i}"), date, vec![image.to_string()]);
            self.docs.memories.insert(&memory).await.unwrap();
        }
        self.docs
            .events
            .insert(&AnniversaryEvent::new(uid, "First date", date))
            .await
            .unwrap();
        self.docs
            .effects
            .insert(&Effect::new(uid, "hearts", serde_json::json!({"density": 3})))
            .await
            .unwrap();
        self.docs
            .stats
            .put_user_stats(&UserStats {
                user_id: uid.to_string(),
                memory_count: images.len() as i64,
                image_count: images.len() as i64,
                event_count: 1,
                computed_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    async fn user_data_intact(&self, uid: &str, memories: usize) -> bool {
        self.docs.users.get(uid).await.unwrap().is_some()
            && self.docs.memories.list_for_user(uid).await.unwrap().len() == memories
            && self.docs.events.list_for_user(uid).await.unwrap().len() == 1
            && self.docs.effects.list_for_user(uid).await.unwrap().len() == 1
            && self.docs.stats.get_user_stats(uid).await.unwrap().is_some()
            && self.identity.has_identity(uid)
    }

    async fn user_data_gone(&self, uid: &str) -> bool {
        self.docs.users.get(uid).await.unwrap().is_none()
            && self.docs.memories.list_for_user(uid).await.unwrap().is_empty()
            && self.docs.events.list_for_user(uid).await.unwrap().is_empty()
            && self.docs.effects.list_for_user(uid).await.unwrap().is_empty()
            && self.docs.stats.get_user_stats(uid).await.unwrap().is_none()
            && !self.identity.has_identity(uid)
    }
}

fn days_ago(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Some(now - Duration::days(days))
}

/// An upload tagged with a memory id that no memory record points at.
fn tagged_upload(public_id: &str, memory_id: &str) -> StoredImage {
    StoredImage {
        public_id: public_id.to_string(),
        url: format!("https://res.cloudinary.com/mock/image/upload/v1/{public_id}.jpg"),
        created_at: None,
        context: BTreeMap::from([("memory_id".to_string(), memory_id.to_string())]),
    }
}

/// Image store whose destroys never finish in time.
struct StalledImages(MockImageStore);

#[async_trait]
impl ImageStore for StalledImages {
    async fn destroy(&self, public_id: &str) -> lovejournal_core::Result<DeleteOutcome> {
        tokio::time::sleep(StdDuration::from_secs(3600)).await;
        self.0.destroy(public_id).await
    }

    async fn list_by_prefix(
        &self,
        prefix: &str,
        cursor: Option<&str>,
    ) -> lovejournal_core::Result<ResourcePage> {
        self.0.list_by_prefix(prefix, cursor).await
    }
}

#[tokio::test]
async fn test_user_past_grace_is_fully_deleted() {
    let images = MockImageStore::new()
        .with_image("love-journal/u1/a")
        .with_image("love-journal/u1/b");
    let fx = Fixture::new(images, MockIdentityProvider::new().with_identity("u1"));
    let now = Utc::now();
    fx.seed_user(
        "u1",
        days_ago(now, 8),
        &[
            "love-journal/u1/a",
            "https://res.cloudinary.com/demo/image/upload/v1712000000/love-journal/u1/b.jpg",
        ],
    )
    .await;

    let report = fx.reaper().reap_at(now).await.unwrap();

    assert_eq!(report.accounts_deleted(), 1);
    assert_eq!(report.accounts_failed(), 0);
    assert_eq!(report.images_deleted(), 2);
    assert_eq!(report.status(), RunStatus::Success);
    assert!(fx.user_data_gone("u1").await);
    assert!(!fx.images.contains("love-journal/u1/a"));
    assert!(!fx.images.contains("love-journal/u1/b"));

    let audit = fx.docs.audit.latest(JOB).await.unwrap().unwrap();
    assert_eq!(audit.accounts_deleted, 1);
    assert_eq!(audit.accounts_failed, 0);
    assert_eq!(audit.images_deleted, 2);
    assert_eq!(audit.memories_deleted, 2);
    assert_eq!(audit.status, RunStatus::Success);
}

#[tokio::test]
async fn test_image_failure_leaves_records_untouched() {
    let images = MockImageStore::new()
        .with_image("love-journal/u1/a")
        .with_image("love-journal/u1/b")
        .with_failing("love-journal/u1/b");
    let fx = Fixture::new(images, MockIdentityProvider::new().with_identity("u1"));
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 8), &["love-journal/u1/a", "love-journal/u1/b"])
        .await;

    let report = fx.reaper().reap_at(now).await.unwrap();

    assert_eq!(report.accounts_deleted(), 0);
    assert_eq!(report.accounts_failed(), 1);
    assert_eq!(report.status(), RunStatus::PartialFailure);

    let failure = &report.failures[0];
    assert_eq!(failure.stage, PurgeStage::Images);
    assert_eq!(failure.public_id.as_deref(), Some("love-journal/u1/b"));

    assert!(fx.user_data_intact("u1", 2).await);
    let user = fx.docs.users.get("u1").await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Removed);
    assert!(fx.identity.delete_calls().is_empty());

    let audit = fx.docs.audit.latest(JOB).await.unwrap().unwrap();
    assert_eq!(audit.accounts_failed, 1);
    assert_eq!(audit.status, RunStatus::PartialFailure);
    assert_eq!(audit.errors.len(), 1);
    assert!(audit.errors[0].contains("love-journal/u1/b"));
}

#[tokio::test]
async fn test_failure_does_not_stop_the_batch() {
    let images = MockImageStore::new()
        .with_image("love-journal/u1/a")
        .with_image("love-journal/u2/a")
        .with_failing("love-journal/u1/a");
    let identity = MockIdentityProvider::new()
        .with_identity("u1")
        .with_identity("u2");
    let fx = Fixture::new(images, identity);
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 20), &["love-journal/u1/a"]).await;
    fx.seed_user("u2", days_ago(now, 10), &["love-journal/u2/a"]).await;

    let report = fx.reaper().reap_at(now).await.unwrap();

    assert_eq!(report.accounts_processed(), 2);
    assert_eq!(report.accounts_failed(), 1);
    assert_eq!(report.accounts_deleted(), 1);
    assert!(fx.user_data_intact("u1", 1).await);
    assert!(fx.user_data_gone("u2").await);
}

#[tokio::test]
async fn test_users_inside_grace_are_never_selected() {
    let images = MockImageStore::new().with_image("love-journal/recent/a");
    let identity = MockIdentityProvider::new()
        .with_identity("recent")
        .with_identity("active");
    let fx = Fixture::new(images, identity);
    let now = Utc::now();
    fx.seed_user("recent", days_ago(now, 6), &["love-journal/recent/a"])
        .await;
    fx.seed_user("active", None, &[]).await;

    let report = fx.reaper().reap_at(now).await.unwrap();

    assert_eq!(report.accounts_processed(), 0);
    assert_eq!(report.status(), RunStatus::Success);
    assert!(fx.images.destroy_calls().is_empty());
    assert!(fx.user_data_intact("recent", 1).await);
    assert!(fx.user_data_intact("active", 0).await);
}

#[tokio::test]
async fn test_batch_size_bounds_each_run() {
    let mut identity = MockIdentityProvider::new();
    for i in 0..5 {
        identity = identity.with_identity(format!("u{i}"));
    }
    let fx = Fixture::new(MockImageStore::new(), identity);
    let now = Utc::now();
    for i in 0..5 {
        fx.seed_user(&format!("u{i}"), days_ago(now, 30 - i), &[]).await;
    }

    let reaper = fx.reaper().with_batch_size(3);
    let first = reaper.reap_at(now).await.unwrap();
    assert_eq!(first.accounts_processed(), 3);
    assert!(first.accounts_deleted() + first.accounts_failed() <= 3);
    // Oldest removals go first.
    let ids: Vec<_> = first.purged.iter().map(|p| p.user_id.as_str()).collect();
    assert_eq!(ids, vec!["u0", "u1", "u2"]);

    let second = reaper.reap_at(now).await.unwrap();
    assert_eq!(second.accounts_processed(), 2);
    assert_eq!(fx.docs.audit.history(JOB, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_rerun_after_partial_failure_completes() {
    let flaky = MockImageStore::new()
        .with_image("love-journal/u1/a")
        .with_image("love-journal/u1/b")
        .with_failing("love-journal/u1/b");
    let identity = MockIdentityProvider::new().with_identity("u1");
    let fx = Fixture::new(flaky, identity.clone());
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 8), &["love-journal/u1/a", "love-journal/u1/b"])
        .await;

    let first = fx.reaper().reap_at(now).await.unwrap();
    assert_eq!(first.accounts_failed(), 1);
    assert!(fx.user_data_intact("u1", 2).await);

    // The image host recovers; "a" is already gone and "b" was removed out of band.
    let recovered = AccountReaper::new(
        fx.docs.clone(),
        Arc::new(MockImageStore::new()),
        Arc::new(identity),
    );
    let second = recovered.reap_at(now).await.unwrap();
    assert_eq!(second.accounts_deleted(), 1);
    assert_eq!(second.purged[0].images_missing, 2);
    assert!(fx.user_data_gone("u1").await);

    let third = recovered.reap_at(now).await.unwrap();
    assert_eq!(third.accounts_processed(), 0);
}

#[tokio::test]
async fn test_missing_identity_counts_as_deleted() {
    let fx = Fixture::new(MockImageStore::new(), MockIdentityProvider::new());
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 9), &[]).await;

    let report = fx.reaper().reap_at(now).await.unwrap();
    assert_eq!(report.accounts_deleted(), 1);
    assert_eq!(report.purged[0].identity, DeleteOutcome::NotFound);
}

#[tokio::test]
async fn test_identity_failure_marks_user_failed() {
    let identity = MockIdentityProvider::new()
        .with_identity("u1")
        .with_failing("u1");
    let fx = Fixture::new(MockImageStore::new(), identity);
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 9), &[]).await;

    let report = fx.reaper().reap_at(now).await.unwrap();
    assert_eq!(report.accounts_failed(), 1);
    assert_eq!(report.failures[0].stage, PurgeStage::Identity);
    // Document store records went first and are not restored.
    assert!(fx.docs.users.get("u1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_failure_after_images_marks_user_failed() {
    let images = MockImageStore::new().with_image("love-journal/u1/a");
    let fx = Fixture::new(images, MockIdentityProvider::new().with_identity("u1"));
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 9), &["love-journal/u1/a"]).await;
    fx.store.fail_on("events.delete_for_user");

    let report = fx.reaper().reap_at(now).await.unwrap();
    assert_eq!(report.accounts_failed(), 1);
    assert_eq!(report.failures[0].stage, PurgeStage::Events);
    assert!(!fx.images.contains("love-journal/u1/a"));
    assert!(fx.docs.users.get("u1").await.unwrap().is_some());
    assert!(fx.identity.has_identity("u1"));
}

#[tokio::test]
async fn test_selection_failure_records_one_failed_run() {
    let fx = Fixture::new(MockImageStore::new(), MockIdentityProvider::new());
    fx.store.fail_on("users.list_removed_before");

    assert!(fx.reaper().reap_at(Utc::now()).await.is_err());

    let history = fx.docs.audit.history(JOB, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, RunStatus::Failed);
    assert_eq!(history[0].accounts_processed, 0);
    assert!(history[0].errors[0].contains("selection failed"));
}

#[tokio::test]
async fn test_custom_grace_period() {
    let fx = Fixture::new(
        MockImageStore::new(),
        MockIdentityProvider::new().with_identity("u1"),
    );
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 2), &[]).await;

    let strict = fx.reaper();
    assert_eq!(strict.reap_at(now).await.unwrap().accounts_processed(), 0);

    let lenient = fx.reaper().with_grace_period(Duration::days(1));
    assert_eq!(lenient.reap_at(now).await.unwrap().accounts_deleted(), 1);
}

#[tokio::test]
async fn test_handler_reports_summary() {
    let fx = Fixture::new(
        MockImageStore::new(),
        MockIdentityProvider::new().with_identity("u1"),
    );
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 8), &[]).await;

    let handler = ReaperHandler::new(Arc::new(fx.reaper()), Schedule::daily_at(2, 0).unwrap());
    assert_eq!(handler.name(), JOB);

    match handler.execute(JobContext::new(JOB, now)).await {
        JobResult::Success(Some(summary)) => {
            assert_eq!(summary["accountsDeleted"], 1);
            assert_eq!(summary["status"], "success");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_handler_fails_when_selection_fails() {
    let fx = Fixture::new(MockImageStore::new(), MockIdentityProvider::new());
    fx.store.fail_on("users.list_removed_before");

    let handler = ReaperHandler::new(Arc::new(fx.reaper()), Schedule::daily_at(2, 0).unwrap());
    let result = handler.execute(JobContext::new(JOB, Utc::now())).await;
    assert!(matches!(result, JobResult::Failed(_)));
}

#[tokio::test]
async fn test_unreferenced_folder_images_are_destroyed() {
    let images = MockImageStore::new()
        .with_image("love-journal/u1/a")
        .with_stored(tagged_upload("love-journal/u1/orphan", "m-42"))
        .with_image("love-journal/u10/keep");
    let fx = Fixture::new(images, MockIdentityProvider::new().with_identity("u1"));
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 8), &["love-journal/u1/a"]).await;

    let report = fx.reaper().reap_at(now).await.unwrap();

    assert_eq!(report.accounts_deleted(), 1);
    assert_eq!(report.images_deleted(), 2);
    assert_eq!(report.purged[0].images_unreferenced, 1);
    assert!(!fx.images.contains("love-journal/u1/orphan"));
    assert!(!fx.images.contains("love-journal/u1/a"));
    assert!(fx.images.contains("love-journal/u10/keep"));
    assert!(fx.user_data_gone("u1").await);

    let audit = fx.docs.audit.latest(JOB).await.unwrap().unwrap();
    assert_eq!(audit.images_deleted, 2);
}

#[tokio::test]
async fn test_user_without_records_still_loses_uploads() {
    let images = MockImageStore::new()
        .with_stored(tagged_upload("dev-photos/u1/one", "m-1"))
        .with_stored(tagged_upload("dev-photos/u1/two", "m-2"))
        .with_page_size(1);
    let fx = Fixture::new(images, MockIdentityProvider::new().with_identity("u1"));
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 8), &[]).await;

    let reaper = fx.reaper().with_root_folder("dev-photos");
    let report = reaper.reap_at(now).await.unwrap();

    assert_eq!(report.accounts_deleted(), 1);
    assert_eq!(report.purged[0].images_deleted, 2);
    assert_eq!(report.purged[0].images_unreferenced, 2);
    assert!(!fx.images.contains("dev-photos/u1/one"));
    assert!(!fx.images.contains("dev-photos/u1/two"));
    assert!(fx.images.list_calls() >= 2);
}

#[tokio::test]
async fn test_listing_failure_leaves_account_untouched() {
    let images = MockImageStore::new()
        .with_image("love-journal/u1/a")
        .with_failing_listing();
    let fx = Fixture::new(images, MockIdentityProvider::new().with_identity("u1"));
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 8), &["love-journal/u1/a"]).await;

    let report = fx.reaper().reap_at(now).await.unwrap();

    assert_eq!(report.accounts_failed(), 1);
    assert_eq!(report.failures[0].stage, PurgeStage::ListImages);
    assert!(fx.images.destroy_calls().is_empty());
    assert!(fx.user_data_intact("u1", 1).await);
}

#[tokio::test]
async fn test_handler_audit_shares_context_run_id() {
    let fx = Fixture::new(
        MockImageStore::new(),
        MockIdentityProvider::new().with_identity("u1"),
    );
    let now = Utc::now();
    fx.seed_user("u1", days_ago(now, 8), &[]).await;

    let handler = ReaperHandler::new(Arc::new(fx.reaper()), Schedule::daily_at(2, 0).unwrap());
    let ctx = JobContext::new(JOB, now);
    let run_id = ctx.run_id;

    match handler.execute(ctx).await {
        JobResult::Success(Some(summary)) => assert_eq!(summary["runId"], run_id.to_string()),
        other => panic!("unexpected result: {other:?}"),
    }
    let audit = fx.docs.audit.latest(JOB).await.unwrap().unwrap();
    assert_eq!(audit.run_id, run_id);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_run_is_audited_as_failed() {
    let images = MockImageStore::new().with_image("love-journal/u1/a");
    let fx = Fixture::new(images.clone(), MockIdentityProvider::new().with_identity("u1"));
    fx.seed_user("u1", days_ago(Utc::now(), 8), &["love-journal/u1/a"])
        .await;

    let reaper = AccountReaper::new(
        fx.docs.clone(),
        Arc::new(StalledImages(images)),
        Arc::new(fx.identity.clone()),
    );
    let scheduler = SchedulerBuilder::new()
        .with_config(SchedulerConfig::default().with_job_timeout(StdDuration::from_secs(1)))
        .with_handler(ReaperHandler::new(Arc::new(reaper), Schedule::daily_at(2, 0).unwrap()))
        .build();
    let mut events = scheduler.events();

    let result = scheduler.run_now(JOB).await.unwrap();
    assert!(matches!(result, JobResult::Failed(ref m) if m.contains("timeout of 1s")));

    let audit = fx.docs.audit.latest(JOB).await.unwrap().unwrap();
    assert_eq!(audit.status, RunStatus::Failed);
    assert!(audit.errors[0].contains("timeout of 1s"));

    let SchedulerEvent::JobStarted { run_id, .. } = events.recv().await.unwrap() else {
        panic!("expected JobStarted first");
    };
    assert_eq!(audit.run_id, run_id);
    assert!(fx.user_data_intact("u1", 1).await);
}
