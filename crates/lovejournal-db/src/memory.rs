//! In-process document store.
//!
//! Backs `STORE_BACKEND=memory` for local runs and is the store every test in
//! the workspace is written against. Individual operations can be made to
//! fail with [`InMemoryStore::fail_on`] so error paths can be exercised
//! without a database.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use lovejournal_core::{
    AnniversaryEvent, AuditRepository, DocumentStore, Effect, EffectRepository, Error,
    EventRepository, GlobalStats, Memory, MemoryRepository, Result, RunAudit, StatsRepository,
    UserCounts, UserRecord, UserRepository, UserStats, UserStatus,
};

#[derive(Default)]
struct State {
    users: BTreeMap<String, UserRecord>,
    memories: BTreeMap<Uuid, Memory>,
    events: Vec<AnniversaryEvent>,
    effects: Vec<Effect>,
    user_stats: HashMap<String, UserStats>,
    global_stats: Option<GlobalStats>,
    job_stats: HashMap<String, RunAudit>,
    job_history: Vec<RunAudit>,
    failing: HashSet<String>,
}

/// Thread-safe in-memory implementation of every repository trait.
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named operation fail with a database-style error until
    /// [`clear_failures`](Self::clear_failures) is called.
    ///
    /// Operation names are `<collection>.<method>`, for example
    /// `users.list_removed_before` or `memories.delete_for_user`.
    pub fn fail_on(&self, operation: impl Into<String>) {
        self.lock().failing.insert(operation.into());
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Bundle this store as a [`DocumentStore`].
    pub fn document_store(&self) -> DocumentStore {
        DocumentStore {
            users: Arc::new(self.clone()),
            memories: Arc::new(self.clone()),
            events: Arc::new(self.clone()),
            effects: Arc::new(self.clone()),
            stats: Arc::new(self.clone()),
            audit: Arc::new(self.clone()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test;
        // the state is still usable for reporting.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the state, failing first if `operation` was marked to fail.
    fn enter(&self, operation: &str) -> Result<MutexGuard<'_, State>> {
        let state = self.lock();
        if state.failing.contains(operation) {
            return Err(Error::Internal(format!("injected failure: {operation}")));
        }
        Ok(state)
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn upsert(&self, user: &UserRecord) -> Result<()> {
        let mut state = self.enter("users.upsert")?;
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<UserRecord>> {
        let state = self.enter("users.get")?;
        Ok(state.users.get(id).cloned())
    }

    async fn set_status(
        &self,
        id: &str,
        status: UserStatus,
        removed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.enter("users.set_status")?;
        let user = state
            .users
            .get_mut(id)
            .ok_or_else(|| Error::UserNotFound(id.to_string()))?;
        user.status = status;
        user.removed_at = removed_at;
        Ok(())
    }

    async fn list_removed_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<UserRecord>> {
        let state = self.enter("users.list_removed_before")?;
        let mut due: Vec<UserRecord> = state
            .users
            .values()
            .filter(|u| u.is_reapable(cutoff))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.removed_at.cmp(&b.removed_at).then(a.id.cmp(&b.id)));
        due.truncate(limit);
        Ok(due)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.enter("users.delete")?;
        Ok(state.users.remove(id).is_some())
    }

    async fn count_by_status(&self) -> Result<UserCounts> {
        let state = self.enter("users.count_by_status")?;
        let mut counts = UserCounts::default();
        for user in state.users.values() {
            match user.status {
                UserStatus::Active => counts.active += 1,
                UserStatus::Suspended => counts.suspended += 1,
                UserStatus::Removed => counts.removed += 1,
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl MemoryRepository for InMemoryStore {
    async fn insert(&self, memory: &Memory) -> Result<()> {
        let mut state = self.enter("memories.insert")?;
        state.memories.insert(memory.id, memory.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Memory>> {
        let state = self.enter("memories.get")?;
        Ok(state.memories.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Memory>> {
        let state = self.enter("memories.list_for_user")?;
        let mut owned: Vec<Memory> = state
            .memories
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(owned)
    }

    async fn remove_image(&self, id: Uuid, reference: &str) -> Result<bool> {
        let mut state = self.enter("memories.remove_image")?;
        let Some(memory) = state.memories.get_mut(&id) else {
            return Ok(false);
        };
        let before = memory.images.len();
        memory.images.retain(|r| r != reference);
        Ok(memory.images.len() != before)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut state = self.enter("memories.delete")?;
        Ok(state.memories.remove(&id).is_some())
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<u64> {
        let mut state = self.enter("memories.delete_for_user")?;
        let before = state.memories.len();
        state.memories.retain(|_, m| m.user_id != user_id);
        Ok((before - state.memories.len()) as u64)
    }

    async fn totals(&self) -> Result<(i64, i64)> {
        let state = self.enter("memories.totals")?;
        let images: usize = state.memories.values().map(|m| m.images.len()).sum();
        Ok((state.memories.len() as i64, images as i64))
    }
}

#[async_trait]
impl EventRepository for InMemoryStore {
    async fn insert(&self, event: &AnniversaryEvent) -> Result<()> {
        let mut state = self.enter("events.insert")?;
        state.events.push(event.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<AnniversaryEvent>> {
        let state = self.enter("events.list_for_user")?;
        let mut owned: Vec<AnniversaryEvent> = state
            .events
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|e| e.date);
        Ok(owned)
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<u64> {
        let mut state = self.enter("events.delete_for_user")?;
        let before = state.events.len();
        state.events.retain(|e| e.user_id != user_id);
        Ok((before - state.events.len()) as u64)
    }
}

#[async_trait]
impl EffectRepository for InMemoryStore {
    async fn insert(&self, effect: &Effect) -> Result<()> {
        let mut state = self.enter("effects.insert")?;
        state.effects.push(effect.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Effect>> {
        let state = self.enter("effects.list_for_user")?;
        Ok(state
            .effects
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<u64> {
        let mut state = self.enter("effects.delete_for_user")?;
        let before = state.effects.len();
        state.effects.retain(|e| e.user_id != user_id);
        Ok((before - state.effects.len()) as u64)
    }
}

#[async_trait]
impl StatsRepository for InMemoryStore {
    async fn put_user_stats(&self, stats: &UserStats) -> Result<()> {
        let mut state = self.enter("stats.put_user_stats")?;
        state.user_stats.insert(stats.user_id.clone(), stats.clone());
        Ok(())
    }

    async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>> {
        let state = self.enter("stats.get_user_stats")?;
        Ok(state.user_stats.get(user_id).cloned())
    }

    async fn delete_user_stats(&self, user_id: &str) -> Result<bool> {
        let mut state = self.enter("stats.delete_user_stats")?;
        Ok(state.user_stats.remove(user_id).is_some())
    }

    async fn put_global_stats(&self, stats: &GlobalStats) -> Result<()> {
        let mut state = self.enter("stats.put_global_stats")?;
        state.global_stats = Some(stats.clone());
        Ok(())
    }

    async fn get_global_stats(&self) -> Result<Option<GlobalStats>> {
        let state = self.enter("stats.get_global_stats")?;
        Ok(state.global_stats.clone())
    }
}

#[async_trait]
impl AuditRepository for InMemoryStore {
    async fn record_run(&self, audit: &RunAudit) -> Result<()> {
        let mut state = self.enter("audit.record_run")?;
        state
            .job_stats
            .insert(audit.job_name.clone(), audit.clone());
        state.job_history.push(audit.clone());
        Ok(())
    }

    async fn latest(&self, job_name: &str) -> Result<Option<RunAudit>> {
        let state = self.enter("audit.latest")?;
        Ok(state.job_stats.get(job_name).cloned())
    }

    async fn history(&self, job_name: &str, limit: i64) -> Result<Vec<RunAudit>> {
        let state = self.enter("audit.history")?;
        let mut runs: Vec<RunAudit> = state
            .job_history
            .iter()
            .filter(|r| r.job_name == job_name)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }

    async fn prune_history(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut state = self.enter("audit.prune_history")?;
        let len = state.job_history.len();
        state.job_history.retain(|r| r.started_at >= before);
        Ok((len - state.job_history.len()) as u64)
    }
}
