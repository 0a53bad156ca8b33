use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{validate_name, BackingStore};

/// A value with an optional expiry deadline.
#[derive(Clone, Debug)]
struct Expiring<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Expiring<T> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

#[derive(Default)]
struct ExpiringState {
    /// table -> id -> body
    records: HashMap<String, HashMap<String, Expiring<Vec<u8>>>>,
    /// set -> key -> members
    sets: HashMap<String, HashMap<String, Expiring<BTreeSet<String>>>>,
}

/// In-process key-value engine with hash and set emulation.
///
/// Every entry carries an optional time-to-live, refreshed on each write to
/// that entry (a `put`, or an `add_member` on the set). Expired entries read
/// as absent and are reclaimed by [`ExpiringStore::purge_expired`] or lazily
/// on the next write to the same key.
///
/// Completeness held in this engine is only "complete as of last write, until
/// expiry": once a mark expires the catalog simply reports a miss.
pub struct ExpiringStore {
    ttl: Option<Duration>,
    state: RwLock<ExpiringState>,
}

impl ExpiringStore {
    /// A store whose entries never expire.
    pub fn new() -> Self {
        Self {
            ttl: None,
            state: RwLock::new(ExpiringState::default()),
        }
    }

    /// A store whose entries expire `ttl` after their last write.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::new()
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Number of live records across all tables.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.read_state()
            .map(|state| {
                state
                    .records
                    .values()
                    .flat_map(HashMap::values)
                    .filter(|entry| entry.is_live(now))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired record and set. Returns how many entries were removed.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let now = Instant::now();
        let mut state = self.write_state()?;
        let mut removed = 0;
        for table in state.records.values_mut() {
            let before = table.len();
            table.retain(|_, entry| entry.is_live(now));
            removed += before - table.len();
        }
        for set in state.sets.values_mut() {
            let before = set.len();
            set.retain(|_, entry| entry.is_live(now));
            removed += before - set.len();
        }
        debug!(removed, "purged expired entries");
        Ok(removed)
    }

    fn deadline(&self) -> Option<Instant> {
        self.ttl.map(|ttl| Instant::now() + ttl)
    }

    fn insert_record(
        &self,
        table: &str,
        id: &str,
        body: Vec<u8>,
        expires_at: Option<Instant>,
    ) -> StoreResult<()> {
        validate_name(table)?;
        let entry = Expiring {
            value: body,
            expires_at,
        };
        let mut state = self.write_state()?;
        state
            .records
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), entry);
        Ok(())
    }

    fn read_state(&self) -> StoreResult<RwLockReadGuard<'_, ExpiringState>> {
        self.state
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write_state(&self) -> StoreResult<RwLockWriteGuard<'_, ExpiringState>> {
        self.state
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }
}

impl Default for ExpiringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for ExpiringStore {
    async fn get(&self, table: &str, id: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_name(table)?;
        let now = Instant::now();
        let state = self.read_state()?;
        Ok(state
            .records
            .get(table)
            .and_then(|t| t.get(id))
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, table: &str, id: &str, body: Vec<u8>) -> StoreResult<()> {
        self.insert_record(table, id, body, self.deadline())
    }

    async fn put_as_of(
        &self,
        table: &str,
        id: &str,
        body: Vec<u8>,
        written_at: Instant,
    ) -> StoreResult<()> {
        let expires_at = self.ttl.map(|ttl| written_at + ttl);
        self.insert_record(table, id, body, expires_at)
    }

    async fn delete(&self, table: &str, id: &str) -> StoreResult<bool> {
        validate_name(table)?;
        let now = Instant::now();
        let mut state = self.write_state()?;
        let removed = state
            .records
            .get_mut(table)
            .and_then(|t| t.remove(id))
            .is_some_and(|entry| entry.is_live(now));
        Ok(removed)
    }

    async fn exists(&self, table: &str, id: &str) -> StoreResult<bool> {
        validate_name(table)?;
        let now = Instant::now();
        let state = self.read_state()?;
        Ok(state
            .records
            .get(table)
            .and_then(|t| t.get(id))
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn add_member(&self, set: &str, key: &str, member: &str) -> StoreResult<()> {
        validate_name(set)?;
        let now = Instant::now();
        let deadline = self.deadline();
        let mut state = self.write_state()?;
        let entry = state
            .sets
            .entry(set.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert_with(|| Expiring {
                value: BTreeSet::new(),
                expires_at: deadline,
            });
        if !entry.is_live(now) {
            entry.value.clear();
        }
        entry.value.insert(member.to_string());
        entry.expires_at = deadline;
        Ok(())
    }

    async fn remove_member(&self, set: &str, key: &str, member: &str) -> StoreResult<bool> {
        validate_name(set)?;
        let now = Instant::now();
        let mut state = self.write_state()?;
        let removed = state
            .sets
            .get_mut(set)
            .and_then(|s| s.get_mut(key))
            .filter(|entry| entry.is_live(now))
            .is_some_and(|entry| entry.value.remove(member));
        Ok(removed)
    }

    async fn members(&self, set: &str, key: &str) -> StoreResult<Vec<String>> {
        validate_name(set)?;
        let now = Instant::now();
        let state = self.read_state()?;
        Ok(state
            .sets
            .get(set)
            .and_then(|s| s.get(key))
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_members(&self, set: &str, key: &str) -> StoreResult<usize> {
        validate_name(set)?;
        let now = Instant::now();
        let mut state = self.write_state()?;
        let cleared = state
            .sets
            .get_mut(set)
            .and_then(|s| s.remove(key))
            .filter(|entry| entry.is_live(now))
            .map_or(0, |entry| entry.value.len());
        Ok(cleared)
    }

    fn backend_name(&self) -> &'static str {
        "expiring"
    }
}

impl std::fmt::Debug for ExpiringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringStore")
            .field("ttl", &self.ttl)
            .field("record_count", &self.len())
            .finish()
    }
}
