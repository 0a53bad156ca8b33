use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use canopy_catalog::{CatalogResult, LeafStream, ResourceSource};
use canopy_store::{BackingStore, StoreError, StoreResult};
use canopy_types::ResourceId;

/// Wraps a store, logging every key it is asked about and optionally
/// failing the next few calls as unavailable.
pub struct RecordingStore {
    inner: Arc<dyn BackingStore>,
    touched: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn BackingStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            touched: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(0),
        })
    }

    /// `<op> table/id` for records, `<op> set[key]` for sets.
    pub fn touched(&self) -> Vec<String> {
        self.touched.lock().unwrap().clone()
    }

    /// Whether any call addressed `target` (`table/id` or `set[key]`).
    pub fn touched_target(&self, target: &str) -> bool {
        self.touched()
            .iter()
            .any(|entry| entry.split_once(' ').map(|(_, t)| t) == Some(target))
    }

    /// Whether any mutating call addressed `target`.
    pub fn wrote_target(&self, target: &str) -> bool {
        self.touched().iter().any(|entry| match entry.split_once(' ') {
            Some((op, t)) => t == target && !matches!(op, "get" | "exists" | "members"),
            None => false,
        })
    }

    pub fn reset(&self) {
        self.touched.lock().unwrap().clear();
    }

    pub fn fail_next(&self, calls: usize) {
        self.failures_left.store(calls, Ordering::SeqCst);
    }

    fn record(&self, entry: String) -> StoreResult<()> {
        self.touched.lock().unwrap().push(entry);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BackingStore for RecordingStore {
    async fn get(&self, table: &str, id: &str) -> StoreResult<Option<Vec<u8>>> {
        self.record(format!("get {table}/{id}"))?;
        self.inner.get(table, id).await
    }

    async fn put(&self, table: &str, id: &str, body: Vec<u8>) -> StoreResult<()> {
        self.record(format!("put {table}/{id}"))?;
        self.inner.put(table, id, body).await
    }

    async fn put_as_of(
        &self,
        table: &str,
        id: &str,
        body: Vec<u8>,
        written_at: Instant,
    ) -> StoreResult<()> {
        self.record(format!("put {table}/{id}"))?;
        self.inner.put_as_of(table, id, body, written_at).await
    }

    async fn delete(&self, table: &str, id: &str) -> StoreResult<bool> {
        self.record(format!("delete {table}/{id}"))?;
        self.inner.delete(table, id).await
    }

    async fn exists(&self, table: &str, id: &str) -> StoreResult<bool> {
        self.record(format!("exists {table}/{id}"))?;
        self.inner.exists(table, id).await
    }

    async fn add_member(&self, set: &str, key: &str, member: &str) -> StoreResult<()> {
        self.record(format!("add_member {set}[{key}]"))?;
        self.inner.add_member(set, key, member).await
    }

    async fn remove_member(&self, set: &str, key: &str, member: &str) -> StoreResult<bool> {
        self.record(format!("remove_member {set}[{key}]"))?;
        self.inner.remove_member(set, key, member).await
    }

    async fn members(&self, set: &str, key: &str) -> StoreResult<Vec<String>> {
        self.record(format!("members {set}[{key}]"))?;
        self.inner.members(set, key).await
    }

    async fn clear_members(&self, set: &str, key: &str) -> StoreResult<usize> {
        self.record(format!("clear_members {set}[{key}]"))?;
        self.inner.clear_members(set, key).await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

/// Upstream that counts how often it is queried.
pub struct CountingSource<U> {
    inner: U,
    calls: AtomicUsize,
}

impl<U> CountingSource<U> {
    pub fn new(inner: U) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<U: ResourceSource> ResourceSource for CountingSource<U> {
    async fn resources_by_id(&self, id: &ResourceId) -> CatalogResult<LeafStream<'static>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resources_by_id(id).await
    }

    async fn resources_by_type(&self, resource_type: &str) -> CatalogResult<LeafStream<'static>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resources_by_type(resource_type).await
    }

    async fn resources_by_serialised_format(
        &self,
        serialised_format: &str,
    ) -> CatalogResult<LeafStream<'static>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .resources_by_serialised_format(serialised_format)
            .await
    }
}
