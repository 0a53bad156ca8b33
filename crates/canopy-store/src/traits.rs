use std::time::Instant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Storage engine behind the resource catalog.
///
/// Two families of primitives:
/// - records: opaque bodies addressed by `(table, id)`;
/// - sets: string members grouped under `(set, key)`.
///
/// All implementations must satisfy these invariants:
/// - Every primitive is idempotent (`put` overwrites, `add_member` of an
///   existing member is a no-op).
/// - `members` returns ids sorted ascending.
/// - Concurrent reads are always safe.
/// - A failed call has not partially committed.
/// - The store never interprets record bodies.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Read a record. Returns `Ok(None)` if it does not exist.
    async fn get(&self, table: &str, id: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Create or overwrite a record.
    async fn put(&self, table: &str, id: &str, body: Vec<u8>) -> StoreResult<()>;

    /// Like [`put`](Self::put), but on engines that expire entries the
    /// record's lifetime is counted from `written_at` instead of now.
    ///
    /// Engines without expiry just store the record.
    async fn put_as_of(
        &self,
        table: &str,
        id: &str,
        body: Vec<u8>,
        _written_at: Instant,
    ) -> StoreResult<()> {
        self.put(table, id, body).await
    }

    /// Delete a record. Returns `true` if it existed.
    async fn delete(&self, table: &str, id: &str) -> StoreResult<bool>;

    /// Check whether a record exists.
    async fn exists(&self, table: &str, id: &str) -> StoreResult<bool>;

    /// Add `member` to the set stored under `key`.
    async fn add_member(&self, set: &str, key: &str, member: &str) -> StoreResult<()>;

    /// Remove `member` from the set under `key`. Returns `true` if present.
    async fn remove_member(&self, set: &str, key: &str, member: &str) -> StoreResult<bool>;

    /// All members of the set under `key`, sorted. Empty if the set is absent.
    async fn members(&self, set: &str, key: &str) -> StoreResult<Vec<String>>;

    /// Drop the whole set under `key`, returning how many members it held.
    async fn clear_members(&self, set: &str, key: &str) -> StoreResult<usize>;

    /// Short engine name for logs.
    fn backend_name(&self) -> &'static str;
}

/// An entity that knows where it is stored.
///
/// Replaces any kind of runtime table discovery: each entity names its
/// table and computes its own storage id.
pub trait Persisted: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Logical table holding entities of this type.
    fn table_name() -> &'static str;

    /// Storage id of this entity within its table.
    fn id(&self) -> String;
}

/// Reject table and set names that could not be used as SQL identifiers.
pub(crate) fn validate_name(name: &str) -> StoreResult<()> {
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_lowercase() || b == b'_') {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}
