use std::sync::Arc;
use std::time::Instant;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BackingStore, Persisted};

/// Typed access to [`Persisted`] entities over any [`BackingStore`].
///
/// Bodies are encoded as JSON so that both engines hold the same,
/// human-inspectable representation.
pub struct EntityRepository<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for EntityRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: BackingStore + ?Sized> EntityRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying engine, for set primitives.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn load<E: Persisted>(&self, id: &str) -> StoreResult<Option<E>> {
        let Some(body) = self.store.get(E::table_name(), id).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| StoreError::Serialization {
                table: E::table_name().to_string(),
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    pub async fn save<E: Persisted>(&self, entity: &E) -> StoreResult<()> {
        let (id, body) = Self::encode(entity)?;
        self.store.put(E::table_name(), &id, body).await
    }

    /// Save with any expiry counted from `written_at`; see
    /// [`BackingStore::put_as_of`].
    pub async fn save_as_of<E: Persisted>(&self, entity: &E, written_at: Instant) -> StoreResult<()> {
        let (id, body) = Self::encode(entity)?;
        self.store
            .put_as_of(E::table_name(), &id, body, written_at)
            .await
    }

    fn encode<E: Persisted>(entity: &E) -> StoreResult<(String, Vec<u8>)> {
        let id = entity.id();
        let body = serde_json::to_vec(entity).map_err(|e| StoreError::Serialization {
            table: E::table_name().to_string(),
            id: id.clone(),
            reason: e.to_string(),
        })?;
        Ok((id, body))
    }

    pub async fn remove<E: Persisted>(&self, id: &str) -> StoreResult<bool> {
        self.store.delete(E::table_name(), id).await
    }

    pub async fn contains<E: Persisted>(&self, id: &str) -> StoreResult<bool> {
        self.store.exists(E::table_name(), id).await
    }
}

impl<S: BackingStore + ?Sized> std::fmt::Debug for EntityRepository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRepository")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}
