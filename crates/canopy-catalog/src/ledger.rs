//! The completeness ledger: which scopes the store is authoritative for.

use std::time::Instant;

use canopy_store::{BackingStore, EntityRepository};
use canopy_types::Scope;
use tracing::debug;

use crate::entity::CompletenessMark;
use crate::error::CatalogResult;

/// Records and answers "is the store authoritative for `(scope, key)`?".
///
/// Marks are write-once in normal operation. The only removal path is an
/// explicit delete of the data they cover.
pub struct CompletenessLedger<S: ?Sized> {
    repo: EntityRepository<S>,
}

impl<S: ?Sized> Clone for CompletenessLedger<S> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
        }
    }
}

impl<S: BackingStore + ?Sized> CompletenessLedger<S> {
    pub fn new(repo: EntityRepository<S>) -> Self {
        Self { repo }
    }

    pub async fn is_complete(&self, scope: Scope, key: &str) -> CatalogResult<bool> {
        let id = CompletenessMark::storage_id(scope, key);
        Ok(self.repo.contains::<CompletenessMark>(&id).await?)
    }

    /// Idempotent.
    pub async fn mark_complete(&self, scope: Scope, key: &str) -> CatalogResult<()> {
        self.mark_complete_as_of(scope, key, Instant::now()).await
    }

    /// Mark complete on behalf of work that began at `since`. On an
    /// expiring store the mark lapses no later than any row written after
    /// `since`.
    pub async fn mark_complete_as_of(
        &self,
        scope: Scope,
        key: &str,
        since: Instant,
    ) -> CatalogResult<()> {
        self.repo
            .save_as_of(&CompletenessMark::new(scope, key), since)
            .await?;
        debug!(%scope, key, "marked complete");
        Ok(())
    }

    pub(crate) async fn clear(&self, scope: Scope, key: &str) -> CatalogResult<bool> {
        let id = CompletenessMark::storage_id(scope, key);
        let removed = self.repo.remove::<CompletenessMark>(&id).await?;
        if removed {
            debug!(%scope, key, "cleared completeness mark");
        }
        Ok(removed)
    }
}
