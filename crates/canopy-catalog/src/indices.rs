//! Secondary indices maintained alongside the resource table.
//!
//! Three multi-valued maps from a string key to resource ids:
//!
//! | Kind       | Set name       | Key                  |
//! |------------|----------------|----------------------|
//! | `Children` | `children`     | parent id            |
//! | `Type`     | `type_index`   | resource type        |
//! | `Format`   | `format_index` | serialised format    |
//!
//! Inserts are idempotent and lookups come back sorted, so traversal order
//! is stable across runs and backends.

use canopy_store::{BackingStore, EntityRepository};
use canopy_types::{ResourceId, Scope};

use crate::error::CatalogResult;

/// Which secondary index an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Children,
    Type,
    Format,
}

impl IndexKind {
    pub fn set_name(&self) -> &'static str {
        match self {
            Self::Children => "children",
            Self::Type => "type_index",
            Self::Format => "format_index",
        }
    }
}

/// The indices that answer whole-scope leaf queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LeafIndex {
    Type,
    Format,
}

impl LeafIndex {
    pub fn kind(&self) -> IndexKind {
        match self {
            Self::Type => IndexKind::Type,
            Self::Format => IndexKind::Format,
        }
    }

    /// The completeness scope this index is authoritative for.
    pub fn scope(&self) -> Scope {
        match self {
            Self::Type => Scope::Type,
            Self::Format => Scope::Format,
        }
    }
}

pub struct SecondaryIndices<S: ?Sized> {
    repo: EntityRepository<S>,
}

impl<S: ?Sized> Clone for SecondaryIndices<S> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
        }
    }
}

impl<S: BackingStore + ?Sized> SecondaryIndices<S> {
    pub fn new(repo: EntityRepository<S>) -> Self {
        Self { repo }
    }

    pub async fn insert(&self, kind: IndexKind, key: &str, id: &ResourceId) -> CatalogResult<()> {
        self.repo
            .store()
            .add_member(kind.set_name(), key, id.as_str())
            .await?;
        Ok(())
    }

    pub async fn remove(&self, kind: IndexKind, key: &str, id: &ResourceId) -> CatalogResult<bool> {
        Ok(self
            .repo
            .store()
            .remove_member(kind.set_name(), key, id.as_str())
            .await?)
    }

    /// Every id filed under `key`, sorted.
    pub async fn ids(&self, kind: IndexKind, key: &str) -> CatalogResult<Vec<ResourceId>> {
        let members = self.repo.store().members(kind.set_name(), key).await?;
        let ids = members
            .into_iter()
            .map(ResourceId::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub async fn children(&self, parent: &ResourceId) -> CatalogResult<Vec<ResourceId>> {
        self.ids(IndexKind::Children, parent.as_str()).await
    }

    pub(crate) async fn clear(&self, kind: IndexKind, key: &str) -> CatalogResult<usize> {
        Ok(self
            .repo
            .store()
            .clear_members(kind.set_name(), key)
            .await?)
    }
}
