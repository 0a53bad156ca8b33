//! Rebuilding resource trees from flat rows.
//!
//! Rows reference their parent by id only. [`TreeResolver`] walks those
//! references upward to attach an [`Ancestry`] to a leaf, and walks the
//! children index downward to enumerate every leaf under a node.

use std::collections::HashSet;

use canopy_store::{BackingStore, EntityRepository};
use canopy_types::{Ancestry, LeafResource, ParentResource, Resource, ResourceId};
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::entity::ResourceEntity;
use crate::error::{CatalogError, CatalogResult};
use crate::indices::SecondaryIndices;
use crate::LeafStream;

pub struct TreeResolver<S: ?Sized> {
    repo: EntityRepository<S>,
    indices: SecondaryIndices<S>,
}

impl<S: ?Sized> Clone for TreeResolver<S> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            indices: self.indices.clone(),
        }
    }
}

/// Traversal state for [`TreeResolver::collect_leaves`].
enum Walk {
    Start(Resource),
    Descending {
        /// The traversal root followed by its own ancestors.
        boundary: Ancestry,
        /// Ids still to visit; the next one is at the end.
        pending: Vec<ResourceId>,
        visited: HashSet<ResourceId>,
    },
    Done,
}

impl<S: BackingStore + ?Sized> TreeResolver<S> {
    pub fn new(repo: EntityRepository<S>, indices: SecondaryIndices<S>) -> Self {
        Self { repo, indices }
    }

    pub async fn entity(&self, id: &ResourceId) -> CatalogResult<Option<ResourceEntity>> {
        Ok(self.repo.load::<ResourceEntity>(id.as_str()).await?)
    }

    /// Load `id` for use as an ancestor. A leaf row in that position is
    /// corruption.
    async fn parent(&self, id: &ResourceId) -> CatalogResult<Option<ParentResource>> {
        match self.entity(id).await? {
            None => Ok(None),
            Some(entity) if entity.is_leaf() => Err(CatalogError::violation(
                id,
                "leaf row referenced as a parent",
            )),
            Some(entity) => Ok(Some(ParentResource::new(entity.id, entity.parent_id))),
        }
    }

    /// Follow parent references from `start` until the tree ends or a
    /// parent row is missing. `origin` is the node the walk begins under
    /// and must never reappear.
    pub async fn resolve_ancestry(
        &self,
        origin: &ResourceId,
        start: Option<&ResourceId>,
    ) -> CatalogResult<Ancestry> {
        let mut chain: Vec<ParentResource> = Vec::new();
        let mut next = start.cloned();
        while let Some(id) = next {
            if &id == origin || chain.iter().any(|p| p.id == id) {
                return Err(CatalogError::violation(&id, "parent references form a cycle"));
            }
            match self.parent(&id).await? {
                Some(parent) => {
                    next = parent.parent_id.clone();
                    chain.push(parent);
                }
                None => break,
            }
        }
        Ancestry::new(chain).map_err(|e| CatalogError::violation(origin, e.to_string()))
    }

    /// Attach the full persisted ancestry to `leaf`.
    pub async fn resolve_parents(&self, leaf: LeafResource) -> CatalogResult<LeafResource> {
        let ancestry = self.resolve_ancestry(&leaf.id, leaf.parent_id()).await?;
        Ok(leaf.with_ancestry(ancestry)?)
    }

    /// Attach ancestry to `leaf`, walking only as far as the nearest element
    /// of `boundary` and reusing `boundary` from there up. Every row between
    /// the leaf and the boundary must exist.
    pub async fn resolve_parents_up_to(
        &self,
        leaf: LeafResource,
        boundary: &Ancestry,
    ) -> CatalogResult<LeafResource> {
        let Some(top) = boundary.nearest() else {
            return self.resolve_parents(leaf).await;
        };

        let mut chain: Vec<ParentResource> = Vec::new();
        let mut next = leaf.parent_id().cloned();
        loop {
            let Some(id) = next else {
                return Err(CatalogError::violation(
                    &leaf.id,
                    format!("ancestry ends before reaching {}", top.id),
                ));
            };
            if id == top.id {
                chain.extend(boundary.iter().cloned());
                break;
            }
            if id == leaf.id || chain.iter().any(|p| p.id == id) {
                return Err(CatalogError::violation(&id, "parent references form a cycle"));
            }
            let parent = self.parent(&id).await?.ok_or_else(|| {
                CatalogError::violation(&id, format!("missing row below complete node {}", top.id))
            })?;
            next = parent.parent_id.clone();
            chain.push(parent);
        }

        let ancestry =
            Ancestry::new(chain).map_err(|e| CatalogError::violation(&leaf.id, e.to_string()))?;
        Ok(leaf.with_ancestry(ancestry)?)
    }

    /// Lazily enumerate every leaf at or below `resource`, depth first in
    /// sorted child order, each with its ancestry resolved.
    ///
    /// The stream borrows the resolver; rows are read only as it is polled.
    pub fn collect_leaves(&self, resource: Resource) -> LeafStream<'_> {
        stream::try_unfold(Walk::Start(resource), move |state| async move {
            self.advance(state).await
        })
        .boxed()
    }

    async fn advance(&self, mut state: Walk) -> CatalogResult<Option<(LeafResource, Walk)>> {
        loop {
            state = match state {
                Walk::Done => return Ok(None),
                Walk::Start(Resource::Leaf(leaf)) => {
                    let leaf = self.resolve_parents(leaf).await?;
                    return Ok(Some((leaf, Walk::Done)));
                }
                Walk::Start(Resource::Parent(root)) => {
                    let above = self
                        .resolve_ancestry(&root.id, root.parent_id.as_ref())
                        .await?;
                    let mut pending = self.indices.children(&root.id).await?;
                    pending.reverse();
                    let mut visited = HashSet::new();
                    visited.insert(root.id.clone());
                    debug!(root = %root.id, children = pending.len(), "descending");

                    let root_id = root.id.clone();
                    let mut chain = vec![root];
                    chain.extend(above.into_vec());
                    let boundary = Ancestry::new(chain)
                        .map_err(|e| CatalogError::violation(&root_id, e.to_string()))?;
                    Walk::Descending {
                        boundary,
                        pending,
                        visited,
                    }
                }
                Walk::Descending {
                    boundary,
                    mut pending,
                    mut visited,
                } => {
                    let Some(id) = pending.pop() else {
                        return Ok(None);
                    };
                    if !visited.insert(id.clone()) {
                        return Err(CatalogError::violation(&id, "child references form a cycle"));
                    }
                    let entity = self.entity(&id).await?.ok_or_else(|| {
                        CatalogError::violation(&id, "listed as a child but has no row")
                    })?;
                    match entity.to_resource() {
                        Resource::Leaf(leaf) => {
                            let leaf = self.resolve_parents_up_to(leaf, &boundary).await?;
                            return Ok(Some((
                                leaf,
                                Walk::Descending {
                                    boundary,
                                    pending,
                                    visited,
                                },
                            )));
                        }
                        Resource::Parent(parent) => {
                            let mut children = self.indices.children(&parent.id).await?;
                            children.reverse();
                            pending.extend(children);
                            Walk::Descending {
                                boundary,
                                pending,
                                visited,
                            }
                        }
                    }
                }
            };
        }
    }
}
