//! The persistence layer: completeness-aware reads and write-through
//! ingestion.
//!
//! # Reads
//!
//! A read consults the [`CompletenessLedger`] first. Without a mark the
//! answer is `Ok(None)` (a miss) and the caller must go upstream; with a
//! mark the stored data is authoritative and is streamed lazily.
//!
//! # Write-through
//!
//! The `with_persistence_*` operations wrap an upstream leaf stream. Each
//! leaf is persisted as it passes through and is then forwarded unchanged.
//! Completeness marks for the scope as a whole are written only once the
//! upstream stream ends without error, after every row they cover. A
//! stream that is dropped early, fails, or is cut short by a crash leaves
//! no mark behind, so the next read is a miss and re-ingests.
//!
//! Marks are stamped with the instant the operation began. On an expiring
//! store they therefore lapse before any row the operation wrote.
//!
//! A completed subtree ingestion is the whole answer for its root: stored
//! nodes under the root that upstream did not list are deleted before the
//! root is marked. A completed type or format ingestion likewise drops
//! index entries it did not see.
//!
//! # Tree rules
//!
//! - A node is complete once all of its descendants are persisted.
//! - Ancestors written on the way up are persisted without a mark, and the
//!   walk stops at the first ancestor that is already complete and stored.
//! - Every saved node is filed under its parent in the children index.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use canopy_store::{BackingStore, EntityRepository};
use canopy_types::{LeafResource, ParentResource, Resource, ResourceId, Scope};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::entity::ResourceEntity;
use crate::error::{CatalogError, CatalogResult};
use crate::indices::{IndexKind, LeafIndex, SecondaryIndices};
use crate::ledger::CompletenessLedger;
use crate::tree::TreeResolver;
use crate::LeafStream;

/// What an in-flight ingestion is building.
enum Plan {
    /// Everything under `root`.
    Subtree {
        root: ResourceId,
        root_captured: bool,
        /// Nodes between the leaves and `root` seen so far.
        containers: BTreeSet<ResourceId>,
        leaves: BTreeSet<ResourceId>,
    },
    /// Every leaf with a given type or format.
    Indexed {
        index: LeafIndex,
        key: String,
        listed: BTreeSet<ResourceId>,
    },
}

/// Where a leaf meets the ingestion root.
enum Reach {
    Itself,
    /// `ancestry[pos]` is the root.
    Ancestor(usize),
    /// The leaf names the root as its parent but carries no ancestry.
    Parent,
}

struct Ingest<'a> {
    plan: Plan,
    upstream: LeafStream<'a>,
    started: Instant,
    forwarded: usize,
    upstream_failed: bool,
    finished: bool,
}

/// Completeness-aware persistence over any [`BackingStore`].
pub struct PersistenceLayer<S: ?Sized> {
    repo: EntityRepository<S>,
    ledger: CompletenessLedger<S>,
    indices: SecondaryIndices<S>,
    tree: TreeResolver<S>,
}

impl<S: ?Sized> Clone for PersistenceLayer<S> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            ledger: self.ledger.clone(),
            indices: self.indices.clone(),
            tree: self.tree.clone(),
        }
    }
}

impl<S: BackingStore + ?Sized> PersistenceLayer<S> {
    pub fn new(store: Arc<S>) -> Self {
        let repo = EntityRepository::new(store);
        let indices = SecondaryIndices::new(repo.clone());
        Self {
            ledger: CompletenessLedger::new(repo.clone()),
            tree: TreeResolver::new(repo.clone(), indices.clone()),
            indices,
            repo,
        }
    }

    pub fn ledger(&self) -> &CompletenessLedger<S> {
        &self.ledger
    }

    pub fn indices(&self) -> &SecondaryIndices<S> {
        &self.indices
    }

    pub fn tree(&self) -> &TreeResolver<S> {
        &self.tree
    }

    pub fn store(&self) -> &S {
        self.repo.store()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Every leaf at or below `id`, or `None` if the store is not
    /// authoritative for it.
    ///
    /// A marked id with no row means upstream reported nothing there, and
    /// yields an empty stream.
    pub async fn get_resources_by_id(
        &self,
        id: &ResourceId,
    ) -> CatalogResult<Option<LeafStream<'_>>> {
        if !self.ledger.is_complete(Scope::Resource, id.as_str()).await? {
            debug!(%id, "resource not complete; miss");
            return Ok(None);
        }
        match self.tree.entity(id).await? {
            Some(entity) => Ok(Some(self.tree.collect_leaves(entity.to_resource()))),
            None => Ok(Some(stream::empty().boxed())),
        }
    }

    pub async fn get_resources_by_type(
        &self,
        resource_type: &str,
    ) -> CatalogResult<Option<LeafStream<'_>>> {
        self.get_indexed(LeafIndex::Type, resource_type).await
    }

    pub async fn get_resources_by_serialised_format(
        &self,
        serialised_format: &str,
    ) -> CatalogResult<Option<LeafStream<'_>>> {
        self.get_indexed(LeafIndex::Format, serialised_format).await
    }

    async fn get_indexed(
        &self,
        index: LeafIndex,
        key: &str,
    ) -> CatalogResult<Option<LeafStream<'_>>> {
        let scope = index.scope();
        if !self.ledger.is_complete(scope, key).await? {
            debug!(%scope, key, "index not complete; miss");
            return Ok(None);
        }
        let ids = self.indices.ids(index.kind(), key).await?;
        let leaves = stream::iter(ids)
            .then(move |id| async move { self.indexed_leaf(&id).await })
            .boxed();
        Ok(Some(leaves))
    }

    async fn indexed_leaf(&self, id: &ResourceId) -> CatalogResult<LeafResource> {
        let entity = self
            .tree
            .entity(id)
            .await?
            .ok_or_else(|| CatalogError::violation(id, "indexed but has no row"))?;
        match entity.to_resource() {
            Resource::Leaf(leaf) => self.tree.resolve_parents(leaf).await,
            Resource::Parent(_) => Err(CatalogError::violation(id, "indexed row is not a leaf")),
        }
    }

    // ------------------------------------------------------------------
    // Write-through
    // ------------------------------------------------------------------

    /// Persist, and forward, every leaf of an upstream listing of the
    /// subtree under `root`.
    ///
    /// Each leaf must reach `root`: by being `root`, through its ancestry,
    /// or by naming `root` as its parent. A leaf that does not fails the
    /// stream with [`CatalogError::OutsideRoot`].
    pub fn with_persistence_by_id<'a>(
        &'a self,
        root: ResourceId,
        upstream: LeafStream<'a>,
    ) -> LeafStream<'a> {
        info!(%root, "ingesting subtree");
        self.tee(Ingest::new(
            Plan::Subtree {
                root,
                root_captured: false,
                containers: BTreeSet::new(),
                leaves: BTreeSet::new(),
            },
            upstream,
        ))
    }

    pub fn with_persistence_by_type<'a>(
        &'a self,
        resource_type: &str,
        upstream: LeafStream<'a>,
    ) -> LeafStream<'a> {
        info!(resource_type, "ingesting type");
        self.tee(Ingest::new(
            Plan::indexed(LeafIndex::Type, resource_type),
            upstream,
        ))
    }

    pub fn with_persistence_by_serialised_format<'a>(
        &'a self,
        serialised_format: &str,
        upstream: LeafStream<'a>,
    ) -> LeafStream<'a> {
        info!(serialised_format, "ingesting format");
        self.tee(Ingest::new(
            Plan::indexed(LeafIndex::Format, serialised_format),
            upstream,
        ))
    }

    /// Drive `ingest`: persist each upstream item before yielding it, and
    /// record completeness once upstream is exhausted cleanly.
    fn tee<'a>(&'a self, ingest: Ingest<'a>) -> LeafStream<'a> {
        stream::unfold(ingest, move |mut ingest| async move {
            if ingest.finished {
                return None;
            }
            match ingest.upstream.next().await {
                Some(Ok(leaf)) => {
                    let stored = self
                        .ingest_leaf(&mut ingest.plan, &leaf, ingest.started)
                        .await;
                    match stored {
                        Ok(()) => {
                            ingest.forwarded += 1;
                            Some((Ok(leaf), ingest))
                        }
                        Err(e) => {
                            warn!(leaf = %leaf.id, error = %e, "ingestion aborted");
                            ingest.finished = true;
                            Some((Err(e), ingest))
                        }
                    }
                }
                Some(Err(e)) => {
                    ingest.upstream_failed = true;
                    Some((Err(e), ingest))
                }
                None => {
                    ingest.finished = true;
                    if ingest.upstream_failed {
                        warn!("upstream reported errors; completeness not recorded");
                        return None;
                    }
                    let marked = self
                        .complete(&ingest.plan, ingest.forwarded, ingest.started)
                        .await;
                    match marked {
                        Ok(()) => None,
                        Err(e) => Some((Err(e), ingest)),
                    }
                }
            }
        })
        .boxed()
    }

    async fn ingest_leaf(
        &self,
        plan: &mut Plan,
        leaf: &LeafResource,
        started: Instant,
    ) -> CatalogResult<()> {
        match plan {
            Plan::Subtree {
                root,
                root_captured,
                containers,
                leaves,
            } => {
                self.ingest_under_root(root, root_captured, containers, leaf, started)
                    .await?;
                leaves.insert(leaf.id.clone());
                Ok(())
            }
            Plan::Indexed { index, key, listed } => {
                self.ingest_indexed(*index, key, leaf, started).await?;
                listed.insert(leaf.id.clone());
                Ok(())
            }
        }
    }

    async fn ingest_under_root(
        &self,
        root: &ResourceId,
        root_captured: &mut bool,
        containers: &mut BTreeSet<ResourceId>,
        leaf: &LeafResource,
        started: Instant,
    ) -> CatalogResult<()> {
        let ancestors = leaf.ancestry().as_slice();
        let reach = if &leaf.id == root {
            Reach::Itself
        } else if let Some(pos) = leaf.ancestry().position(root) {
            Reach::Ancestor(pos)
        } else if leaf.parent_id() == Some(root) {
            Reach::Parent
        } else {
            return Err(CatalogError::OutsideRoot {
                leaf: leaf.id.clone(),
                root: root.clone(),
            });
        };

        self.save(ResourceEntity::from_leaf(leaf)).await?;
        self.ledger
            .mark_complete_as_of(Scope::Resource, leaf.id.as_str(), started)
            .await?;

        if let Reach::Ancestor(pos) = reach {
            for parent in &ancestors[..pos] {
                self.save(ResourceEntity::from_parent(parent)).await?;
                containers.insert(parent.id.clone());
            }
        }

        if !*root_captured {
            *root_captured = true;
            match reach {
                Reach::Itself => self.persist_incomplete(ancestors).await?,
                Reach::Ancestor(pos) => {
                    self.save(ResourceEntity::from_parent(&ancestors[pos])).await?;
                    self.persist_incomplete(&ancestors[pos + 1..]).await?;
                }
                // Nothing is known above the root: rewrite whatever row it
                // has, or start it bare.
                Reach::Parent => {
                    let row = match self.tree.entity(root).await? {
                        Some(existing) => existing,
                        None => ResourceEntity::from_parent(&ParentResource::root(root.clone())),
                    };
                    self.save(row).await?;
                }
            }
        }
        debug!(leaf = %leaf.id, %root, "persisted leaf");
        Ok(())
    }

    async fn ingest_indexed(
        &self,
        index: LeafIndex,
        key: &str,
        leaf: &LeafResource,
        started: Instant,
    ) -> CatalogResult<()> {
        self.save(ResourceEntity::from_leaf(leaf)).await?;
        self.ledger
            .mark_complete_as_of(Scope::Resource, leaf.id.as_str(), started)
            .await?;
        self.persist_incomplete(leaf.ancestry().as_slice()).await?;
        self.indices.insert(index.kind(), key, &leaf.id).await?;
        debug!(leaf = %leaf.id, scope = %index.scope(), key, "persisted leaf");
        Ok(())
    }

    /// Upstream ended cleanly: every row the plan covers is stored.
    async fn complete(&self, plan: &Plan, forwarded: usize, started: Instant) -> CatalogResult<()> {
        match plan {
            Plan::Subtree {
                root,
                containers,
                leaves,
                ..
            } => {
                let pruned = self.prune_unlisted(root, containers, leaves).await?;
                for id in containers {
                    self.ledger
                        .mark_complete_as_of(Scope::Resource, id.as_str(), started)
                        .await?;
                }
                self.ledger
                    .mark_complete_as_of(Scope::Resource, root.as_str(), started)
                    .await?;
                info!(
                    %root,
                    leaves = forwarded,
                    containers = containers.len(),
                    pruned,
                    "subtree complete"
                );
            }
            Plan::Indexed { index, key, listed } => {
                let mut pruned = 0usize;
                for id in self.indices.ids(index.kind(), key).await? {
                    if !listed.contains(&id) {
                        self.indices.remove(index.kind(), key, &id).await?;
                        pruned += 1;
                    }
                }
                let scope = index.scope();
                self.ledger.mark_complete_as_of(scope, key, started).await?;
                info!(%scope, key = %key, leaves = forwarded, pruned, "index complete");
            }
        }
        Ok(())
    }

    /// Delete every stored child of `root` or of a listed container that
    /// this pass did not list, with everything below it.
    async fn prune_unlisted(
        &self,
        root: &ResourceId,
        containers: &BTreeSet<ResourceId>,
        leaves: &BTreeSet<ResourceId>,
    ) -> CatalogResult<usize> {
        let mut pruned = 0;
        for parent in std::iter::once(root).chain(containers) {
            for child in self.indices.children(parent).await? {
                if containers.contains(&child) || leaves.contains(&child) {
                    continue;
                }
                debug!(%child, %parent, "pruning node upstream no longer lists");
                self.delete_resource(&child).await?;
                // The row may be gone already, or may name another parent.
                self.indices
                    .remove(IndexKind::Children, parent.as_str(), &child)
                    .await?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    // ------------------------------------------------------------------
    // Incremental updates
    // ------------------------------------------------------------------

    /// Record one newly discovered leaf without re-ingesting its
    /// neighbourhood.
    ///
    /// The nearest ancestor that is already complete and stored bounds the
    /// update: the leaf and every node beneath that ancestor become
    /// complete, and nothing above it is read or written. Without such an
    /// ancestor only the leaf is complete and its ancestors are stored
    /// without a mark. The leaf is added to the type and format indices
    /// only where those are already complete.
    pub async fn add_resource(&self, leaf: &LeafResource) -> CatalogResult<()> {
        let started = Instant::now();
        let ancestors = leaf.ancestry().as_slice();
        let mut boundary = None;
        for (i, ancestor) in ancestors.iter().enumerate() {
            if self.is_complete_and_stored(&ancestor.id).await? {
                boundary = Some(i);
                break;
            }
        }

        // Without a boundary none of the ancestors is complete, so all of
        // them are written (unmarked).
        let below = boundary.map_or(ancestors, |i| &ancestors[..i]);
        self.save(ResourceEntity::from_leaf(leaf)).await?;
        for parent in below {
            self.save(ResourceEntity::from_parent(parent)).await?;
        }

        self.ledger
            .mark_complete_as_of(Scope::Resource, leaf.id.as_str(), started)
            .await?;
        if boundary.is_some() {
            for parent in below {
                self.ledger
                    .mark_complete_as_of(Scope::Resource, parent.id.as_str(), started)
                    .await?;
            }
        }

        if self
            .ledger
            .is_complete(Scope::Type, &leaf.resource_type)
            .await?
        {
            self.indices
                .insert(IndexKind::Type, &leaf.resource_type, &leaf.id)
                .await?;
        }
        if self
            .ledger
            .is_complete(Scope::Format, &leaf.serialised_format)
            .await?
        {
            self.indices
                .insert(IndexKind::Format, &leaf.serialised_format, &leaf.id)
                .await?;
        }

        match boundary {
            Some(i) => info!(leaf = %leaf.id, under = %ancestors[i].id, "added resource"),
            None => info!(leaf = %leaf.id, "added resource with no complete ancestor"),
        }
        Ok(())
    }

    /// Remove `id` and everything below it, with their marks and index
    /// entries. Returns `false` if `id` has no row.
    ///
    /// Type and format marks are left in place: the remaining index
    /// members are still the full answer for those keys.
    pub async fn delete_resource(&self, id: &ResourceId) -> CatalogResult<bool> {
        let Some(top) = self.tree.entity(id).await? else {
            return Ok(false);
        };

        let mut removed = 0usize;
        let mut visited = BTreeSet::new();
        let mut stack = vec![top];
        while let Some(entity) = stack.pop() {
            if !visited.insert(entity.id.clone()) {
                continue;
            }
            for child in self.indices.children(&entity.id).await? {
                if let Some(child) = self.tree.entity(&child).await? {
                    stack.push(child);
                }
            }

            self.ledger.clear(Scope::Resource, entity.id.as_str()).await?;
            if let Some(resource_type) = entity.resource_type() {
                self.indices
                    .remove(IndexKind::Type, resource_type, &entity.id)
                    .await?;
            }
            if let Some(serialised_format) = entity.serialised_format() {
                self.indices
                    .remove(IndexKind::Format, serialised_format, &entity.id)
                    .await?;
            }
            self.indices
                .clear(IndexKind::Children, entity.id.as_str())
                .await?;
            if let Some(parent_id) = &entity.parent_id {
                self.indices
                    .remove(IndexKind::Children, parent_id.as_str(), &entity.id)
                    .await?;
            }
            self.repo.remove::<ResourceEntity>(entity.id.as_str()).await?;
            removed += 1;
        }

        info!(%id, removed, "deleted resource subtree");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Write a row and file it under its parent.
    async fn save(&self, entity: ResourceEntity) -> CatalogResult<()> {
        self.repo.save(&entity).await?;
        if let Some(parent_id) = &entity.parent_id {
            self.indices
                .insert(IndexKind::Children, parent_id.as_str(), &entity.id)
                .await?;
        }
        Ok(())
    }

    async fn is_complete_and_stored(&self, id: &ResourceId) -> CatalogResult<bool> {
        Ok(self.ledger.is_complete(Scope::Resource, id.as_str()).await?
            && self.repo.contains::<ResourceEntity>(id.as_str()).await?)
    }

    /// Store `ancestors` (nearest first) without marks, stopping at the
    /// first one that is already complete and stored.
    async fn persist_incomplete(&self, ancestors: &[ParentResource]) -> CatalogResult<()> {
        for ancestor in ancestors {
            if self.is_complete_and_stored(&ancestor.id).await? {
                debug!(ancestor = %ancestor.id, "reached complete ancestor");
                break;
            }
            self.save(ResourceEntity::from_parent(ancestor)).await?;
        }
        Ok(())
    }
}

impl Plan {
    fn indexed(index: LeafIndex, key: &str) -> Self {
        Self::Indexed {
            index,
            key: key.to_string(),
            listed: BTreeSet::new(),
        }
    }
}

impl<'a> Ingest<'a> {
    fn new(plan: Plan, upstream: LeafStream<'a>) -> Self {
        Self {
            plan,
            upstream,
            started: Instant::now(),
            forwarded: 0,
            upstream_failed: false,
            finished: false,
        }
    }
}

impl<S: BackingStore + ?Sized> std::fmt::Debug for PersistenceLayer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceLayer")
            .field("backend", &self.store().backend_name())
            .finish()
    }
}
