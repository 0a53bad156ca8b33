//! Resource tree nodes and resolved ancestor chains.
//!
//! Nodes refer to their parent by [`ResourceId`] only. A leaf that has been
//! resolved against the catalog additionally carries an [`Ancestry`]: an
//! immutable, validated chain of [`ParentResource`]s ordered nearest-first.
//! Because the chain is a plain vector checked on construction, there is no
//! object graph to alias and no way to build a cycle.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::ResourceId;

/// A container node in the resource tree (a directory, a system, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentResource {
    pub id: ResourceId,
    /// `None` for the root of the tree.
    pub parent_id: Option<ResourceId>,
}

impl ParentResource {
    pub fn new(id: ResourceId, parent_id: Option<ResourceId>) -> Self {
        Self { id, parent_id }
    }

    /// A parent resource with no parent of its own.
    pub fn root(id: ResourceId) -> Self {
        Self::new(id, None)
    }
}

/// Resolved ancestors of a resource, nearest parent first.
///
/// Invariants, checked by [`Ancestry::new`]:
/// - `chain[i].parent_id == Some(chain[i + 1].id)` for every adjacent pair;
/// - no id appears twice.
///
/// The last element's own `parent_id` is unconstrained: a chain may be
/// resolved only up to some boundary and stop there.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ParentResource>", into = "Vec<ParentResource>")]
pub struct Ancestry(Vec<ParentResource>);

impl Ancestry {
    /// Validate and wrap a nearest-first chain.
    pub fn new(chain: Vec<ParentResource>) -> Result<Self, TypeError> {
        let mut seen = HashSet::with_capacity(chain.len());
        for (i, node) in chain.iter().enumerate() {
            if !seen.insert(&node.id) {
                return Err(TypeError::Cycle(node.id.clone()));
            }
            if let Some(next) = chain.get(i + 1) {
                if node.parent_id.as_ref() != Some(&next.id) {
                    return Err(TypeError::BrokenLink {
                        child: node.id.clone(),
                        next: next.id.clone(),
                    });
                }
            }
        }
        Ok(Self(chain))
    }

    /// An empty (unresolved) chain.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build a complete chain from ids ordered nearest-first. The final id
    /// is treated as the tree root.
    pub fn from_ids<I, T>(ids: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = T>,
        T: TryInto<ResourceId, Error = TypeError>,
    {
        let ids = ids
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<ResourceId>, _>>()?;
        let chain = ids
            .iter()
            .enumerate()
            .map(|(i, id)| ParentResource::new(id.clone(), ids.get(i + 1).cloned()))
            .collect();
        Self::new(chain)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The nearest ancestor (the direct parent).
    pub fn nearest(&self) -> Option<&ParentResource> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParentResource> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[ParentResource] {
        &self.0
    }

    /// Position of `id` in the chain (0 = direct parent).
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.0.iter().position(|p| &p.id == id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.position(id).is_some()
    }

    pub fn into_vec(self) -> Vec<ParentResource> {
        self.0
    }
}

impl TryFrom<Vec<ParentResource>> for Ancestry {
    type Error = TypeError;

    fn try_from(chain: Vec<ParentResource>) -> Result<Self, Self::Error> {
        Self::new(chain)
    }
}

impl From<Ancestry> for Vec<ParentResource> {
    fn from(ancestry: Ancestry) -> Self {
        ancestry.0
    }
}

impl<'a> IntoIterator for &'a Ancestry {
    type Item = &'a ParentResource;
    type IntoIter = std::slice::Iter<'a, ParentResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A terminal, individually readable unit of protected data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLeaf")]
pub struct LeafResource {
    pub id: ResourceId,
    parent_id: Option<ResourceId>,
    pub resource_type: String,
    pub serialised_format: String,
    /// Where the data service can read this resource from.
    pub connection_detail: String,
    pub attributes: BTreeMap<String, String>,
    ancestry: Ancestry,
}

impl LeafResource {
    /// A leaf with no parent and no resolved ancestry.
    pub fn new(
        id: ResourceId,
        resource_type: impl Into<String>,
        serialised_format: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id: None,
            resource_type: resource_type.into(),
            serialised_format: serialised_format.into(),
            connection_detail: String::new(),
            attributes: BTreeMap::new(),
            ancestry: Ancestry::empty(),
        }
    }

    /// Set the parent id, discarding any resolved ancestry.
    pub fn with_parent_id(mut self, parent_id: ResourceId) -> Self {
        self.parent_id = Some(parent_id);
        self.ancestry = Ancestry::empty();
        self
    }

    /// Attach a resolved ancestor chain. A non-empty chain also fixes the
    /// parent id to the chain's nearest element.
    pub fn with_ancestry(mut self, ancestry: Ancestry) -> Result<Self, TypeError> {
        if ancestry.contains(&self.id) {
            return Err(TypeError::Cycle(self.id));
        }
        if let Some(nearest) = ancestry.nearest() {
            self.parent_id = Some(nearest.id.clone());
        }
        self.ancestry = ancestry;
        Ok(self)
    }

    pub fn with_connection_detail(mut self, detail: impl Into<String>) -> Self {
        self.connection_detail = detail.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn parent_id(&self) -> Option<&ResourceId> {
        self.parent_id.as_ref()
    }

    pub fn ancestry(&self) -> &Ancestry {
        &self.ancestry
    }
}

/// Wire shape of [`LeafResource`], validated on the way in.
#[derive(Deserialize)]
struct RawLeaf {
    id: ResourceId,
    #[serde(default)]
    parent_id: Option<ResourceId>,
    resource_type: String,
    serialised_format: String,
    #[serde(default)]
    connection_detail: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    ancestry: Ancestry,
}

impl TryFrom<RawLeaf> for LeafResource {
    type Error = TypeError;

    fn try_from(raw: RawLeaf) -> Result<Self, Self::Error> {
        if let (Some(parent_id), Some(nearest)) = (&raw.parent_id, raw.ancestry.nearest()) {
            if parent_id != &nearest.id {
                return Err(TypeError::BrokenLink {
                    child: raw.id,
                    next: nearest.id.clone(),
                });
            }
        }
        let mut leaf = LeafResource {
            id: raw.id,
            parent_id: raw.parent_id,
            resource_type: raw.resource_type,
            serialised_format: raw.serialised_format,
            connection_detail: raw.connection_detail,
            attributes: raw.attributes,
            ancestry: Ancestry::empty(),
        };
        leaf = leaf.with_ancestry(raw.ancestry)?;
        Ok(leaf)
    }
}

/// Any node in the resource tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    Leaf(LeafResource),
    Parent(ParentResource),
}

impl Resource {
    pub fn id(&self) -> &ResourceId {
        match self {
            Self::Leaf(leaf) => &leaf.id,
            Self::Parent(parent) => &parent.id,
        }
    }

    pub fn parent_id(&self) -> Option<&ResourceId> {
        match self {
            Self::Leaf(leaf) => leaf.parent_id(),
            Self::Parent(parent) => parent.parent_id.as_ref(),
        }
    }
}

impl From<LeafResource> for Resource {
    fn from(leaf: LeafResource) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<ParentResource> for Resource {
    fn from(parent: ParentResource) -> Self {
        Self::Parent(parent)
    }
}
