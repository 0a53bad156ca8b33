//! Persisted row shapes.

use std::collections::BTreeMap;

use canopy_store::Persisted;
use canopy_types::{LeafResource, ParentResource, Resource, ResourceId, Scope};
use serde::{Deserialize, Serialize};

/// What kind of node a [`ResourceEntity`] stores, with leaf metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourcePayload {
    Leaf {
        resource_type: String,
        serialised_format: String,
        connection_detail: String,
        attributes: BTreeMap<String, String>,
    },
    Parent,
}

/// One resource row. The parent is referenced by id only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntity {
    pub id: ResourceId,
    pub parent_id: Option<ResourceId>,
    pub payload: ResourcePayload,
}

impl ResourceEntity {
    pub fn from_leaf(leaf: &LeafResource) -> Self {
        Self {
            id: leaf.id.clone(),
            parent_id: leaf.parent_id().cloned(),
            payload: ResourcePayload::Leaf {
                resource_type: leaf.resource_type.clone(),
                serialised_format: leaf.serialised_format.clone(),
                connection_detail: leaf.connection_detail.clone(),
                attributes: leaf.attributes.clone(),
            },
        }
    }

    pub fn from_parent(parent: &ParentResource) -> Self {
        Self {
            id: parent.id.clone(),
            parent_id: parent.parent_id.clone(),
            payload: ResourcePayload::Parent,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.payload, ResourcePayload::Leaf { .. })
    }

    pub fn resource_type(&self) -> Option<&str> {
        match &self.payload {
            ResourcePayload::Leaf { resource_type, .. } => Some(resource_type),
            ResourcePayload::Parent => None,
        }
    }

    pub fn serialised_format(&self) -> Option<&str> {
        match &self.payload {
            ResourcePayload::Leaf {
                serialised_format, ..
            } => Some(serialised_format),
            ResourcePayload::Parent => None,
        }
    }

    /// Materialise the stored node. Leaves come back unresolved: they carry
    /// their parent id but no ancestry.
    pub fn to_resource(&self) -> Resource {
        match &self.payload {
            ResourcePayload::Leaf {
                resource_type,
                serialised_format,
                connection_detail,
                attributes,
            } => {
                let mut leaf =
                    LeafResource::new(self.id.clone(), resource_type, serialised_format)
                        .with_connection_detail(connection_detail.clone());
                leaf.attributes = attributes.clone();
                if let Some(parent_id) = &self.parent_id {
                    leaf = leaf.with_parent_id(parent_id.clone());
                }
                Resource::Leaf(leaf)
            }
            ResourcePayload::Parent => Resource::Parent(ParentResource::new(
                self.id.clone(),
                self.parent_id.clone(),
            )),
        }
    }
}

impl Persisted for ResourceEntity {
    fn table_name() -> &'static str {
        "resources"
    }

    fn id(&self) -> String {
        self.id.to_string()
    }
}

/// Presence of this row asserts the store is authoritative for
/// `(scope, key)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessMark {
    pub scope: Scope,
    pub key: String,
}

impl CompletenessMark {
    pub fn new(scope: Scope, key: impl Into<String>) -> Self {
        Self {
            scope,
            key: key.into(),
        }
    }

    /// Storage id for a mark. The scope label never contains `:`, so the
    /// first `:` always separates scope from key.
    pub fn storage_id(scope: Scope, key: &str) -> String {
        format!("{scope}:{key}")
    }
}

impl Persisted for CompletenessMark {
    fn table_name() -> &'static str {
        "completeness"
    }

    fn id(&self) -> String {
        Self::storage_id(self.scope, &self.key)
    }
}
