use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use canopy_catalog::{
    CatalogResult, IndexKind, LeafStream, PersistenceLayer, ResourceEntity,
};
use canopy_store::{BackingStore, ExpiringStore, SqliteStore};
use canopy_types::{Ancestry, LeafResource, ResourceId, Scope};
use futures::stream::{self, StreamExt, TryStreamExt};

pub fn rid(s: &str) -> ResourceId {
    ResourceId::new(s).unwrap()
}

/// Ancestor paths of a slash-separated id, nearest first, ending at `/`.
pub fn ancestors_of(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = path.to_string();
    while let Some(pos) = cur.rfind('/') {
        cur.truncate(pos);
        if cur.is_empty() {
            out.push("/".to_string());
            break;
        }
        out.push(cur.clone());
    }
    out
}

/// A leaf whose ancestry is derived from its path.
pub fn typed_leaf(path: &str, resource_type: &str, format: &str) -> LeafResource {
    let ancestry = Ancestry::from_ids(ancestors_of(path)).unwrap();
    LeafResource::new(rid(path), resource_type, format)
        .with_connection_detail(format!("file://{path}"))
        .with_ancestry(ancestry)
        .unwrap()
}

pub fn leaf(path: &str) -> LeafResource {
    typed_leaf(path, "csv", "avro")
}

/// `/d` holds two leaves directly and one under `/d/sub`; `/x` is a
/// sibling tree.
pub fn sample_tree() -> Vec<LeafResource> {
    vec![
        typed_leaf("/d/a", "csv", "avro"),
        typed_leaf("/d/b", "csv", "parquet"),
        typed_leaf("/d/sub/c", "json", "avro"),
        typed_leaf("/x/y", "csv", "avro"),
    ]
}

pub fn under(leaves: &[LeafResource], root: &str) -> Vec<LeafResource> {
    let root = rid(root);
    leaves
        .iter()
        .filter(|l| l.id == root || l.ancestry().contains(&root))
        .cloned()
        .collect()
}

pub fn upstream(leaves: Vec<LeafResource>) -> LeafStream<'static> {
    stream::iter(leaves.into_iter().map(Ok)).boxed()
}

/// Upstream that waits `pause` before every leaf after the first.
pub fn slow_upstream(leaves: Vec<LeafResource>, pause: Duration) -> LeafStream<'static> {
    stream::iter(leaves.into_iter().enumerate())
        .then(move |(i, leaf)| async move {
            if i > 0 {
                tokio::time::sleep(pause).await;
            }
            Ok(leaf)
        })
        .boxed()
}

/// Upstream that yields `leaves` and then fails.
pub fn failing_upstream(leaves: Vec<LeafResource>) -> LeafStream<'static> {
    stream::iter(
        leaves
            .into_iter()
            .map(Ok)
            .chain(std::iter::once(Err(canopy_catalog::CatalogError::Upstream(
                "connection reset".into(),
            )))),
    )
    .boxed()
}

pub async fn drain(stream: LeafStream<'_>) -> Vec<LeafResource> {
    stream.try_collect().await.unwrap()
}

pub async fn drain_results(stream: LeafStream<'_>) -> Vec<CatalogResult<LeafResource>> {
    stream.collect().await
}

pub fn ids(leaves: &[LeafResource]) -> Vec<String> {
    leaves.iter().map(|l| l.id.to_string()).collect()
}

pub fn sorted(mut leaves: Vec<LeafResource>) -> Vec<LeafResource> {
    leaves.sort_by(|a, b| a.id.cmp(&b.id));
    leaves
}

/// Every backend the catalog supports, freshly opened.
pub fn backends() -> Vec<(&'static str, Arc<dyn BackingStore>)> {
    vec![
        ("expiring", Arc::new(ExpiringStore::new()) as Arc<dyn BackingStore>),
        ("sqlite", Arc::new(SqliteStore::in_memory().unwrap()) as Arc<dyn BackingStore>),
    ]
}

pub fn memory_layer() -> PersistenceLayer<dyn BackingStore> {
    let store: Arc<dyn BackingStore> = Arc::new(ExpiringStore::new());
    PersistenceLayer::new(store)
}

/// Observable catalog state for the given ids and index keys.
#[derive(Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub rows: BTreeMap<String, Option<ResourceEntity>>,
    pub marks: BTreeMap<String, bool>,
    pub children: BTreeMap<String, Vec<ResourceId>>,
    pub indexed: BTreeMap<String, Vec<ResourceId>>,
}

pub async fn snapshot<S: BackingStore + ?Sized>(
    layer: &PersistenceLayer<S>,
    ids: &[String],
    types: &[&str],
    formats: &[&str],
) -> Snapshot {
    let mut snap = Snapshot {
        rows: BTreeMap::new(),
        marks: BTreeMap::new(),
        children: BTreeMap::new(),
        indexed: BTreeMap::new(),
    };
    for id in ids {
        let resource = rid(id);
        snap.rows
            .insert(id.clone(), layer.tree().entity(&resource).await.unwrap());
        snap.marks.insert(
            format!("RESOURCE:{id}"),
            layer.ledger().is_complete(Scope::Resource, id).await.unwrap(),
        );
        snap.children
            .insert(id.clone(), layer.indices().children(&resource).await.unwrap());
    }
    for (scope, kind, keys) in [
        (Scope::Type, IndexKind::Type, types),
        (Scope::Format, IndexKind::Format, formats),
    ] {
        for key in keys {
            snap.marks.insert(
                format!("{scope}:{key}"),
                layer.ledger().is_complete(scope, key).await.unwrap(),
            );
            snap.indexed.insert(
                format!("{scope}:{key}"),
                layer.indices().ids(kind, key).await.unwrap(),
            );
        }
    }
    snap
}

/// Every id a set of leaves mentions: the leaves and all of their ancestors.
pub fn all_ids(leaves: &[LeafResource]) -> Vec<String> {
    let mut ids: Vec<String> = leaves
        .iter()
        .flat_map(|l| {
            std::iter::once(l.id.to_string())
                .chain(l.ancestry().iter().map(|p| p.id.to_string()))
        })
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
