//! Read-through caching in front of an upstream resource service.

use std::future::Future;

use async_trait::async_trait;
use canopy_store::BackingStore;
use canopy_types::{LeafResource, ResourceId};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::error::CatalogResult;
use crate::persistence::PersistenceLayer;
use crate::LeafStream;

/// The authoritative listing the catalog caches.
///
/// Leaves must come back with their ancestry resolved at least as far as
/// the queried root.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    async fn resources_by_id(&self, id: &ResourceId) -> CatalogResult<LeafStream<'static>>;

    async fn resources_by_type(&self, resource_type: &str) -> CatalogResult<LeafStream<'static>>;

    async fn resources_by_serialised_format(
        &self,
        serialised_format: &str,
    ) -> CatalogResult<LeafStream<'static>>;
}

/// Upstream backed by a fixed list of leaves, e.g. a listing exported to a
/// file.
#[derive(Clone, Debug, Default)]
pub struct FixedResourceSource {
    leaves: Vec<LeafResource>,
}

impl FixedResourceSource {
    pub fn new(leaves: Vec<LeafResource>) -> Self {
        Self { leaves }
    }

    fn matching(&self, pred: impl Fn(&LeafResource) -> bool) -> LeafStream<'static> {
        let found: Vec<_> = self
            .leaves
            .iter()
            .filter(|leaf| pred(leaf))
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(found).boxed()
    }
}

#[async_trait]
impl ResourceSource for FixedResourceSource {
    async fn resources_by_id(&self, id: &ResourceId) -> CatalogResult<LeafStream<'static>> {
        Ok(self.matching(|leaf| &leaf.id == id || leaf.ancestry().contains(id)))
    }

    async fn resources_by_type(&self, resource_type: &str) -> CatalogResult<LeafStream<'static>> {
        Ok(self.matching(|leaf| leaf.resource_type == resource_type))
    }

    async fn resources_by_serialised_format(
        &self,
        serialised_format: &str,
    ) -> CatalogResult<LeafStream<'static>> {
        Ok(self.matching(|leaf| leaf.serialised_format == serialised_format))
    }
}

/// Answers from the store when it is authoritative, otherwise asks
/// upstream and writes the answer through on its way back.
///
/// Store reads are retried with backoff on transient failures. A
/// write-through stream is not retried: a failed ingestion records no
/// completeness and is simply repeated on the next request.
pub struct CachingResourceService<S: ?Sized, U> {
    persistence: PersistenceLayer<S>,
    upstream: U,
    retry: RetryPolicy,
}

impl<S: BackingStore + ?Sized, U: ResourceSource> CachingResourceService<S, U> {
    pub fn new(persistence: PersistenceLayer<S>, upstream: U) -> Self {
        Self {
            persistence,
            upstream,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn persistence(&self) -> &PersistenceLayer<S> {
        &self.persistence
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    pub async fn resources_by_id(&self, id: &ResourceId) -> CatalogResult<LeafStream<'_>> {
        let cached = self
            .retrying("get_resources_by_id", move || {
                self.persistence.get_resources_by_id(id)
            })
            .await?;
        if let Some(leaves) = cached {
            debug!(%id, "served from store");
            return Ok(leaves);
        }
        info!(%id, "cache miss; querying upstream");
        let upstream = self.upstream.resources_by_id(id).await?;
        Ok(self.persistence.with_persistence_by_id(id.clone(), upstream))
    }

    pub async fn resources_by_type(&self, resource_type: &str) -> CatalogResult<LeafStream<'_>> {
        let cached = self
            .retrying("get_resources_by_type", move || {
                self.persistence.get_resources_by_type(resource_type)
            })
            .await?;
        if let Some(leaves) = cached {
            debug!(resource_type, "served from store");
            return Ok(leaves);
        }
        info!(resource_type, "cache miss; querying upstream");
        let upstream = self.upstream.resources_by_type(resource_type).await?;
        Ok(self
            .persistence
            .with_persistence_by_type(resource_type, upstream))
    }

    pub async fn resources_by_serialised_format(
        &self,
        serialised_format: &str,
    ) -> CatalogResult<LeafStream<'_>> {
        let cached = self
            .retrying("get_resources_by_serialised_format", move || {
                self.persistence
                    .get_resources_by_serialised_format(serialised_format)
            })
            .await?;
        if let Some(leaves) = cached {
            debug!(serialised_format, "served from store");
            return Ok(leaves);
        }
        info!(serialised_format, "cache miss; querying upstream");
        let upstream = self
            .upstream
            .resources_by_serialised_format(serialised_format)
            .await?;
        Ok(self
            .persistence
            .with_persistence_by_serialised_format(serialised_format, upstream))
    }

    pub async fn add_resource(&self, leaf: &LeafResource) -> CatalogResult<()> {
        self.retrying("add_resource", move || self.persistence.add_resource(leaf))
            .await
    }

    async fn retrying<T, F, Fut>(&self, op: &'static str, mut attempt_op: F) -> CatalogResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CatalogResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match attempt_op().await {
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient store failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl<S: BackingStore + ?Sized, U> std::fmt::Debug for CachingResourceService<S, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingResourceService")
            .field("persistence", &self.persistence)
            .field("retry", &self.retry)
            .finish()
    }
}
