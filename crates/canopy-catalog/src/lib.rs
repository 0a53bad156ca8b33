//! Completeness-aware persistence for the Canopy resource catalog.
//!
//! The catalog caches a hierarchical resource listing (containers and the
//! leaf resources beneath them) and remembers, per query, whether what it
//! holds is the *whole* answer. Only then is a read served from the store.
//!
//! # Components
//!
//! - [`CompletenessLedger`] -- which `(scope, key)` pairs are authoritative
//! - [`SecondaryIndices`] -- children, type and format lookups
//! - [`TreeResolver`] -- rebuilds ancestry and enumerates subtrees lazily
//! - [`PersistenceLayer`] -- reads, write-through ingestion, incremental adds
//! - [`CachingResourceService`] -- store-first reads over a [`ResourceSource`]
//!
//! # Guarantees
//!
//! 1. A completeness mark is written only after every row it covers.
//! 2. A partial or failed ingestion leaves no mark for its scope.
//! 3. Ingestion never downgrades an already complete node.
//! 4. Re-running an ingestion with the same input leaves the same state.
//! 5. A completed subtree ingestion drops stored nodes upstream no longer
//!    lists.
//! 6. On an expiring store a mark lapses no later than the rows it covers.

pub mod config;
pub mod entity;
pub mod error;
pub mod indices;
pub mod ledger;
pub mod persistence;
pub mod service;
pub mod tree;

use canopy_types::LeafResource;
use futures::stream::BoxStream;

/// A lazy, fallible stream of leaves with resolved ancestry.
pub type LeafStream<'a> = BoxStream<'a, CatalogResult<LeafResource>>;

pub use config::{BackendConfig, CatalogConfig, RetryPolicy};
pub use entity::{CompletenessMark, ResourceEntity, ResourcePayload};
pub use error::{CatalogError, CatalogResult};
pub use indices::{IndexKind, LeafIndex, SecondaryIndices};
pub use ledger::CompletenessLedger;
pub use persistence::PersistenceLayer;
pub use service::{CachingResourceService, FixedResourceSource, ResourceSource};
pub use tree::TreeResolver;
