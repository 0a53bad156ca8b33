//! Backing store adapters for the Canopy resource catalog.
//!
//! The catalog keeps all of its state in a [`BackingStore`]: opaque record
//! bodies addressed by `(table, id)`, plus string sets addressed by
//! `(set, key)`. Everything else (tree shape, secondary indices, the
//! completeness ledger) is built on those two primitive families, so the
//! engines are interchangeable.
//!
//! # Storage Backends
//!
//! - [`SqliteStore`] -- durable, transactional SQLite database
//! - [`ExpiringStore`] -- in-process key-value engine with per-entry TTL
//!
//! # Typed Access
//!
//! [`EntityRepository`] loads and saves [`Persisted`] entities, each of which
//! names its own table and id.
//!
//! # Design Rules
//!
//! 1. Every primitive is idempotent.
//! 2. Set members are always returned sorted.
//! 3. A failed call has not partially committed.
//! 4. The store never interprets record bodies.
//! 5. All I/O errors are propagated, never silently ignored.

#[cfg(test)]
mod conformance;
pub mod error;
pub mod expiring;
pub mod repository;
pub mod sqlite;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use expiring::ExpiringStore;
pub use repository::EntityRepository;
pub use sqlite::SqliteStore;
pub use traits::{BackingStore, Persisted};
