//! Foundation types for the Canopy resource catalog.
//!
//! This crate provides the resource model shared by every other Canopy crate.
//!
//! # Key Types
//!
//! - [`ResourceId`] -- Opaque, non-empty identifier of a tree node
//! - [`LeafResource`] -- Terminal, readable unit of protected data
//! - [`ParentResource`] -- Container node, linked to its parent by id
//! - [`Ancestry`] -- Validated, immutable ancestor chain (nearest first)
//! - [`Resource`] -- Either kind of node
//! - [`Scope`] -- Query axis with its own completeness watermark

pub mod error;
pub mod id;
pub mod resource;
pub mod scope;

pub use error::TypeError;
pub use id::ResourceId;
pub use resource::{Ancestry, LeafResource, ParentResource, Resource};
pub use scope::Scope;
