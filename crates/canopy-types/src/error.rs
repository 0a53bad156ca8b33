use thiserror::Error;

use crate::id::ResourceId;

/// Errors produced when constructing resource model values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("resource id must not be empty")]
    EmptyId,

    #[error("ancestry link broken: {child} does not name {next} as its parent")]
    BrokenLink { child: ResourceId, next: ResourceId },

    #[error("ancestry revisits {0}; resource trees must be acyclic")]
    Cycle(ResourceId),

    #[error("serialization error: {0}")]
    Serialization(String),
}
