use canopy_store::StoreError;
use canopy_types::{ResourceId, TypeError};

/// Errors produced by catalog operations.
///
/// A cache miss is not an error: read operations report it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The ledger claims completeness but the store cannot back it up.
    /// Fatal: indicates store corruption or an unguarded race.
    #[error("consistency violation at {id}: {reason}")]
    ConsistencyViolation { id: ResourceId, reason: String },

    /// An ingested leaf's ancestry never reaches the ingestion root.
    #[error("leaf {leaf} does not descend from ingestion root {root}")]
    OutsideRoot { leaf: ResourceId, root: ResourceId },

    /// The backing store failed. Retryable when the store says so.
    #[error("backing store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid resource: {0}")]
    InvalidResource(#[from] TypeError),

    #[error("upstream resource service failed: {0}")]
    Upstream(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CatalogError {
    pub fn violation(id: &ResourceId, reason: impl Into<String>) -> Self {
        Self::ConsistencyViolation {
            id: id.clone(),
            reason: reason.into(),
        }
    }

    /// Whether the failure is transient (backing store unavailable).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retryable())
    }
}

/// Convenience alias for catalog results.
pub type CatalogResult<T> = Result<T, CatalogError>;
