//! Catalog configuration, loaded from TOML.
//!
//! ```toml
//! [backend]
//! kind = "sqlite"
//! path = "canopy.db"
//!
//! [retry]
//! max_attempts = 3
//! initial_backoff_ms = 50
//! max_backoff_ms = 2000
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use canopy_store::{BackingStore, ExpiringStore, SqliteStore};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CatalogError, CatalogResult};

/// Default database file for the SQLite backend.
pub const DEFAULT_DB_PATH: &str = "canopy.db";

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Which backing store to open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Sqlite {
        path: PathBuf,
    },
    /// In-process store. Without `ttl_secs` nothing expires.
    Expiring {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl_secs: Option<u64>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl BackendConfig {
    pub fn open(&self) -> CatalogResult<Arc<dyn BackingStore>> {
        let store: Arc<dyn BackingStore> = match self {
            Self::Sqlite { path } => Arc::new(SqliteStore::open(path)?),
            Self::Expiring { ttl_secs: None } => Arc::new(ExpiringStore::new()),
            Self::Expiring {
                ttl_secs: Some(secs),
            } => Arc::new(ExpiringStore::with_ttl(Duration::from_secs(*secs))),
        };
        info!(backend = store.backend_name(), "opened backing store");
        Ok(store)
    }
}

/// Exponential backoff for transient store failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first. `1` disables retries.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl CatalogConfig {
    pub fn from_toml_str(s: &str) -> CatalogResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| CatalogError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> CatalogResult<String> {
        toml::to_string_pretty(self).map_err(|e| CatalogError::Config(e.to_string()))
    }

    fn validate(&self) -> CatalogResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(CatalogError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(CatalogError::Config(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}
