use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use super::{file_store::FileStore, memory_store::MemoryStore};
use crate::config::{StoreBackend, StoreConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored value is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored session is missing '{0}'")]
    Missing(&'static str),
}

impl StoreError {
    /// The backend answered but what it holds is not a usable session.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Serialization(_) | StoreError::Missing(_))
    }
}

/// The KeyValueStore trait abstracts durable string storage (read, batch write, batch remove).
///
/// Batch operations complete as a unit from the caller's perspective: once
/// `remove_many` returns, none of the keys are readable any more.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;
    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError>;
    fn is_durable(&self) -> bool {
        // Only the in-memory store loses its contents on restart.
        true
    }
}

/// Creates a concrete store implementation based on the StoreConfig.
/// If `store.enabled = false`, returns MemoryStore. Otherwise, picks the specified backend.
pub fn create_store(config: &StoreConfig) -> Arc<dyn KeyValueStore> {
    if !config.enabled {
        info!("Token persistence is disabled. Using MemoryStore.");
        return Arc::new(MemoryStore::new());
    }

    match &config.backend {
        Some(StoreBackend::File(file_config)) => {
            info!("Persisting session to '{}'", file_config.path.display());
            Arc::new(FileStore::new(file_config.path.clone()))
        }
        Some(StoreBackend::Memory) => Arc::new(MemoryStore::new()),
        None => {
            warn!("Store is enabled, but no backend config is provided! Using MemoryStore.");
            Arc::new(MemoryStore::new())
        }
    }
}
