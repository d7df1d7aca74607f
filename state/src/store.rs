//! Node database interface and backend selection

use mptd_core::{SessionId, StorageBackend, StorageConfig, TrieError, TrieResult};
use std::sync::Arc;
use tracing::{debug, info};

use crate::memory::MemoryNodeDatabase;
use crate::persistent::PersistentNodeDatabase;

/// Key/value storage for encoded trie nodes and raw entries
///
/// Nodes are content-addressed, so a database may be shared by any number of
/// engines without coordination.
pub trait NodeDatabase: Send + Sync {
    fn get(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> TrieResult<()>;

    /// Write many entries at once
    fn write_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> TrieResult<()>;

    fn contains(&self, key: &[u8]) -> TrieResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Number of stored entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Thread-safe node database handle
pub type SharedNodeDatabase = Arc<dyn NodeDatabase>;

/// Opens node databases for new sessions
pub enum StateBackend {
    Memory,
    Sled(sled::Db),
}

impl StateBackend {
    pub fn open(config: &StorageConfig) -> TrieResult<Self> {
        match config.backend {
            StorageBackend::Memory => Ok(StateBackend::Memory),
            StorageBackend::Sled => {
                let db = sled::open(&config.data_dir).map_err(|e| {
                    TrieError::Config(format!("{}: {}", config.data_dir.display(), e))
                })?;
                info!("Opened node database at {}", config.data_dir.display());
                Ok(StateBackend::Sled(db))
            }
        }
    }

    pub fn memory() -> Self {
        StateBackend::Memory
    }

    pub fn kind(&self) -> StorageBackend {
        match self {
            StateBackend::Memory => StorageBackend::Memory,
            StateBackend::Sled(_) => StorageBackend::Sled,
        }
    }

    /// Fresh, empty node database for a newly initialized session
    pub fn create_store(&self, id: SessionId) -> TrieResult<SharedNodeDatabase> {
        match self {
            StateBackend::Memory => Ok(Arc::new(MemoryNodeDatabase::new())),
            StateBackend::Sled(db) => {
                let name = format!("session-{}", id.0);
                // Leftovers from an earlier process must not leak into the new session
                db.drop_tree(name.as_bytes())
                    .map_err(|e| TrieError::EngineFailure(e.to_string()))?;
                let tree = db
                    .open_tree(name.as_bytes())
                    .map_err(|e| TrieError::EngineFailure(e.to_string()))?;
                debug!("Opened tree {} for session {}", name, id);
                Ok(Arc::new(PersistentNodeDatabase::new(tree)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_backend_stores_are_isolated() {
        let backend = StateBackend::memory();
        let a = backend.create_store(SessionId::new(0)).unwrap();
        let b = backend.create_store(SessionId::new(1)).unwrap();

        a.put(b"k", b"v").unwrap();
        assert!(a.contains(b"k").unwrap());
        assert!(!b.contains(b"k").unwrap());
    }

    #[test]
    fn test_sled_backend_recreates_session_tree() {
        let tmp = TempDir::new().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Sled,
            data_dir: tmp.path().to_path_buf(),
        };
        let backend = StateBackend::open(&config).unwrap();
        assert_eq!(backend.kind(), StorageBackend::Sled);

        let store = backend.create_store(SessionId::new(0)).unwrap();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.len(), 1);
        drop(store);

        let again = backend.create_store(SessionId::new(0)).unwrap();
        assert!(again.is_empty());
    }
}
