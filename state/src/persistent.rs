//! Persistent node database using sled

use mptd_core::{TrieError, TrieResult};
use sled::Tree;

use crate::store::NodeDatabase;

/// Persistent node database backed by one sled tree
pub struct PersistentNodeDatabase {
    tree: Tree,
}

impl PersistentNodeDatabase {
    pub fn new(tree: Tree) -> Self {
        Self { tree }
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> TrieResult<()> {
        self.tree
            .flush()
            .map_err(|e| TrieError::EngineFailure(e.to_string()))?;
        Ok(())
    }
}

impl NodeDatabase for PersistentNodeDatabase {
    fn get(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        self.tree
            .get(key)
            .map(|opt| opt.map(|v| v.to_vec()))
            .map_err(|e| TrieError::EngineFailure(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> TrieResult<()> {
        self.tree
            .insert(key, value)
            .map_err(|e| TrieError::EngineFailure(e.to_string()))?;
        Ok(())
    }

    fn write_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> TrieResult<()> {
        let mut batch = sled::Batch::default();
        for (key, value) in entries {
            batch.insert(key, value);
        }

        // Apply atomically, then make it durable
        self.tree
            .apply_batch(batch)
            .map_err(|e| TrieError::EngineFailure(e.to_string()))?;
        self.flush()
    }

    fn contains(&self, key: &[u8]) -> TrieResult<bool> {
        self.tree
            .contains_key(key)
            .map_err(|e| TrieError::EngineFailure(e.to_string()))
    }

    fn len(&self) -> usize {
        self.tree.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_persistent_db_basic() {
        let tmp = TempDir::new().unwrap();
        let db = sled::open(tmp.path()).unwrap();
        let store = PersistentNodeDatabase::new(db.open_tree("nodes").unwrap());

        store.put(b"key1", b"value1").unwrap();
        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert!(!store.contains(b"key2").unwrap());
    }

    #[test]
    fn test_persistent_db_reopen() {
        let tmp = TempDir::new().unwrap();

        // Write data
        {
            let db = sled::open(tmp.path()).unwrap();
            let store = PersistentNodeDatabase::new(db.open_tree("nodes").unwrap());
            store
                .write_batch(vec![
                    (b"k1".to_vec(), b"v1".to_vec()),
                    (b"k2".to_vec(), b"v2".to_vec()),
                ])
                .unwrap();
        }

        // Reopen and verify
        {
            let db = sled::open(tmp.path()).unwrap();
            let store = PersistentNodeDatabase::new(db.open_tree("nodes").unwrap());
            assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
            assert_eq!(store.get(b"k2").unwrap(), Some(b"v2".to_vec()));
            assert_eq!(store.len(), 2);
        }
    }
}
