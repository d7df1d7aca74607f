//! In-memory node database for tests and ephemeral sessions

use dashmap::DashMap;
use mptd_core::TrieResult;

use crate::store::NodeDatabase;

/// In-memory node database
pub struct MemoryNodeDatabase {
    data: DashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryNodeDatabase {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    pub fn with_data(data: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        let db = Self::new();
        for (key, value) in data {
            db.data.insert(key, value);
        }
        db
    }
}

impl Default for MemoryNodeDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeDatabase for MemoryNodeDatabase {
    fn get(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> TrieResult<()> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn write_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> TrieResult<()> {
        for (key, value) in entries {
            self.data.insert(key, value);
        }
        Ok(())
    }

    fn contains(&self, key: &[u8]) -> TrieResult<bool> {
        Ok(self.data.contains_key(key))
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_db_basic() {
        let db = MemoryNodeDatabase::new();

        db.put(b"key1", b"value1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(db.get(b"key2").unwrap(), None);

        // Empty keys and values are ordinary entries
        db.put(b"", b"").unwrap();
        assert_eq!(db.get(b"").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_memory_db_batch() {
        let db = MemoryNodeDatabase::with_data(vec![(b"k0".to_vec(), b"v0".to_vec())]);

        db.write_batch(vec![
            (b"k1".to_vec(), b"v1".to_vec()),
            (b"k2".to_vec(), b"v2".to_vec()),
        ])
        .unwrap();

        assert_eq!(db.len(), 3);
        assert!(db.contains(b"k1").unwrap());
        assert!(db.contains(b"k2").unwrap());
    }
}
