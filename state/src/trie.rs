//! Secure Merkle Patricia Trie
//!
//! Keys are hashed with Keccak-256 before they enter the trie, so every path
//! is 64 nibbles long. Nodes are immutable and stored under their own hash,
//! which keeps every historical root readable for as long as its nodes exist.

use mptd_core::{EntryIter, Root, TrieEngine, TrieEntry, TrieError, TrieResult};
use mptd_crypto::hashing::secure_key;
use tracing::debug;

use crate::checkpoint::CheckpointStack;
use crate::node::{common_prefix, from_nibbles, join_paths, to_nibbles, TrieNode};
use crate::store::SharedNodeDatabase;

/// Hashed-key Merkle Patricia Trie with nested checkpoints
pub struct SecureTrie {
    db: SharedNodeDatabase,
    root: Root,
    checkpoints: CheckpointStack,
}

impl SecureTrie {
    pub fn new(db: SharedNodeDatabase) -> Self {
        Self::with_root(db, Root::EMPTY)
    }

    pub fn with_root(db: SharedNodeDatabase, root: Root) -> Self {
        Self {
            db,
            root,
            checkpoints: CheckpointStack::new(),
        }
    }

    fn read(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        match self.checkpoints.get(key) {
            Some(value) => Ok(Some(value.clone())),
            None => self.db.get(key),
        }
    }

    fn write(&mut self, key: &[u8], value: &[u8]) -> TrieResult<()> {
        if self.checkpoints.write(key, value) {
            return Ok(());
        }
        self.db.put(key, value)
    }

    fn load_node(&self, hash: &Root) -> TrieResult<TrieNode> {
        let bytes = self
            .read(hash.as_bytes())?
            .ok_or_else(|| TrieError::EngineFailure(format!("missing trie node {}", hash)))?;
        TrieNode::decode(&bytes)
    }

    fn store_node(&mut self, node: TrieNode) -> TrieResult<Root> {
        let (hash, encoded) = node.encode_hashed()?;
        self.write(hash.as_bytes(), &encoded)?;
        Ok(hash)
    }

    fn root_node(&self) -> Option<Root> {
        (!self.root.is_empty()).then_some(self.root)
    }

    fn insert_at(&mut self, node: Option<Root>, path: &[u8], value: &[u8]) -> TrieResult<Root> {
        let hash = match node {
            Some(hash) => hash,
            None => {
                return self.store_node(TrieNode::Leaf {
                    path: path.to_vec(),
                    value: value.to_vec(),
                })
            }
        };

        match self.load_node(&hash)? {
            TrieNode::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                if leaf_path == path {
                    return self.store_node(TrieNode::Leaf {
                        path: leaf_path,
                        value: value.to_vec(),
                    });
                }

                let shared = common_prefix(&leaf_path, path);
                let mut children = [None; 16];
                let mut branch_value = None;

                if shared == leaf_path.len() {
                    branch_value = Some(leaf_value);
                } else {
                    let idx = leaf_path[shared] as usize;
                    children[idx] = Some(self.store_node(TrieNode::Leaf {
                        path: leaf_path[shared + 1..].to_vec(),
                        value: leaf_value,
                    })?);
                }

                if shared == path.len() {
                    branch_value = Some(value.to_vec());
                } else {
                    let idx = path[shared] as usize;
                    children[idx] = Some(self.store_node(TrieNode::Leaf {
                        path: path[shared + 1..].to_vec(),
                        value: value.to_vec(),
                    })?);
                }

                let branch = self.store_node(TrieNode::Branch {
                    children,
                    value: branch_value,
                })?;
                self.wrap_extension(&path[..shared], branch)
            }

            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                let shared = common_prefix(&ext_path, path);
                if shared == ext_path.len() {
                    let new_child = self.insert_at(Some(child), &path[shared..], value)?;
                    return self.store_node(TrieNode::Extension {
                        path: ext_path,
                        child: new_child,
                    });
                }

                let mut children = [None; 16];
                let mut branch_value = None;

                let rest = &ext_path[shared + 1..];
                children[ext_path[shared] as usize] = Some(if rest.is_empty() {
                    child
                } else {
                    self.store_node(TrieNode::Extension {
                        path: rest.to_vec(),
                        child,
                    })?
                });

                if shared == path.len() {
                    branch_value = Some(value.to_vec());
                } else {
                    children[path[shared] as usize] = Some(self.store_node(TrieNode::Leaf {
                        path: path[shared + 1..].to_vec(),
                        value: value.to_vec(),
                    })?);
                }

                let branch = self.store_node(TrieNode::Branch {
                    children,
                    value: branch_value,
                })?;
                self.wrap_extension(&path[..shared], branch)
            }

            TrieNode::Branch {
                mut children,
                value: branch_value,
            } => {
                if path.is_empty() {
                    return self.store_node(TrieNode::Branch {
                        children,
                        value: Some(value.to_vec()),
                    });
                }
                let idx = path[0] as usize;
                children[idx] = Some(self.insert_at(children[idx], &path[1..], value)?);
                self.store_node(TrieNode::Branch {
                    children,
                    value: branch_value,
                })
            }
        }
    }

    fn wrap_extension(&mut self, path: &[u8], child: Root) -> TrieResult<Root> {
        if path.is_empty() {
            return Ok(child);
        }
        self.store_node(TrieNode::Extension {
            path: path.to_vec(),
            child,
        })
    }

    /// Remove `path` below `hash`. `None` means the subtree became empty.
    fn delete_at(&mut self, hash: Root, path: &[u8]) -> TrieResult<Option<Root>> {
        match self.load_node(&hash)? {
            TrieNode::Leaf {
                path: leaf_path, ..
            } => {
                if leaf_path == path {
                    Ok(None)
                } else {
                    Ok(Some(hash))
                }
            }

            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                if !path.starts_with(&ext_path) {
                    return Ok(Some(hash));
                }
                match self.delete_at(child, &path[ext_path.len()..])? {
                    None => Ok(None),
                    Some(new_child) if new_child == child => Ok(Some(hash)),
                    Some(new_child) => self.prefix_node(&ext_path, new_child).map(Some),
                }
            }

            TrieNode::Branch {
                mut children,
                mut value,
            } => {
                if path.is_empty() {
                    if value.is_none() {
                        return Ok(Some(hash));
                    }
                    value = None;
                } else {
                    let idx = path[0] as usize;
                    let child = match children[idx] {
                        Some(child) => child,
                        None => return Ok(Some(hash)),
                    };
                    let new_child = self.delete_at(child, &path[1..])?;
                    if new_child == Some(child) {
                        return Ok(Some(hash));
                    }
                    children[idx] = new_child;
                }
                self.collapse_branch(children, value)
            }
        }
    }

    /// Restore the compact form of a branch that lost an entry
    fn collapse_branch(
        &mut self,
        children: [Option<Root>; 16],
        value: Option<Vec<u8>>,
    ) -> TrieResult<Option<Root>> {
        let occupied: Vec<usize> = (0..16).filter(|i| children[*i].is_some()).collect();

        match (occupied.as_slice(), value) {
            ([], None) => Ok(None),
            ([], Some(value)) => self
                .store_node(TrieNode::Leaf {
                    path: Vec::new(),
                    value,
                })
                .map(Some),
            ([idx], None) => match children[*idx] {
                Some(child) => self.prefix_node(&[*idx as u8], child).map(Some),
                None => Ok(None),
            },
            (_, value) => self.store_node(TrieNode::Branch { children, value }).map(Some),
        }
    }

    /// Node equivalent to `child` reached through `prefix`, merging paths
    fn prefix_node(&mut self, prefix: &[u8], child: Root) -> TrieResult<Root> {
        match self.load_node(&child)? {
            TrieNode::Leaf { path, value } => self.store_node(TrieNode::Leaf {
                path: join_paths(prefix, &path),
                value,
            }),
            TrieNode::Extension { path, child } => self.store_node(TrieNode::Extension {
                path: join_paths(prefix, &path),
                child,
            }),
            TrieNode::Branch { .. } => self.store_node(TrieNode::Extension {
                path: prefix.to_vec(),
                child,
            }),
        }
    }

    fn lookup(&self, path: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        let mut hash = match self.root_node() {
            Some(hash) => hash,
            None => return Ok(None),
        };
        let mut path = path;

        loop {
            match self.load_node(&hash)? {
                TrieNode::Leaf {
                    path: leaf_path,
                    value,
                } => return Ok((leaf_path == path).then_some(value)),
                TrieNode::Extension {
                    path: ext_path,
                    child,
                } => {
                    if !path.starts_with(&ext_path) {
                        return Ok(None);
                    }
                    path = &path[ext_path.len()..];
                    hash = child;
                }
                TrieNode::Branch { children, value } => {
                    if path.is_empty() {
                        return Ok(value);
                    }
                    match children[path[0] as usize] {
                        Some(child) => {
                            path = &path[1..];
                            hash = child;
                        }
                        None => return Ok(None),
                    }
                }
            }
        }
    }
}

impl TrieEngine for SecureTrie {
    fn root(&self) -> Root {
        self.root
    }

    fn set_root(&mut self, root: Root) {
        self.root = root;
    }

    fn get(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        self.lookup(&to_nibbles(&secure_key(key)))
    }

    fn get_raw(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        self.read(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> TrieResult<()> {
        let path = to_nibbles(&secure_key(key));
        let root = self.root_node();
        self.root = self.insert_at(root, &path, value)?;
        Ok(())
    }

    fn put_raw(&mut self, key: &[u8], value: &[u8]) -> TrieResult<()> {
        self.write(key, value)
    }

    fn del(&mut self, key: &[u8]) -> TrieResult<()> {
        let root = match self.root_node() {
            Some(root) => root,
            None => return Ok(()),
        };
        let path = to_nibbles(&secure_key(key));
        self.root = self.delete_at(root, &path)?.unwrap_or(Root::EMPTY);
        Ok(())
    }

    fn check_root(&self, root: &Root) -> TrieResult<bool> {
        if root.is_empty() {
            return Ok(true);
        }
        match self.read(root.as_bytes())? {
            Some(bytes) => Ok(TrieNode::decode(&bytes).is_ok()),
            None => Ok(false),
        }
    }

    fn checkpoint(&mut self) {
        self.checkpoints.push(self.root);
        debug!("Checkpoint opened at {} (depth {})", self.root, self.checkpoints.depth());
    }

    fn commit(&mut self) -> TrieResult<()> {
        if let Some(writes) = self.checkpoints.commit()? {
            debug!("Flushing {} checkpointed writes", writes.len());
            self.db.write_batch(writes)?;
        }
        Ok(())
    }

    fn revert(&mut self) -> TrieResult<()> {
        self.root = self.checkpoints.revert()?;
        debug!("Checkpoint reverted to {}", self.root);
        Ok(())
    }

    fn checkpoint_depth(&self) -> usize {
        self.checkpoints.depth()
    }

    fn copy(&self) -> Box<dyn TrieEngine> {
        Box::new(SecureTrie {
            db: self.db.clone(),
            root: self.root,
            checkpoints: self.checkpoints.clone(),
        })
    }

    fn entries(&self) -> EntryIter<'_> {
        Box::new(TrieIter::new(self))
    }
}

/// Depth-first walk over the trie reachable from the current root
pub struct TrieIter<'a> {
    trie: &'a SecureTrie,
    stack: Vec<(Root, Vec<u8>)>,
    failed: bool,
}

impl<'a> TrieIter<'a> {
    fn new(trie: &'a SecureTrie) -> Self {
        let stack = trie
            .root_node()
            .map(|root| vec![(root, Vec::new())])
            .unwrap_or_default();
        Self {
            trie,
            stack,
            failed: false,
        }
    }
}

impl<'a> Iterator for TrieIter<'a> {
    type Item = TrieResult<TrieEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        while let Some((hash, prefix)) = self.stack.pop() {
            let node = match self.trie.load_node(&hash) {
                Ok(node) => node,
                Err(e) => {
                    // An unreadable subtree ends the walk
                    self.failed = true;
                    return Some(Err(e));
                }
            };

            match node {
                TrieNode::Leaf { path, value } => {
                    let full = join_paths(&prefix, &path);
                    return Some(Ok(TrieEntry::new(from_nibbles(&full), value)));
                }
                TrieNode::Extension { path, child } => {
                    self.stack.push((child, join_paths(&prefix, &path)));
                }
                TrieNode::Branch { children, value } => {
                    for idx in (0..16).rev() {
                        if let Some(child) = children[idx] {
                            self.stack.push((child, join_paths(&prefix, &[idx as u8])));
                        }
                    }
                    if let Some(value) = value {
                        return Some(Ok(TrieEntry::new(from_nibbles(&prefix), value)));
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNodeDatabase;
    use crate::store::NodeDatabase;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn new_trie() -> SecureTrie {
        SecureTrie::new(Arc::new(MemoryNodeDatabase::new()))
    }

    #[test]
    fn test_put_get_del() {
        let mut trie = new_trie();
        assert_eq!(trie.root(), Root::EMPTY);

        trie.put(b"k1", b"v1").unwrap();
        let r1 = trie.root();
        assert_ne!(r1, Root::EMPTY);
        assert_eq!(trie.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(trie.get(b"k2").unwrap(), None);

        trie.del(b"k1").unwrap();
        assert_eq!(trie.get(b"k1").unwrap(), None);
        assert_eq!(trie.root(), Root::EMPTY);
    }

    #[test]
    fn test_root_is_stable_for_identical_put() {
        let mut trie = new_trie();
        trie.put(b"k1", b"v1").unwrap();
        let r1 = trie.root();

        trie.put(b"k1", b"v1").unwrap();
        assert_eq!(trie.root(), r1);

        trie.put(b"k1", b"v2").unwrap();
        assert_ne!(trie.root(), r1);
    }

    #[test]
    fn test_root_is_independent_of_insert_order() {
        let mut a = new_trie();
        let mut b = new_trie();
        for i in 0..50u32 {
            a.put(&i.to_be_bytes(), &i.to_le_bytes()).unwrap();
        }
        for i in (0..50u32).rev() {
            b.put(&i.to_be_bytes(), &i.to_le_bytes()).unwrap();
        }
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_delete_restores_previous_root() {
        let mut trie = new_trie();
        for i in 0..20u32 {
            trie.put(&i.to_be_bytes(), b"x").unwrap();
        }
        let before = trie.root();

        trie.put(b"extra", b"y").unwrap();
        trie.del(b"extra").unwrap();
        assert_eq!(trie.root(), before);

        // Absent key leaves the root alone
        trie.del(b"missing").unwrap();
        assert_eq!(trie.root(), before);
    }

    #[test]
    fn test_empty_key_and_value() {
        let mut trie = new_trie();
        trie.put(b"", b"").unwrap();
        assert_ne!(trie.root(), Root::EMPTY);
        assert_eq!(trie.get(b"").unwrap(), Some(Vec::new()));

        trie.put(b"k", b"").unwrap();
        assert_eq!(trie.get(b"k").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_historical_roots_stay_readable() {
        let mut trie = new_trie();
        trie.put(b"k1", b"v1").unwrap();
        let r1 = trie.root();
        trie.put(b"k1", b"v2").unwrap();
        let r2 = trie.root();

        trie.set_root(r1);
        assert_eq!(trie.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        trie.set_root(r2);
        assert_eq!(trie.get(b"k1").unwrap(), Some(b"v2".to_vec()));

        assert!(trie.check_root(&r1).unwrap());
        assert!(trie.check_root(&Root::EMPTY).unwrap());
        assert!(!trie.check_root(&Root::from_bytes([0xde; 32])).unwrap());
    }

    #[test]
    fn test_raw_access_bypasses_key_hashing() {
        let mut trie = new_trie();
        let before = trie.root();

        trie.put_raw(b"raw", b"bytes").unwrap();
        assert_eq!(trie.get_raw(b"raw").unwrap(), Some(b"bytes".to_vec()));
        assert_eq!(trie.get(b"raw").unwrap(), None);
        assert_eq!(trie.root(), before);

        // Trie nodes are visible as raw entries under their hash
        trie.put(b"k", b"v").unwrap();
        let root = trie.root();
        assert!(trie.get_raw(root.as_bytes()).unwrap().is_some());
    }

    #[test]
    fn test_checkpoint_revert() {
        let mut trie = new_trie();
        trie.put(b"k1", b"v1").unwrap();
        let r1 = trie.root();

        trie.checkpoint();
        assert!(trie.is_checkpoint());
        trie.put(b"k1", b"v2").unwrap();
        let r2 = trie.root();
        assert!(trie.check_root(&r2).unwrap());

        trie.revert().unwrap();
        assert!(!trie.is_checkpoint());
        assert_eq!(trie.root(), r1);
        assert_eq!(trie.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        // Nodes written inside the checkpoint are gone
        assert!(!trie.check_root(&r2).unwrap());
    }

    #[test]
    fn test_checkpoint_commit_persists() {
        let db = Arc::new(MemoryNodeDatabase::new());
        let mut trie = SecureTrie::new(db.clone());

        trie.checkpoint();
        trie.checkpoint();
        trie.put(b"k", b"v").unwrap();
        let root = trie.root();
        assert!(!db.contains(root.as_bytes()).unwrap());

        trie.commit().unwrap();
        assert_eq!(trie.checkpoint_depth(), 1);
        assert!(!db.contains(root.as_bytes()).unwrap());

        trie.commit().unwrap();
        assert_eq!(trie.checkpoint_depth(), 0);
        assert!(db.contains(root.as_bytes()).unwrap());
        assert_eq!(trie.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_commit_without_checkpoint_fails() {
        let mut trie = new_trie();
        assert!(matches!(
            trie.commit(),
            Err(TrieError::IllegalCheckpointTransition { .. })
        ));
        assert!(matches!(
            trie.revert(),
            Err(TrieError::IllegalCheckpointTransition { .. })
        ));
    }

    #[test]
    fn test_copy_is_independent() {
        let mut trie = new_trie();
        trie.put(b"k", b"original").unwrap();

        let mut copy = trie.copy();
        assert_eq!(copy.root(), trie.root());

        copy.put(b"k", b"changed").unwrap();
        assert_eq!(trie.get(b"k").unwrap(), Some(b"original".to_vec()));
        assert_eq!(copy.get(b"k").unwrap(), Some(b"changed".to_vec()));
    }

    #[test]
    fn test_copy_inside_checkpoint_keeps_pending_nodes() {
        let mut trie = new_trie();
        trie.checkpoint();
        trie.put(b"k", b"v").unwrap();

        let mut copy = trie.copy();
        assert_eq!(copy.checkpoint_depth(), 1);
        assert_eq!(copy.get(b"k").unwrap(), Some(b"v".to_vec()));

        trie.revert().unwrap();
        assert_eq!(copy.get(b"k").unwrap(), Some(b"v".to_vec()));
        copy.commit().unwrap();
        assert_eq!(copy.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_entries_enumerate_hashed_keys() {
        let mut trie = new_trie();
        let mut expected = HashMap::new();
        for i in 0..30u32 {
            let key = format!("key-{}", i);
            trie.put(key.as_bytes(), &i.to_be_bytes()).unwrap();
            expected.insert(secure_key(key.as_bytes()).to_vec(), i.to_be_bytes().to_vec());
        }

        let entries: Vec<TrieEntry> = trie.entries().collect::<TrieResult<_>>().unwrap();
        assert_eq!(entries.len(), expected.len());
        for entry in &entries {
            assert_eq!(expected.get(&entry.key), Some(&entry.value));
        }

        // Walk order follows nibble order, which for fixed-width keys is byte order
        let mut sorted = entries.clone();
        sorted.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(entries, sorted);
    }

    #[test]
    fn test_entries_of_empty_trie() {
        let trie = new_trie();
        assert_eq!(trie.entries().count(), 0);
    }

    #[test]
    fn test_entries_report_missing_nodes() {
        let mut trie = new_trie();
        trie.set_root(Root::from_bytes([0x11; 32]));
        let items: Vec<_> = trie.entries().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(TrieError::EngineFailure(_))));
    }
}
