//! Nested checkpoint layers
//!
//! While a checkpoint is open, writes land in the innermost layer instead of
//! the node database. Reads consult layers innermost-first. Committing the
//! outermost layer hands its writes back to the caller for flushing.

use mptd_core::{Root, TrieError, TrieResult};
use std::collections::HashMap;

/// Writes buffered since one checkpoint, plus the root it was opened at
#[derive(Debug, Clone)]
pub struct CheckpointLayer {
    pub root: Root,
    pub pending: HashMap<Vec<u8>, Vec<u8>>,
}

impl CheckpointLayer {
    pub fn new(root: Root) -> Self {
        Self {
            root,
            pending: HashMap::new(),
        }
    }
}

/// Stack of open checkpoints
#[derive(Debug, Clone, Default)]
pub struct CheckpointStack {
    layers: Vec<CheckpointLayer>,
}

impl CheckpointStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Open a checkpoint remembering `root`
    pub fn push(&mut self, root: Root) {
        self.layers.push(CheckpointLayer::new(root));
    }

    /// Buffered value for `key`, innermost layer first
    pub fn get(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.pending.get(key))
    }

    /// Buffer a write in the innermost layer.
    ///
    /// Returns false when no checkpoint is open; the caller then writes through.
    pub fn write(&mut self, key: &[u8], value: &[u8]) -> bool {
        match self.layers.last_mut() {
            Some(layer) => {
                layer.pending.insert(key.to_vec(), value.to_vec());
                true
            }
            None => false,
        }
    }

    /// Close the innermost checkpoint, keeping its writes.
    ///
    /// Writes fold into the parent layer; when the outermost layer closes they
    /// are returned so the caller can persist them.
    pub fn commit(&mut self) -> TrieResult<Option<Vec<(Vec<u8>, Vec<u8>)>>> {
        let layer = self
            .layers
            .pop()
            .ok_or(TrieError::IllegalCheckpointTransition { op: "commit" })?;

        match self.layers.last_mut() {
            Some(parent) => {
                parent.pending.extend(layer.pending);
                Ok(None)
            }
            None => Ok(Some(layer.pending.into_iter().collect())),
        }
    }

    /// Close the innermost checkpoint, discarding its writes.
    ///
    /// Returns the root the checkpoint was opened at.
    pub fn revert(&mut self) -> TrieResult<Root> {
        let layer = self
            .layers
            .pop()
            .ok_or(TrieError::IllegalCheckpointTransition { op: "revert" })?;
        Ok(layer.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_through_when_flat() {
        let mut stack = CheckpointStack::new();
        assert!(!stack.write(b"k", b"v"));
        assert!(stack.get(b"k").is_none());
    }

    #[test]
    fn test_nested_commit_folds_into_parent() {
        let mut stack = CheckpointStack::new();
        stack.push(Root::EMPTY);
        stack.write(b"outer", b"1");
        stack.push(Root::from_bytes([1u8; 32]));
        stack.write(b"inner", b"2");
        assert_eq!(stack.depth(), 2);

        assert!(stack.commit().unwrap().is_none());
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.get(b"inner"), Some(&b"2".to_vec()));

        let flushed = stack.commit().unwrap().unwrap();
        assert_eq!(flushed.len(), 2);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_revert_discards_and_returns_root() {
        let mut stack = CheckpointStack::new();
        let root = Root::from_bytes([9u8; 32]);
        stack.push(root);
        stack.write(b"k", b"v");

        assert_eq!(stack.revert().unwrap(), root);
        assert!(stack.get(b"k").is_none());
    }

    #[test]
    fn test_transitions_at_depth_zero_fail() {
        let mut stack = CheckpointStack::new();
        assert!(matches!(
            stack.commit(),
            Err(TrieError::IllegalCheckpointTransition { op: "commit" })
        ));
        assert!(matches!(
            stack.revert(),
            Err(TrieError::IllegalCheckpointTransition { op: "revert" })
        ));
    }
}
