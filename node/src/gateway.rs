//! Root switching
//!
//! Every root-addressed operation points the engine at the caller's root
//! before it runs. The caller must hold the session lock across both steps.

use mptd_core::{Root, TrieEngine, TrieResult};
use tracing::trace;

/// Move the engine to `requested` if it is elsewhere. Returns true if it moved.
pub fn switch_root(engine: &mut dyn TrieEngine, requested: Root) -> bool {
    let current = engine.root();
    if current == requested {
        return false;
    }
    trace!("Switching root {} -> {}", current, requested);
    engine.set_root(requested);
    true
}

/// Run `op` against the view at `requested`
///
/// If `op` fails the engine goes back to the root it had before the switch.
pub fn with_root<T, F>(engine: &mut dyn TrieEngine, requested: Root, op: F) -> TrieResult<T>
where
    F: FnOnce(&mut dyn TrieEngine) -> TrieResult<T>,
{
    let previous = engine.root();
    let moved = switch_root(engine, requested);
    let result = op(engine);
    if moved && result.is_err() {
        trace!("Restoring root {} after failure at {}", previous, requested);
        engine.set_root(previous);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use mptd_state::{MemoryNodeDatabase, SecureTrie};
    use std::sync::Arc;

    #[test]
    fn test_switch_only_when_different() {
        let mut trie = SecureTrie::new(Arc::new(MemoryNodeDatabase::new()));
        assert!(!switch_root(&mut trie, Root::EMPTY));

        trie.put(b"k", b"v").unwrap();
        let r1 = trie.root();
        assert!(switch_root(&mut trie, Root::EMPTY));
        assert_eq!(trie.root(), Root::EMPTY);
        assert!(switch_root(&mut trie, r1));
    }

    #[test]
    fn test_with_root_reads_requested_view() {
        let mut trie = SecureTrie::new(Arc::new(MemoryNodeDatabase::new()));
        trie.put(b"k", b"old").unwrap();
        let old = trie.root();
        trie.put(b"k", b"new").unwrap();

        let value = with_root(&mut trie, old, |engine| engine.get(b"k")).unwrap();
        assert_eq!(value, Some(b"old".to_vec()));
        assert_eq!(trie.root(), old);
    }

    #[test]
    fn test_failed_op_restores_root() {
        let mut trie = SecureTrie::new(Arc::new(MemoryNodeDatabase::new()));
        trie.put(b"k", b"v").unwrap();
        let good = trie.root();

        let missing = Root::from_bytes([0x33; 32]);
        let result = with_root(&mut trie, missing, |engine| engine.put(b"k2", b"v2"));
        assert!(result.is_err());
        assert_eq!(trie.root(), good);
    }
}
