//! Core traits defining MPTD interfaces
//!
//! The session layer talks to tries only through `TrieEngine`.

use crate::types::*;

/// Result type for MPTD operations
pub type TrieResult<T> = Result<T, crate::error::TrieError>;

/// Boxed enumeration over a trie's entries
pub type EntryIter<'a> = Box<dyn Iterator<Item = TrieResult<TrieEntry>> + Send + 'a>;

/// A versioned key-value trie with a reassignable current root
///
/// Every read and write is evaluated against `root()`. Writes move the
/// current root; `set_root` moves it without touching storage.
pub trait TrieEngine: Send + Sync {
    /// Current root
    fn root(&self) -> Root;

    /// Point the engine at another root. Does not mutate stored data.
    fn set_root(&mut self, root: Root);

    /// Look up a key through the trie
    fn get(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>>;

    /// Look up a key directly in node storage
    fn get_raw(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>>;

    /// Insert or overwrite a key, moving the current root
    fn put(&mut self, key: &[u8], value: &[u8]) -> TrieResult<()>;

    /// Write directly to node storage; the current root is untouched
    fn put_raw(&mut self, key: &[u8], value: &[u8]) -> TrieResult<()>;

    /// Remove a key, moving the current root. Absent keys are not an error.
    fn del(&mut self, key: &[u8]) -> TrieResult<()>;

    /// Whether `root` is reachable in this engine's storage
    fn check_root(&self, root: &Root) -> TrieResult<bool>;

    /// Open a nested checkpoint
    fn checkpoint(&mut self);

    /// Fold the innermost checkpoint into its parent (or into storage)
    fn commit(&mut self) -> TrieResult<()>;

    /// Discard the innermost checkpoint and restore the root saved with it
    fn revert(&mut self) -> TrieResult<()>;

    /// Number of open checkpoints
    fn checkpoint_depth(&self) -> usize;

    fn is_checkpoint(&self) -> bool {
        self.checkpoint_depth() > 0
    }

    /// Independent handle over the same storage, positioned at the same root
    fn copy(&self) -> Box<dyn TrieEngine>;

    /// Enumerate entries reachable from the current root
    fn entries(&self) -> EntryIter<'_>;
}
