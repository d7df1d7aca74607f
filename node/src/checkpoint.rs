//! Checkpoint state machine exposed to remote callers
//!
//! The engine keeps the checkpoint stack; this module decides which
//! transitions are legal and refuses the rest before the engine sees them.

use mptd_core::{Root, TrieEngine, TrieError, TrieResult};
use tracing::debug;

/// Remote-visible checkpoint state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    Flat,
    Checkpointed(usize),
}

impl CheckpointState {
    pub fn of(engine: &dyn TrieEngine) -> Self {
        match engine.checkpoint_depth() {
            0 => CheckpointState::Flat,
            depth => CheckpointState::Checkpointed(depth),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            CheckpointState::Flat => 0,
            CheckpointState::Checkpointed(depth) => *depth,
        }
    }

    pub fn is_checkpointed(&self) -> bool {
        matches!(self, CheckpointState::Checkpointed(_))
    }
}

/// State and current root after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointOutcome {
    pub state: CheckpointState,
    pub root: Root,
}

impl CheckpointOutcome {
    fn of(engine: &dyn TrieEngine) -> Self {
        Self {
            state: CheckpointState::of(engine),
            root: engine.root(),
        }
    }
}

/// `Flat | Checkpointed(n)` to `Checkpointed(n + 1)`
pub fn begin(engine: &mut dyn TrieEngine) -> CheckpointOutcome {
    engine.checkpoint();
    let outcome = CheckpointOutcome::of(engine);
    debug!("Checkpoint begun, depth {}", outcome.state.depth());
    outcome
}

/// `Checkpointed(n)` to `Checkpointed(n - 1)` keeping writes
pub fn commit(engine: &mut dyn TrieEngine) -> TrieResult<CheckpointOutcome> {
    require_checkpoint(engine, "commit")?;
    engine.commit()?;
    let outcome = CheckpointOutcome::of(engine);
    debug!("Checkpoint committed, depth {}", outcome.state.depth());
    Ok(outcome)
}

/// `Checkpointed(n)` to `Checkpointed(n - 1)` discarding writes
pub fn revert(engine: &mut dyn TrieEngine) -> TrieResult<CheckpointOutcome> {
    require_checkpoint(engine, "revert")?;
    engine.revert()?;
    let outcome = CheckpointOutcome::of(engine);
    debug!(
        "Checkpoint reverted to {}, depth {}",
        outcome.root,
        outcome.state.depth()
    );
    Ok(outcome)
}

pub fn in_checkpoint(engine: &dyn TrieEngine) -> bool {
    CheckpointState::of(engine).is_checkpointed()
}

fn require_checkpoint(engine: &dyn TrieEngine, op: &'static str) -> TrieResult<()> {
    if CheckpointState::of(engine) == CheckpointState::Flat {
        return Err(TrieError::IllegalCheckpointTransition { op });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mptd_state::{MemoryNodeDatabase, SecureTrie};
    use std::sync::Arc;

    fn new_trie() -> SecureTrie {
        SecureTrie::new(Arc::new(MemoryNodeDatabase::new()))
    }

    #[test]
    fn test_state_transitions() {
        let mut trie = new_trie();
        assert_eq!(CheckpointState::of(&trie), CheckpointState::Flat);

        assert_eq!(begin(&mut trie).state, CheckpointState::Checkpointed(1));
        assert_eq!(begin(&mut trie).state, CheckpointState::Checkpointed(2));
        assert!(in_checkpoint(&trie));

        assert_eq!(commit(&mut trie).unwrap().state, CheckpointState::Checkpointed(1));
        assert_eq!(revert(&mut trie).unwrap().state, CheckpointState::Flat);
        assert!(!in_checkpoint(&trie));
    }

    #[test]
    fn test_flat_transitions_are_rejected() {
        let mut trie = new_trie();
        assert!(matches!(
            commit(&mut trie),
            Err(TrieError::IllegalCheckpointTransition { op: "commit" })
        ));
        assert!(matches!(
            revert(&mut trie),
            Err(TrieError::IllegalCheckpointTransition { op: "revert" })
        ));
    }

    #[test]
    fn test_revert_reports_restored_root() {
        let mut trie = new_trie();
        trie.put(b"k1", b"v1").unwrap();
        let r1 = trie.root();

        begin(&mut trie);
        trie.put(b"k1", b"v2").unwrap();
        let outcome = revert(&mut trie).unwrap();
        assert_eq!(outcome.root, r1);
    }
}
