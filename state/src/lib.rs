//! MPTD State Management
//!
//! Provides node storage, nested checkpoints and the secure Merkle Patricia
//! Trie engine that sessions are built on.

pub mod store;
pub mod memory;
pub mod persistent;
pub mod checkpoint;
pub mod node;
pub mod trie;

pub use store::*;
pub use memory::*;
pub use persistent::*;
pub use checkpoint::*;
pub use node::*;
pub use trie::*;
