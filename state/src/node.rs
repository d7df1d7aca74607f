//! Trie node types and nibble paths

use mptd_core::{Root, TrieError, TrieResult};
use mptd_crypto::hashing::node_hash;
use serde::{Deserialize, Serialize};

/// Node types in the Merkle Patricia Trie
///
/// Paths are nibble sequences (one nibble per byte). Children are referenced
/// by the hash of their encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrieNode {
    Leaf {
        path: Vec<u8>,
        value: Vec<u8>,
    },
    Extension {
        path: Vec<u8>,
        child: Root,
    },
    Branch {
        children: [Option<Root>; 16],
        value: Option<Vec<u8>>,
    },
}

impl TrieNode {
    pub fn empty_branch() -> Self {
        TrieNode::Branch {
            children: [None; 16],
            value: None,
        }
    }

    pub fn encode(&self) -> TrieResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TrieError::EngineFailure(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> TrieResult<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| TrieError::EngineFailure(format!("corrupt trie node: {}", e)))
    }

    /// Encoding together with the hash it is stored under
    pub fn encode_hashed(&self) -> TrieResult<(Root, Vec<u8>)> {
        let encoded = self.encode()?;
        Ok((node_hash(&encoded), encoded))
    }
}

/// Split bytes into nibbles, high nibble first
pub fn to_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    for byte in bytes {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    nibbles
}

/// Pack nibbles back into bytes. A trailing odd nibble becomes a high nibble.
pub fn from_nibbles(nibbles: &[u8]) -> Vec<u8> {
    nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

/// Length of the shared prefix of two nibble paths
pub fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Concatenate two nibble paths
pub fn join_paths(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut path = Vec::with_capacity(a.len() + b.len());
    path.extend_from_slice(a);
    path.extend_from_slice(b);
    path
}
