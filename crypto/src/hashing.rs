//! Hashing functions using Keccak-256

use mptd_core::Root;
use sha3::{Digest, Keccak256};

/// Compute the Keccak-256 digest of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Address of an encoded trie node
pub fn node_hash(encoded: &[u8]) -> Root {
    Root::from_bytes(keccak256(encoded))
}

/// Key under which a secure trie stores `key`
pub fn secure_key(key: &[u8]) -> [u8; 32] {
    keccak256(key)
}
