//! MPTD Cryptography Module
//!
//! Keccak-256 hashing for trie node addressing and secure-trie key hashing.

pub mod hashing;

pub use hashing::*;
