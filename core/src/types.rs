//! Core types for MPTD
//!
//! Defines the root address, session handle and trie entry types used across the system.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TrieError;
use crate::traits::TrieResult;

/// Length in bytes of every non-empty trie root
pub const ROOT_LEN: usize = 32;

/// 32-byte trie root
///
/// Identifies one version of a trie. `Root::EMPTY` is the sentinel for a trie
/// with no entries; it is what callers get when they address a session with an
/// empty root.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Root(pub [u8; ROOT_LEN]);

impl Root {
    /// keccak256(rlp("")), the root of an empty trie
    pub const EMPTY: Root = Root([
        0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8,
        0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63,
        0xb4, 0x21,
    ]);

    pub fn from_bytes(bytes: [u8; ROOT_LEN]) -> Self {
        Root(bytes)
    }

    /// Validate a caller-supplied root.
    ///
    /// An empty slice resolves to `Root::EMPTY`; anything else must be exactly
    /// 32 bytes.
    pub fn resolve(bytes: &[u8]) -> TrieResult<Self> {
        if bytes.is_empty() {
            return Ok(Root::EMPTY);
        }
        if bytes.len() != ROOT_LEN {
            return Err(TrieError::InvalidRoot { len: bytes.len() });
        }
        let mut arr = [0u8; ROOT_LEN];
        arr.copy_from_slice(bytes);
        Ok(Root(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ROOT_LEN] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        *self == Root::EMPTY
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex root from the wire; `""` means the empty trie.
    pub fn from_hex(s: &str) -> TrieResult<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        Self::resolve(&bytes)
    }
}

impl Default for Root {
    fn default() -> Self {
        Root::EMPTY
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", &self.to_hex()[..16])
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Root(0x{})", self.to_hex())
    }
}

/// Opaque session handle issued by the registry
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        SessionId(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// One key/value pair produced by trie enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl TrieEntry {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_empty_is_sentinel() {
        assert_eq!(Root::resolve(&[]).unwrap(), Root::EMPTY);
        assert_eq!(Root::from_hex("").unwrap(), Root::EMPTY);
        assert!(Root::EMPTY.is_empty());
    }

    #[test]
    fn test_resolve_rejects_bad_length() {
        let err = Root::resolve(&[1u8; 31]).unwrap_err();
        assert!(matches!(err, TrieError::InvalidRoot { len: 31 }));

        let err = Root::resolve(&[1u8; 33]).unwrap_err();
        assert!(matches!(err, TrieError::InvalidRoot { len: 33 }));
    }

    #[test]
    fn test_root_hex() {
        let root = Root::from_bytes([7u8; 32]);
        let parsed = Root::from_hex(&root.to_hex()).unwrap();
        assert_eq!(root, parsed);

        let prefixed = Root::from_hex(&format!("0x{}", root.to_hex())).unwrap();
        assert_eq!(root, prefixed);

        assert!(Root::from_hex("zz").is_err());
    }

    #[test]
    fn test_session_id_display() {
        assert_eq!(format!("{}", SessionId::new(9)), "#9");
    }
}
