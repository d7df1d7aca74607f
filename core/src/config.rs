//! Configuration types for MPTD

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::TrieError;
use crate::traits::TrieResult;

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name for logging
    pub name: String,

    /// Storage configuration
    pub storage: StorageConfig,

    /// API configuration
    pub api: ApiConfig,

    /// Logging level
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "mptd".to_string(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> TrieResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TrieError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| TrieError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> TrieResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Which node database backs newly created sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sled,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Sled => write!(f, "sled"),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Node database backend
    pub backend: StorageBackend,

    /// Data directory (sled backend only)
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API listen address
    pub listen_addr: String,

    /// Entries buffered per read stream before the producer waits
    pub stream_buffer: usize,

    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:50051".to_string(),
            stream_buffer: 64,
            enable_cors: false,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server base URL
    pub server_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:50051".to_string(),
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"storage": {"backend": "sled"}}"#).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(config.api.listen_addr, "0.0.0.0:50051");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = NodeConfig::default();
        let json = config.to_json().unwrap();
        let parsed: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api.stream_buffer, config.api.stream_buffer);
        assert_eq!(parsed.storage.backend, StorageBackend::Memory);
    }
}
