//! Full node implementation

use crate::api::start_api_server;
use crate::runtime::NodeRuntime;
use mptd_core::{NodeConfig, StorageBackend, TrieResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// MPTD session server
pub struct MptdNode {
    runtime: Arc<NodeRuntime>,
}

impl MptdNode {
    /// Create a new node, opening its storage backend
    pub fn new(config: NodeConfig) -> TrieResult<Self> {
        let runtime = Arc::new(NodeRuntime::new(config)?);
        Ok(Self { runtime })
    }

    /// Serve until ctrl-c
    pub async fn start(&self) -> anyhow::Result<()> {
        info!("Starting MPTD node {}...", self.runtime.config().name);

        let api_runtime = self.runtime.clone();
        let api_addr = self.runtime.config().api.listen_addr.clone();

        let api_handle = tokio::spawn(async move {
            if let Err(e) = start_api_server(api_runtime, &api_addr).await {
                error!("API server error: {}", e);
            }
        });

        info!("Node started successfully");
        info!("Storage: {}", self.runtime.storage());

        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping node...");
            }
            Err(e) => {
                error!("Error waiting for shutdown signal: {}", e);
            }
        }

        api_handle.abort();

        info!("Node stopped with {} open sessions", self.runtime.session_count());

        Ok(())
    }

    /// Get runtime reference
    pub fn runtime(&self) -> &Arc<NodeRuntime> {
        &self.runtime
    }
}

/// Node builder for easier configuration
pub struct NodeBuilder {
    config: NodeConfig,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
        }
    }

    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api_addr(mut self, addr: &str) -> Self {
        self.config.api.listen_addr = addr.to_string();
        self
    }

    pub fn storage(mut self, backend: StorageBackend) -> Self {
        self.config.storage.backend = backend;
        self
    }

    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.data_dir = dir;
        self
    }

    pub fn cors(mut self, enable: bool) -> Self {
        self.config.api.enable_cors = enable;
        self
    }

    pub fn build(self) -> TrieResult<MptdNode> {
        MptdNode::new(self.config)
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
