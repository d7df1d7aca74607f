//! Node runtime: every remote operation, addressed by session and root

use mptd_core::{NodeConfig, Root, SessionId, StorageBackend, TrieEngine, TrieResult};
use mptd_state::StateBackend;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::checkpoint::{self, CheckpointOutcome};
use crate::gateway::with_root;
use crate::registry::SessionRegistry;
use crate::stream::{self, StreamItem};

/// Result of a root-moving write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Value stored under the key before the write
    pub previous: Option<Vec<u8>>,
    pub new_root: Root,
}

/// Node runtime owning the session registry
pub struct NodeRuntime {
    config: NodeConfig,
    registry: SessionRegistry,
}

impl NodeRuntime {
    /// Create a runtime, opening the configured storage backend
    pub fn new(config: NodeConfig) -> TrieResult<Self> {
        let backend = StateBackend::open(&config.storage)?;
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: NodeConfig, backend: StateBackend) -> Self {
        info!("Runtime using {} storage", backend.kind());
        Self {
            config,
            registry: SessionRegistry::new(backend),
        }
    }

    /// Runtime over in-memory storage with default settings
    pub fn in_memory() -> Self {
        Self::with_backend(NodeConfig::default(), StateBackend::memory())
    }

    /// Lock the session, point it at `root` and run `op`
    async fn at_root<T, F>(&self, id: SessionId, root: Root, op: F) -> TrieResult<T>
    where
        F: FnOnce(&mut dyn TrieEngine) -> TrieResult<T>,
    {
        let session = self.registry.lookup(id)?;
        let mut engine = session.lock().await;
        with_root(&mut **engine, root, op)
    }

    /// Lock the session and run `op` against its current root
    async fn current<T, F>(&self, id: SessionId, op: F) -> TrieResult<T>
    where
        F: FnOnce(&mut dyn TrieEngine) -> TrieResult<T>,
    {
        let session = self.registry.lookup(id)?;
        let mut engine = session.lock().await;
        op(&mut **engine)
    }

    // ============ Sessions ============

    pub fn initialize(&self) -> TrieResult<(SessionId, Root)> {
        self.registry.create()
    }

    pub async fn copy(&self, id: SessionId) -> TrieResult<(SessionId, Root)> {
        self.registry.fork(id).await
    }

    pub async fn get_root(&self, id: SessionId) -> TrieResult<Root> {
        self.current(id, |engine| Ok(engine.root())).await
    }

    pub async fn check_root(&self, id: SessionId, root: Root) -> TrieResult<bool> {
        self.current(id, |engine| engine.check_root(&root)).await
    }

    // ============ Reads ============

    pub async fn get(&self, id: SessionId, root: Root, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        self.at_root(id, root, |engine| engine.get(key)).await
    }

    pub async fn get_raw(
        &self,
        id: SessionId,
        root: Root,
        key: &[u8],
    ) -> TrieResult<Option<Vec<u8>>> {
        self.at_root(id, root, |engine| engine.get_raw(key)).await
    }

    /// Lock the session at `root` and stream its entries
    pub async fn read_stream(
        &self,
        id: SessionId,
        root: Root,
    ) -> TrieResult<mpsc::Receiver<StreamItem>> {
        let session = self.registry.lookup(id)?;
        Ok(stream::open(session, root, self.config.api.stream_buffer).await)
    }

    // ============ Writes ============

    pub async fn put(
        &self,
        id: SessionId,
        root: Root,
        key: &[u8],
        value: &[u8],
    ) -> TrieResult<Mutation> {
        let mutation = self
            .at_root(id, root, |engine| {
                let previous = engine.get(key)?;
                engine.put(key, value)?;
                Ok(Mutation {
                    previous,
                    new_root: engine.root(),
                })
            })
            .await?;
        debug!("put on {}: {} -> {}", id, root, mutation.new_root);
        Ok(mutation)
    }

    /// Raw write; the session's root does not move
    pub async fn put_raw(
        &self,
        id: SessionId,
        root: Root,
        key: &[u8],
        value: &[u8],
    ) -> TrieResult<Option<Vec<u8>>> {
        self.at_root(id, root, |engine| {
            let previous = engine.get_raw(key)?;
            engine.put_raw(key, value)?;
            Ok(previous)
        })
        .await
    }

    pub async fn del(&self, id: SessionId, root: Root, key: &[u8]) -> TrieResult<Mutation> {
        let mutation = self
            .at_root(id, root, |engine| {
                let previous = engine.get(key)?;
                engine.del(key)?;
                Ok(Mutation {
                    previous,
                    new_root: engine.root(),
                })
            })
            .await?;
        debug!("del on {}: {} -> {}", id, root, mutation.new_root);
        Ok(mutation)
    }

    // ============ Checkpoints ============

    pub async fn checkpoint(&self, id: SessionId) -> TrieResult<CheckpointOutcome> {
        self.current(id, |engine| Ok(checkpoint::begin(engine))).await
    }

    pub async fn commit(&self, id: SessionId) -> TrieResult<CheckpointOutcome> {
        self.current(id, checkpoint::commit).await
    }

    pub async fn revert(&self, id: SessionId) -> TrieResult<CheckpointOutcome> {
        self.current(id, checkpoint::revert).await
    }

    pub async fn in_checkpoint(&self, id: SessionId) -> TrieResult<bool> {
        self.current(id, |engine| Ok(checkpoint::in_checkpoint(engine)))
            .await
    }

    // ============ Status ============

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.ids()
    }

    pub fn storage(&self) -> StorageBackend {
        self.registry.storage()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}
