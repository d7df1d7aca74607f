//! Client-side view of one remote session
//!
//! A `TrieClient` remembers the root it believes the session is at. Reads
//! are addressed to that root and leave it alone; writes adopt the root the
//! server reports. A view without a root fetches it on first use.

use mptd_core::{Root, SessionId, TrieResult};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::client::{ApiClient, CheckpointReport, EntryStream};

pub struct TrieClient {
    api: Arc<ApiClient>,
    id: SessionId,
    root: Mutex<Option<Root>>,
}

impl TrieClient {
    /// Open a new session on the server
    pub async fn initialize(api: Arc<ApiClient>) -> TrieResult<Self> {
        let (id, root) = api.initialize().await?;
        debug!("Initialized session {} at {}", id, root);
        Ok(Self::with_root(api, id, root))
    }

    /// View of an existing session; the root is fetched lazily
    pub fn attach(api: Arc<ApiClient>, id: SessionId) -> Self {
        Self {
            api,
            id,
            root: Mutex::new(None),
        }
    }

    pub fn with_root(api: Arc<ApiClient>, id: SessionId, root: Root) -> Self {
        Self {
            api,
            id,
            root: Mutex::new(Some(root)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Lock the believed root, fetching it from the server if unknown
    async fn resolved(&self) -> TrieResult<(MutexGuard<'_, Option<Root>>, Root)> {
        let mut guard = self.root.lock().await;
        let root = match *guard {
            Some(root) => root,
            None => {
                let root = self.api.get_root(self.id).await?;
                debug!("Session {} resolved to {}", self.id, root);
                *guard = Some(root);
                root
            }
        };
        Ok((guard, root))
    }

    /// The root this view addresses
    pub async fn root(&self) -> TrieResult<Root> {
        let (_, root) = self.resolved().await?;
        Ok(root)
    }

    // ============ Reads ============

    pub async fn get(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        let root = self.root().await?;
        self.api.get(self.id, root, key).await
    }

    pub async fn get_raw(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        let root = self.root().await?;
        self.api.get_raw(self.id, root, key).await
    }

    pub async fn check_root(&self, root: Root) -> TrieResult<bool> {
        self.api.check_root(self.id, root).await
    }

    pub async fn read_stream(&self) -> TrieResult<EntryStream> {
        let root = self.root().await?;
        self.api.read_stream(self.id, root).await
    }

    // ============ Writes ============

    /// Store `value` under `key`; returns the value it replaced
    pub async fn put(&self, key: &[u8], value: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        let (mut guard, root) = self.resolved().await?;
        let outcome = self.api.put(self.id, root, key, value).await?;
        *guard = Some(outcome.new_root);
        Ok(outcome.previous)
    }

    /// Write straight to node storage; the believed root is kept
    pub async fn put_raw(&self, key: &[u8], value: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        let (_guard, root) = self.resolved().await?;
        self.api.put_raw(self.id, root, key, value).await
    }

    pub async fn del(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        let (mut guard, root) = self.resolved().await?;
        let outcome = self.api.del(self.id, root, key).await?;
        *guard = Some(outcome.new_root);
        Ok(outcome.previous)
    }

    // ============ Sessions ============

    /// Fork the session; the new view starts at this view's root
    pub async fn copy(&self) -> TrieResult<TrieClient> {
        let believed = *self.root.lock().await;
        let (id, server_root) = self.api.copy(self.id).await?;
        let root = believed.unwrap_or(server_root);
        debug!("Copied session {} to {} at {}", self.id, id, root);
        Ok(Self::with_root(self.api.clone(), id, root))
    }

    // ============ Checkpoints ============

    pub async fn checkpoint(&self) -> TrieResult<CheckpointReport> {
        self.api.checkpoint(self.id).await
    }

    pub async fn commit(&self) -> TrieResult<CheckpointReport> {
        self.api.commit(self.id).await
    }

    /// Discard the innermost checkpoint and adopt the restored root
    pub async fn revert(&self) -> TrieResult<CheckpointReport> {
        let mut guard = self.root.lock().await;
        let report = self.api.revert(self.id).await?;
        *guard = Some(report.root);
        Ok(report)
    }

    pub async fn in_checkpoint(&self) -> TrieResult<bool> {
        self.api.in_checkpoint(self.id).await
    }
}
