//! Session registry
//!
//! Maps session ids to engines. Ids come from a monotonically increasing
//! counter and are never reused while the registry lives.

use dashmap::DashMap;
use mptd_core::{Root, SessionId, StorageBackend, TrieEngine, TrieError, TrieResult};
use mptd_state::{SecureTrie, StateBackend};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tracing::info;

/// Engine slot guarded by the session's lock
pub type EngineSlot = Box<dyn TrieEngine>;

/// One registered session
///
/// All work against the engine happens under its lock, so a root switch and
/// the operation that follows it are never interleaved with another caller.
pub struct Session {
    id: SessionId,
    engine: Arc<Mutex<EngineSlot>>,
}

impl Session {
    fn new(id: SessionId, engine: EngineSlot) -> Self {
        Self {
            id,
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub async fn lock(&self) -> MutexGuard<'_, EngineSlot> {
        self.engine.lock().await
    }

    /// Guard that can outlive the borrow of the session, for streams
    pub async fn lock_owned(&self) -> OwnedMutexGuard<EngineSlot> {
        self.engine.clone().lock_owned().await
    }
}

pub type SharedSession = Arc<Session>;

/// Registry of live sessions
pub struct SessionRegistry {
    backend: StateBackend,
    sessions: DashMap<SessionId, SharedSession>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new(backend: StateBackend) -> Self {
        Self {
            backend,
            sessions: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    fn allocate_id(&self) -> SessionId {
        SessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn register(&self, id: SessionId, engine: EngineSlot) {
        self.sessions.insert(id, Arc::new(Session::new(id, engine)));
    }

    /// Create a session over fresh storage
    pub fn create(&self) -> TrieResult<(SessionId, Root)> {
        let id = self.allocate_id();
        let store = self.backend.create_store(id)?;
        let engine = SecureTrie::new(store);
        let root = engine.root();

        self.register(id, Box::new(engine));
        info!("Session {} created at {}", id, root);

        Ok((id, root))
    }

    /// The single gatekeeper: every operation resolves its session here
    pub fn lookup(&self, id: SessionId) -> TrieResult<SharedSession> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(TrieError::UnknownSession(id))
    }

    /// Register a copy of `id` positioned at its current root
    pub async fn fork(&self, id: SessionId) -> TrieResult<(SessionId, Root)> {
        let source = self.lookup(id)?;
        let (engine, root) = {
            let engine = source.lock().await;
            (engine.copy(), engine.root())
        };

        let new_id = self.allocate_id();
        self.register(new_id, engine);
        info!("Session {} forked from {} at {}", new_id, id, root);

        Ok((new_id, root))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Issued ids in ascending order
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn storage(&self) -> StorageBackend {
        self.backend.kind()
    }
}
