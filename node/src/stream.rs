//! Server-push enumeration of a session's entries
//!
//! The producer task owns the session lock until it finishes, so no mutation
//! on the same session can interleave with a running stream. Dropping the
//! receiver stops the producer and releases the lock.

use mptd_core::{Root, TrieEntry, TrieError};
use tokio::sync::{mpsc, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::gateway::switch_root;
use crate::registry::{EngineSlot, SharedSession};

/// One event of a read stream
#[derive(Debug)]
pub enum StreamItem {
    Entry(TrieEntry),
    /// Enumeration completed
    End,
    /// Enumeration aborted; nothing follows
    Failed(TrieError),
}

/// Lock the session at `root` and start pushing its entries
pub async fn open(session: SharedSession, root: Root, buffer: usize) -> mpsc::Receiver<StreamItem> {
    let (tx, rx) = mpsc::channel(buffer.max(1));

    let mut engine = session.lock_owned().await;
    let previous = engine.root();
    switch_root(&mut **engine, root);
    debug!("Read stream opened on session {} at {}", session.id(), root);

    tokio::spawn(produce(engine, previous, tx));
    rx
}

async fn produce(
    mut engine: OwnedMutexGuard<EngineSlot>,
    previous: Root,
    tx: mpsc::Sender<StreamItem>,
) {
    let mut sent = 0usize;
    let mut failure = None;

    for item in engine.entries() {
        match item {
            Ok(entry) => {
                if tx.send(StreamItem::Entry(entry)).await.is_err() {
                    debug!("Read stream reader went away after {} entries", sent);
                    return;
                }
                sent += 1;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    match failure {
        Some(e) => {
            warn!("Read stream failed after {} entries: {}", sent, e);
            engine.set_root(previous);
            let _ = tx.send(StreamItem::Failed(e)).await;
        }
        None => {
            debug!("Read stream finished with {} entries", sent);
            let _ = tx.send(StreamItem::End).await;
        }
    }
}
