//! MPTD Node Implementation
//!
//! Session server exposing remote Merkle Patricia Tries:
//! - Session registry and forking
//! - Root-addressed reads and writes
//! - Checkpoint transitions
//! - Streaming enumeration
//! - HTTP API

mod api;
mod checkpoint;
mod gateway;
mod node;
mod registry;
mod runtime;
mod stream;

pub use api::*;
pub use checkpoint::{CheckpointOutcome, CheckpointState};
pub use node::*;
pub use registry::{Session, SessionRegistry, SharedSession};
pub use runtime::*;
pub use stream::StreamItem;
