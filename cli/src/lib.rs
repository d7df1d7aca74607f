//! MPTD client library
//!
//! `ApiClient` speaks the server's HTTP protocol; `TrieClient` wraps it in a
//! per-session view that tracks the session root.

pub mod client;
pub mod view;

pub use client::{ApiClient, CheckpointReport, EntryStream, WriteOutcome};
pub use view::TrieClient;
