//! Error types for MPTD

use crate::types::SessionId;
use thiserror::Error;

/// Main error type for MPTD
#[derive(Error, Debug)]
pub enum TrieError {
    // ============ Session Errors ============
    #[error("Unknown session {0}")]
    UnknownSession(SessionId),

    // ============ Validation Errors ============
    #[error("Invalid root length: expected 32 bytes, got {len}")]
    InvalidRoot { len: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ============ Checkpoint Errors ============
    #[error("Cannot {op} outside of a checkpoint")]
    IllegalCheckpointTransition { op: &'static str },

    // ============ Engine Errors ============
    #[error("Engine failure: {0}")]
    EngineFailure(String),

    #[error("Stream failure: {0}")]
    StreamFailure(String),

    // ============ Network Errors ============
    #[error("Network error: {0}")]
    Network(String),

    #[error("Message serialization failed: {0}")]
    Serialization(String),

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    Config(String),

    // ============ General Errors ============
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrieError {
    /// True for errors raised by the engine for a well-formed request.
    ///
    /// Such failures still carry `success: false` data on the wire.
    pub fn is_engine_failure(&self) -> bool {
        matches!(self, TrieError::EngineFailure(_))
    }
}

impl From<std::io::Error> for TrieError {
    fn from(err: std::io::Error) -> Self {
        TrieError::EngineFailure(err.to_string())
    }
}

impl From<bincode::Error> for TrieError {
    fn from(err: bincode::Error) -> Self {
        TrieError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for TrieError {
    fn from(err: serde_json::Error) -> Self {
        TrieError::Serialization(err.to_string())
    }
}

impl From<hex::FromHexError> for TrieError {
    fn from(err: hex::FromHexError) -> Self {
        TrieError::InvalidRequest(err.to_string())
    }
}
