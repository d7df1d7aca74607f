//! JSON wire format shared by the MPTD server and client
//!
//! Keys, values and roots travel as hex strings. An empty root string means
//! the empty trie.

use serde::{Deserialize, Serialize};

use crate::error::TrieError;
use crate::traits::TrieResult;
use crate::types::{Root, SessionId, TrieEntry};

/// Response envelope
///
/// `data` may be present together with `error` when the engine failed on a
/// well-formed request; in that case `data` carries `success: false`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: &TrieError) -> Self {
        Self {
            data: None,
            error: Some(ErrorBody::from(error)),
        }
    }

    pub fn failed(data: T, error: &TrieError) -> Self {
        Self {
            data: Some(data),
            error: Some(ErrorBody::from(error)),
        }
    }

    /// Collapse the envelope into a result; any error wins over data.
    pub fn into_result(self) -> TrieResult<T> {
        if let Some(error) = self.error {
            return Err(error.into());
        }
        self.data
            .ok_or_else(|| TrieError::Network("empty response".to_string()))
    }
}

/// Error category carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownSession,
    InvalidRoot,
    InvalidRequest,
    IllegalCheckpointTransition,
    EngineFailure,
    StreamFailure,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    /// Session the error refers to, for `UnknownSession`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<u64>,
    /// Offending length, for `InvalidRoot`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<usize>,
    /// Rejected operation, for `IllegalCheckpointTransition`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
}

impl ErrorBody {
    fn new(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            session: None,
            len: None,
            op: None,
        }
    }
}

impl From<&TrieError> for ErrorBody {
    fn from(err: &TrieError) -> Self {
        let message = err.to_string();
        match err {
            TrieError::UnknownSession(id) => Self {
                session: Some(id.0),
                ..Self::new(ErrorKind::UnknownSession, message)
            },
            TrieError::InvalidRoot { len } => Self {
                len: Some(*len),
                ..Self::new(ErrorKind::InvalidRoot, message)
            },
            TrieError::InvalidRequest(detail) => {
                Self::new(ErrorKind::InvalidRequest, detail.clone())
            }
            TrieError::IllegalCheckpointTransition { op } => Self {
                op: Some(op.to_string()),
                ..Self::new(ErrorKind::IllegalCheckpointTransition, message)
            },
            // Payload-carrying kinds send the bare payload; the receiver re-wraps it
            TrieError::EngineFailure(detail) => Self::new(ErrorKind::EngineFailure, detail.clone()),
            TrieError::StreamFailure(detail) => Self::new(ErrorKind::StreamFailure, detail.clone()),
            _ => Self::new(ErrorKind::Internal, message),
        }
    }
}

impl From<ErrorBody> for TrieError {
    fn from(body: ErrorBody) -> Self {
        match body.kind {
            ErrorKind::UnknownSession => {
                TrieError::UnknownSession(SessionId::new(body.session.unwrap_or_default()))
            }
            ErrorKind::InvalidRoot => TrieError::InvalidRoot {
                len: body.len.unwrap_or_default(),
            },
            ErrorKind::InvalidRequest => TrieError::InvalidRequest(body.message),
            ErrorKind::IllegalCheckpointTransition => TrieError::IllegalCheckpointTransition {
                op: checkpoint_op(body.op.as_deref()),
            },
            ErrorKind::EngineFailure => TrieError::EngineFailure(body.message),
            ErrorKind::StreamFailure => TrieError::StreamFailure(body.message),
            ErrorKind::Internal => TrieError::Other(anyhow::anyhow!(body.message)),
        }
    }
}

fn checkpoint_op(op: Option<&str>) -> &'static str {
    match op {
        Some("revert") => "revert",
        _ => "commit",
    }
}

// ============ Requests ============

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InitializeRequest {}

/// Request addressing a session only
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionRequest {
    pub id: u64,
}

/// Request addressing a session at a root
#[derive(Debug, Serialize, Deserialize)]
pub struct RootRequest {
    pub id: u64,
    #[serde(default)]
    pub root: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyRequest {
    pub id: u64,
    #[serde(default)]
    pub root: String,
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyValueRequest {
    pub id: u64,
    #[serde(default)]
    pub root: String,
    pub key: String,
    pub value: String,
}

// ============ Responses ============

#[derive(Debug, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub id: u64,
    pub root: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetRootResponse {
    pub root: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GetResponse {
    pub success: bool,
    pub value: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PutResponse {
    pub success: bool,
    /// Value stored under the key before the write
    pub value: Option<String>,
    pub new_root: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PutRawResponse {
    pub success: bool,
    /// Value stored under the key before the write
    pub value: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CheckRootResponse {
    pub success: bool,
    pub valid_root: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CopyResponse {
    pub id: u64,
    pub root: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckpointResponse {
    pub depth: usize,
    pub root: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InCheckpointResponse {
    pub result: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub name: String,
    pub sessions: usize,
    /// Issued session ids, ascending
    #[serde(default)]
    pub session_ids: Vec<u64>,
    pub storage: String,
}

/// One line of a read stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Entry { key: String, value: String },
    End,
    Error { message: String },
}

impl StreamFrame {
    pub fn entry(entry: &TrieEntry) -> Self {
        StreamFrame::Entry {
            key: hex::encode(&entry.key),
            value: hex::encode(&entry.value),
        }
    }

    /// Serialize as a single newline-terminated JSON line
    pub fn to_line(&self) -> TrieResult<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Decode a hex field, naming it in the error
pub fn decode_hex(field: &str, value: &str) -> TrieResult<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| TrieError::InvalidRequest(format!("{}: {}", field, e)))
}

pub fn decode_root(value: &str) -> TrieResult<Root> {
    Root::resolve(&decode_hex("root", value)?)
}
