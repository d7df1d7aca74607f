//! HTTP transport for the MPTD session server

use mptd_core::wire::*;
use mptd_core::{ClientConfig, Root, SessionId, TrieEntry, TrieError, TrieResult};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

/// Result of a root-moving write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Value stored under the key before the write
    pub previous: Option<Vec<u8>>,
    pub new_root: Root,
}

/// Checkpoint depth and session root after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointReport {
    pub depth: usize,
    pub root: Root,
}

/// API client for one MPTD server
pub struct ApiClient {
    base_url: String,
    client: Client,
}

fn transport(err: reqwest::Error) -> TrieError {
    TrieError::Network(err.to_string())
}

fn decode_value(value: Option<String>) -> TrieResult<Option<Vec<u8>>> {
    value.map(|v| decode_hex("value", &v)).transpose()
}

impl ApiClient {
    pub fn new(base_url: &str) -> TrieResult<Self> {
        Self::from_config(&ClientConfig {
            server_url: base_url.to_string(),
            ..ClientConfig::default()
        })
    }

    pub fn from_config(config: &ClientConfig) -> TrieResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(transport)?;

        Ok(Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<Req: Serialize>(&self, method: &str, req: &Req) -> TrieResult<Response> {
        let url = format!("{}/rpc/{}", self.base_url, method);
        trace!("POST {}", url);
        self.client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(transport)
    }

    /// Call an RPC method and unwrap the response envelope
    async fn call<Req, Resp>(&self, method: &str, req: &Req) -> TrieResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let resp = self.send(method, req).await?;
        let status = resp.status();
        let envelope: ApiResponse<Resp> = resp.json().await.map_err(|e| {
            TrieError::Network(format!("{} returned {}: {}", method, status, e))
        })?;

        let result = envelope.into_result();
        if let Err(e) = &result {
            debug!("{} failed with {}: {}", method, status, e);
        }
        result
    }

    // ============ Health ============

    pub async fn health(&self) -> TrieResult<bool> {
        let url = format!("{}/health", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(transport)?;
        Ok(resp.status().is_success())
    }

    pub async fn status(&self) -> TrieResult<StatusResponse> {
        let url = format!("{}/status", self.base_url);
        let envelope: ApiResponse<StatusResponse> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;
        envelope.into_result()
    }

    // ============ Sessions ============

    pub async fn initialize(&self) -> TrieResult<(SessionId, Root)> {
        let resp: InitializeResponse = self.call("initialize", &InitializeRequest {}).await?;
        Ok((SessionId::new(resp.id), Root::from_hex(&resp.root)?))
    }

    pub async fn get_root(&self, id: SessionId) -> TrieResult<Root> {
        let resp: GetRootResponse = self.call("get_root", &SessionRequest { id: id.0 }).await?;
        Root::from_hex(&resp.root)
    }

    pub async fn copy(&self, id: SessionId) -> TrieResult<(SessionId, Root)> {
        let resp: CopyResponse = self.call("copy", &SessionRequest { id: id.0 }).await?;
        Ok((SessionId::new(resp.id), Root::from_hex(&resp.root)?))
    }

    pub async fn check_root(&self, id: SessionId, root: Root) -> TrieResult<bool> {
        let req = RootRequest {
            id: id.0,
            root: root.to_hex(),
        };
        let resp: CheckRootResponse = self.call("check_root", &req).await?;
        Ok(resp.valid_root)
    }

    // ============ Reads ============

    pub async fn get(&self, id: SessionId, root: Root, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        let resp: GetResponse = self.call("get", &key_request(id, root, key)).await?;
        decode_value(resp.value)
    }

    pub async fn get_raw(
        &self,
        id: SessionId,
        root: Root,
        key: &[u8],
    ) -> TrieResult<Option<Vec<u8>>> {
        let resp: GetResponse = self.call("get_raw", &key_request(id, root, key)).await?;
        decode_value(resp.value)
    }

    /// Open a read stream over the session's entries at `root`
    pub async fn read_stream(&self, id: SessionId, root: Root) -> TrieResult<EntryStream> {
        let req = RootRequest {
            id: id.0,
            root: root.to_hex(),
        };
        let resp = self.send("read_stream", &req).await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let envelope: ApiResponse<()> = resp.json().await.map_err(|e| {
                TrieError::Network(format!("read_stream returned {}: {}", status, e))
            })?;
            envelope.into_result()?;
            return Err(TrieError::Network(format!("read_stream returned {}", status)));
        }

        Ok(EntryStream::new(resp))
    }

    // ============ Writes ============

    pub async fn put(
        &self,
        id: SessionId,
        root: Root,
        key: &[u8],
        value: &[u8],
    ) -> TrieResult<WriteOutcome> {
        let resp: PutResponse = self
            .call("put", &key_value_request(id, root, key, value))
            .await?;
        write_outcome(resp)
    }

    pub async fn put_raw(
        &self,
        id: SessionId,
        root: Root,
        key: &[u8],
        value: &[u8],
    ) -> TrieResult<Option<Vec<u8>>> {
        let resp: PutRawResponse = self
            .call("put_raw", &key_value_request(id, root, key, value))
            .await?;
        decode_value(resp.value)
    }

    pub async fn del(&self, id: SessionId, root: Root, key: &[u8]) -> TrieResult<WriteOutcome> {
        let resp: PutResponse = self.call("del", &key_request(id, root, key)).await?;
        write_outcome(resp)
    }

    // ============ Checkpoints ============

    pub async fn checkpoint(&self, id: SessionId) -> TrieResult<CheckpointReport> {
        self.transition("checkpoint", id).await
    }

    pub async fn commit(&self, id: SessionId) -> TrieResult<CheckpointReport> {
        self.transition("commit", id).await
    }

    pub async fn revert(&self, id: SessionId) -> TrieResult<CheckpointReport> {
        self.transition("revert", id).await
    }

    pub async fn in_checkpoint(&self, id: SessionId) -> TrieResult<bool> {
        let resp: InCheckpointResponse = self
            .call("in_checkpoint", &SessionRequest { id: id.0 })
            .await?;
        Ok(resp.result)
    }

    async fn transition(&self, method: &str, id: SessionId) -> TrieResult<CheckpointReport> {
        let resp: CheckpointResponse = self.call(method, &SessionRequest { id: id.0 }).await?;
        Ok(CheckpointReport {
            depth: resp.depth,
            root: Root::from_hex(&resp.root)?,
        })
    }
}

fn key_request(id: SessionId, root: Root, key: &[u8]) -> KeyRequest {
    KeyRequest {
        id: id.0,
        root: root.to_hex(),
        key: hex::encode(key),
    }
}

fn key_value_request(id: SessionId, root: Root, key: &[u8], value: &[u8]) -> KeyValueRequest {
    KeyValueRequest {
        id: id.0,
        root: root.to_hex(),
        key: hex::encode(key),
        value: hex::encode(value),
    }
}

fn write_outcome(resp: PutResponse) -> TrieResult<WriteOutcome> {
    let new_root = resp
        .new_root
        .ok_or_else(|| TrieError::Network("write response without new_root".to_string()))?;

    Ok(WriteOutcome {
        previous: decode_value(resp.value)?,
        new_root: Root::from_hex(&new_root)?,
    })
}

/// Entries pushed by the server, one NDJSON frame at a time
///
/// `next` yields `None` after the end frame. A body that closes before the
/// end frame yields a `StreamFailure`.
pub struct EntryStream {
    response: Response,
    buffer: Vec<u8>,
    finished: bool,
}

impl EntryStream {
    fn new(response: Response) -> Self {
        Self {
            response,
            buffer: Vec::new(),
            finished: false,
        }
    }

    pub async fn next(&mut self) -> Option<TrieResult<TrieEntry>> {
        if self.finished {
            return None;
        }

        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                let line = &line[..line.len() - 1];
                if line.is_empty() {
                    continue;
                }
                return self.frame(line);
            }

            match self.response.chunk().await {
                Ok(Some(bytes)) => self.buffer.extend_from_slice(&bytes),
                Ok(None) => {
                    return self.fail("stream closed without end frame".to_string());
                }
                Err(e) => return self.fail(e.to_string()),
            }
        }
    }

    fn frame(&mut self, line: &[u8]) -> Option<TrieResult<TrieEntry>> {
        match serde_json::from_slice::<StreamFrame>(line) {
            Ok(StreamFrame::Entry { key, value }) => {
                let entry = decode_hex("key", &key)
                    .and_then(|key| Ok(TrieEntry::new(key, decode_hex("value", &value)?)));
                Some(entry)
            }
            Ok(StreamFrame::End) => {
                self.finished = true;
                None
            }
            Ok(StreamFrame::Error { message }) => self.fail(message),
            Err(e) => self.fail(format!("malformed frame: {}", e)),
        }
    }

    fn fail(&mut self, message: String) -> Option<TrieResult<TrieEntry>> {
        self.finished = true;
        Some(Err(TrieError::StreamFailure(message)))
    }

    /// Drain the stream; any failure discards the partial result
    pub async fn collect(mut self) -> TrieResult<Vec<TrieEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await {
            entries.push(entry?);
        }
        Ok(entries)
    }
}
