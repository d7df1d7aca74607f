//! HTTP API for the MPTD node

use axum::{
    async_trait,
    body::Body,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mptd_core::wire::*;
use mptd_core::{SessionId, TrieError, TrieResult};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::runtime::NodeRuntime;
use crate::stream::StreamItem;

/// API state containing node runtime
pub type ApiState = Arc<NodeRuntime>;

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn status_for(err: &TrieError) -> StatusCode {
    match err {
        TrieError::UnknownSession(_) => StatusCode::NOT_FOUND,
        TrieError::InvalidRoot { .. } | TrieError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        TrieError::IllegalCheckpointTransition { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Reply with data, or with the error alone
fn reply<T: Serialize>(result: TrieResult<T>) -> Reply<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))),
        Err(e) => {
            warn!("Request failed: {}", e);
            (status_for(&e), Json(ApiResponse::err(&e)))
        }
    }
}

/// JSON body extractor whose rejections use the API envelope
pub struct RpcJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for RpcJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = Reply<()>;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(RpcJson(value)),
            Err(rejection) => Err(reply(Err(TrieError::InvalidRequest(rejection.body_text())))),
        }
    }
}

/// Like `reply`, but engine failures still carry `success: false` data
fn reply_flagged<T: Serialize + Default>(result: TrieResult<T>) -> Reply<T> {
    match result {
        Err(e) if e.is_engine_failure() => {
            warn!("Engine failure: {}", e);
            (status_for(&e), Json(ApiResponse::failed(T::default(), &e)))
        }
        other => reply(other),
    }
}

fn hex_opt(value: Option<Vec<u8>>) -> Option<String> {
    value.map(hex::encode)
}

/// Create API router
pub fn create_router(state: ApiState) -> Router {
    let enable_cors = state.config().api.enable_cors;

    let router = Router::new()
        // Health
        .route("/health", get(health))
        .route("/status", get(status))
        // Sessions
        .route("/rpc/initialize", post(initialize))
        .route("/rpc/get_root", post(get_root))
        .route("/rpc/copy", post(copy))
        .route("/rpc/check_root", post(check_root))
        // Reads
        .route("/rpc/get", post(get_value))
        .route("/rpc/get_raw", post(get_raw))
        .route("/rpc/read_stream", post(read_stream))
        // Writes
        .route("/rpc/put", post(put))
        .route("/rpc/put_raw", post(put_raw))
        .route("/rpc/del", post(del))
        // Checkpoints
        .route("/rpc/checkpoint", post(checkpoint))
        .route("/rpc/in_checkpoint", post(in_checkpoint))
        .route("/rpc/commit", post(commit))
        .route("/rpc/revert", post(revert))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Node status
async fn status(State(runtime): State<ApiState>) -> impl IntoResponse {
    let status = StatusResponse {
        name: runtime.config().name.clone(),
        sessions: runtime.session_count(),
        session_ids: runtime.session_ids().into_iter().map(|id| id.0).collect(),
        storage: runtime.storage().to_string(),
    };

    Json(ApiResponse::ok(status))
}

async fn initialize(
    State(runtime): State<ApiState>,
    RpcJson(_req): RpcJson<InitializeRequest>,
) -> impl IntoResponse {
    reply(
        runtime
            .initialize()
            .map(|(id, root)| InitializeResponse {
                id: id.0,
                root: root.to_hex(),
            }),
    )
}

async fn get_root(
    State(runtime): State<ApiState>,
    RpcJson(req): RpcJson<SessionRequest>,
) -> impl IntoResponse {
    let result = runtime.get_root(SessionId::new(req.id)).await;
    reply(result.map(|root| GetRootResponse {
        root: root.to_hex(),
    }))
}

async fn copy(State(runtime): State<ApiState>, RpcJson(req): RpcJson<SessionRequest>) -> impl IntoResponse {
    let result = runtime.copy(SessionId::new(req.id)).await;
    reply(result.map(|(id, root)| CopyResponse {
        id: id.0,
        root: root.to_hex(),
    }))
}

async fn check_root(
    State(runtime): State<ApiState>,
    RpcJson(req): RpcJson<RootRequest>,
) -> impl IntoResponse {
    let result = async {
        let root = decode_root(&req.root)?;
        runtime.check_root(SessionId::new(req.id), root).await
    }
    .await;

    reply_flagged(result.map(|valid| CheckRootResponse {
        success: valid,
        valid_root: valid,
    }))
}

/// Get value through the trie
async fn get_value(
    State(runtime): State<ApiState>,
    RpcJson(req): RpcJson<KeyRequest>,
) -> impl IntoResponse {
    let result = async {
        let root = decode_root(&req.root)?;
        let key = decode_hex("key", &req.key)?;
        runtime.get(SessionId::new(req.id), root, &key).await
    }
    .await;

    reply_flagged(result.map(|value| GetResponse {
        success: value.is_some(),
        value: hex_opt(value),
    }))
}

/// Get value straight from node storage
async fn get_raw(
    State(runtime): State<ApiState>,
    RpcJson(req): RpcJson<KeyRequest>,
) -> impl IntoResponse {
    let result = async {
        let root = decode_root(&req.root)?;
        let key = decode_hex("key", &req.key)?;
        runtime.get_raw(SessionId::new(req.id), root, &key).await
    }
    .await;

    reply_flagged(result.map(|value| GetResponse {
        success: value.is_some(),
        value: hex_opt(value),
    }))
}

async fn put(
    State(runtime): State<ApiState>,
    RpcJson(req): RpcJson<KeyValueRequest>,
) -> impl IntoResponse {
    let result = async {
        let root = decode_root(&req.root)?;
        let key = decode_hex("key", &req.key)?;
        let value = decode_hex("value", &req.value)?;
        runtime.put(SessionId::new(req.id), root, &key, &value).await
    }
    .await;

    reply_flagged(result.map(|mutation| PutResponse {
        success: true,
        value: hex_opt(mutation.previous),
        new_root: Some(mutation.new_root.to_hex()),
    }))
}

async fn put_raw(
    State(runtime): State<ApiState>,
    RpcJson(req): RpcJson<KeyValueRequest>,
) -> impl IntoResponse {
    let result = async {
        let root = decode_root(&req.root)?;
        let key = decode_hex("key", &req.key)?;
        let value = decode_hex("value", &req.value)?;
        runtime.put_raw(SessionId::new(req.id), root, &key, &value).await
    }
    .await;

    reply_flagged(result.map(|previous| PutRawResponse {
        success: true,
        value: hex_opt(previous),
    }))
}

async fn del(State(runtime): State<ApiState>, RpcJson(req): RpcJson<KeyRequest>) -> impl IntoResponse {
    let result = async {
        let root = decode_root(&req.root)?;
        let key = decode_hex("key", &req.key)?;
        runtime.del(SessionId::new(req.id), root, &key).await
    }
    .await;

    reply_flagged(result.map(|mutation| PutResponse {
        success: true,
        value: hex_opt(mutation.previous),
        new_root: Some(mutation.new_root.to_hex()),
    }))
}

/// Stream entries as newline-delimited JSON frames
async fn read_stream(
    State(runtime): State<ApiState>,
    RpcJson(req): RpcJson<RootRequest>,
) -> Response {
    let opened = async {
        let root = decode_root(&req.root)?;
        runtime.read_stream(SessionId::new(req.id), root).await
    }
    .await;

    let rx = match opened {
        Ok(rx) => rx,
        Err(e) => return reply::<()>(Err(e)).into_response(),
    };

    let frames = ReceiverStream::new(rx).map(|item| Ok::<_, Infallible>(frame_line(item)));

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(frames),
    )
        .into_response()
}

fn frame_line(item: StreamItem) -> String {
    let frame = match item {
        StreamItem::Entry(entry) => StreamFrame::entry(&entry),
        StreamItem::End => StreamFrame::End,
        StreamItem::Failed(e) => StreamFrame::Error {
            message: e.to_string(),
        },
    };
    frame
        .to_line()
        .unwrap_or_else(|_| "{\"type\":\"error\",\"message\":\"frame encoding failed\"}\n".to_string())
}

async fn checkpoint(
    State(runtime): State<ApiState>,
    RpcJson(req): RpcJson<SessionRequest>,
) -> impl IntoResponse {
    let result = runtime.checkpoint(SessionId::new(req.id)).await;
    reply(result.map(|outcome| CheckpointResponse {
        depth: outcome.state.depth(),
        root: outcome.root.to_hex(),
    }))
}

async fn in_checkpoint(
    State(runtime): State<ApiState>,
    RpcJson(req): RpcJson<SessionRequest>,
) -> impl IntoResponse {
    let result = runtime.in_checkpoint(SessionId::new(req.id)).await;
    reply(result.map(|result| InCheckpointResponse { result }))
}

async fn commit(
    State(runtime): State<ApiState>,
    RpcJson(req): RpcJson<SessionRequest>,
) -> impl IntoResponse {
    let result = runtime.commit(SessionId::new(req.id)).await;
    reply(result.map(|outcome| CheckpointResponse {
        depth: outcome.state.depth(),
        root: outcome.root.to_hex(),
    }))
}

async fn revert(
    State(runtime): State<ApiState>,
    RpcJson(req): RpcJson<SessionRequest>,
) -> impl IntoResponse {
    let result = runtime.revert(SessionId::new(req.id)).await;
    reply(result.map(|outcome| CheckpointResponse {
        depth: outcome.state.depth(),
        root: outcome.root.to_hex(),
    }))
}

/// Serve the API on an already bound listener
pub async fn serve(runtime: Arc<NodeRuntime>, listener: TcpListener) -> anyhow::Result<()> {
    let router = create_router(runtime);
    axum::serve(listener, router).await?;
    Ok(())
}

/// Start API server
pub async fn start_api_server(runtime: Arc<NodeRuntime>, listen_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!("API server listening on {}", listen_addr);

    serve(runtime, listener).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use mptd_core::Root;
    use tower::ServiceExt;

    async fn call(router: Router, path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn router() -> Router {
        create_router(Arc::new(NodeRuntime::in_memory()))
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let (status, body) = call(
            router(),
            "/rpc/get",
            serde_json::json!({"id": 999, "root": "", "key": "6b31"}),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["kind"], "unknown_session");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_short_root_is_400() {
        let app = router();
        let (status, _) = call(app.clone(), "/rpc/initialize", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            app,
            "/rpc/get",
            serde_json::json!({"id": 0, "root": "abcd", "key": "00"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "invalid_root");
        assert_eq!(body["error"]["len"], 2);
    }

    #[tokio::test]
    async fn test_put_get_over_http() {
        let app = router();
        let (_, init) = call(app.clone(), "/rpc/initialize", serde_json::json!({})).await;
        assert_eq!(init["data"]["id"], 0);
        assert_eq!(init["data"]["root"], Root::EMPTY.to_hex());

        let (status, put) = call(
            app.clone(),
            "/rpc/put",
            serde_json::json!({"id": 0, "root": "", "key": hex::encode("k1"), "value": hex::encode("v1")}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(put["data"]["success"], true);
        let new_root = put["data"]["new_root"].as_str().unwrap().to_string();

        let (_, got) = call(
            app.clone(),
            "/rpc/get",
            serde_json::json!({"id": 0, "root": new_root, "key": hex::encode("k1")}),
        )
        .await;
        assert_eq!(got["data"]["success"], true);
        assert_eq!(got["data"]["value"], hex::encode("v1"));

        // Absent key: no error, success false
        let (status, missing) = call(
            app,
            "/rpc/get",
            serde_json::json!({"id": 0, "root": new_root, "key": hex::encode("nope")}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(missing["data"]["success"], false);
        assert!(missing["data"]["value"].is_null());
        assert!(missing["error"].is_null());
    }

    #[tokio::test]
    async fn test_malformed_body_uses_envelope() {
        let (status, body) = call(router(), "/rpc/get_root", serde_json::json!({"id": "zero"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "invalid_request");
        assert!(body["data"].is_null());

        let (status, body) = call(router(), "/rpc/put", serde_json::json!({"id": 0, "key": "00"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn test_commit_outside_checkpoint_is_409() {
        let app = router();
        call(app.clone(), "/rpc/initialize", serde_json::json!({})).await;

        let (status, body) = call(app, "/rpc/commit", serde_json::json!({"id": 0})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["kind"], "illegal_checkpoint_transition");
        assert_eq!(body["error"]["op"], "commit");
    }

    #[tokio::test]
    async fn test_engine_failure_keeps_flagged_data() {
        let app = router();
        call(app.clone(), "/rpc/initialize", serde_json::json!({})).await;

        // A well-formed root with no nodes behind it
        let (status, body) = call(
            app,
            "/rpc/get",
            serde_json::json!({"id": 0, "root": hex::encode([0x33u8; 32]), "key": "00"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["kind"], "engine_failure");
        assert_eq!(body["data"]["success"], false);
    }
}
