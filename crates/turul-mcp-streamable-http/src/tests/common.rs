//! Shared fixtures for transport tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use parking_lot::Mutex;
use serde_json::{Value, json};

use turul_mcp_json_rpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcResponse, RequestId};

use crate::{
    MessageContext, MessageHandler, StreamableHttpTransport, StreamableHttpTransportBuilder,
    TransportBody, TransportError,
};

/// Records every callback; replies inline when `auto_reply` is set
#[derive(Default)]
pub struct RecordingHandler {
    pub messages: Mutex<Vec<JsonRpcMessage>>,
    pub contexts: Mutex<Vec<MessageContext>>,
    pub initialized: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub closes: AtomicUsize,
    pub auto_reply: bool,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn replying() -> Arc<Self> {
        Arc::new(Self {
            auto_reply: true,
            ..Self::default()
        })
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn on_message(&self, message: JsonRpcMessage, context: MessageContext) {
        self.messages.lock().push(message.clone());
        self.contexts.lock().push(context.clone());
        if self.auto_reply
            && let JsonRpcMessage::Request(request) = message
        {
            let reply = JsonRpcResponse::success(request.id, json!({"method": request.method}));
            // a stream dropped by the test before delivery leaves the id unbound
            let _ = context.transport().send(reply.into(), None).await;
        }
    }

    async fn on_session_initialized(&self, session_id: &str) {
        self.initialized.lock().push(session_id.to_string());
    }

    async fn on_error(&self, error: &TransportError) {
        self.errors.lock().push(error.to_string());
    }

    async fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builder with keepalives disabled so streams only carry messages
pub fn builder(handler: &Arc<RecordingHandler>) -> StreamableHttpTransportBuilder {
    StreamableHttpTransport::builder()
        .shared_handler(handler.clone())
        .keepalive_interval(None)
}

pub fn init_request(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        }
    })
}

pub fn call(id: i64, method: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": {"n": id}})
}

pub fn notification(method: &str) -> Value {
    json!({"jsonrpc": "2.0", "method": method})
}

pub fn reply(id: i64) -> JsonRpcMessage {
    JsonRpcResponse::success(RequestId::Number(id), json!({"answer": id})).into()
}

pub fn progress(n: i64) -> JsonRpcMessage {
    let params = json!({"progressToken": "t", "progress": n});
    JsonRpcNotification::new(
        "notifications/progress",
        params.as_object().cloned().map(Into::into),
    )
    .into()
}

pub fn post(body: &Value, session_id: Option<&str>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("accept", "application/json, text/event-stream")
        .header("content-type", "application/json");
    if let Some(session_id) = session_id {
        builder = builder.header("mcp-session-id", session_id);
    }
    builder
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

pub fn get(session_id: Option<&str>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method("GET")
        .uri("/mcp")
        .header("accept", "text/event-stream");
    if let Some(session_id) = session_id {
        builder = builder.header("mcp-session-id", session_id);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

pub fn delete(session_id: Option<&str>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder().method("DELETE").uri("/mcp");
    if let Some(session_id) = session_id {
        builder = builder.header("mcp-session-id", session_id);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

/// Initialize the transport and return the issued session id. The init
/// stream is dropped straight away.
pub async fn initialize(transport: &StreamableHttpTransport) -> String {
    let response = transport.handle(post(&init_request(0), None)).await;
    assert_eq!(response.status(), 200);
    response.headers()["mcp-session-id"]
        .to_str()
        .unwrap()
        .to_string()
}

pub fn session_header(response: &Response<TransportBody>) -> Option<String> {
    response
        .headers()
        .get("mcp-session-id")
        .map(|value| value.to_str().unwrap().to_string())
}

pub async fn body_bytes(response: Response<TransportBody>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<TransportBody>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// One SSE event as seen on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct WireEvent {
    pub id: Option<String>,
    pub data: Value,
}

/// Next event on an SSE body; `None` when the stream ended or stayed idle
pub async fn next_event(body: &mut TransportBody) -> Option<WireEvent> {
    let frame = tokio::time::timeout(Duration::from_millis(500), body.frame())
        .await
        .ok()??
        .ok()?;
    let data = frame.into_data().ok()?;
    Some(parse_event(std::str::from_utf8(&data).unwrap()))
}

/// True once the SSE body has finished
pub async fn stream_ended(body: &mut TransportBody) -> bool {
    matches!(
        tokio::time::timeout(Duration::from_millis(500), body.frame()).await,
        Ok(None)
    )
}

pub fn parse_event(text: &str) -> WireEvent {
    let mut id = None;
    let mut data = None;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("id: ") {
            id = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("data: ") {
            data = Some(serde_json::from_str(rest).unwrap());
        }
    }
    WireEvent {
        id,
        data: data.expect("event without data line"),
    }
}

/// Poll `condition` until it holds or a second passes
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
