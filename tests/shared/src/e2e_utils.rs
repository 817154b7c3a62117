//! Shared E2E Test Utilities

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use turul_mcp_event_store::InMemoryEventStore;
use turul_mcp_json_rpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcResponse, RequestId};
use turul_mcp_streamable_http::{
    MessageContext, MessageHandler, StreamableHttpServer, StreamableHttpTransport,
};

/// How long a reader waits for the next SSE chunk
const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Echo application used by every E2E test.
///
/// - `initialize` answers with a minimal server info block
/// - `notify` pushes a `notifications/message` onto the standalone stream
///   before replying
/// - `countdown` replies from a background task after three progress
///   notifications spaced `intervalMs` apart and a final `replyAfterMs` wait
/// - anything else echoes its params, preceded by two progress
///   notifications when `_meta.progressToken` is set
pub struct EchoHandler;

impl EchoHandler {
    fn progress(token: &Value, progress: u64, total: u64) -> JsonRpcMessage {
        let params = json!({"progressToken": token, "progress": progress, "total": total});
        JsonRpcNotification::new(
            "notifications/progress",
            params.as_object().cloned().map(Into::into),
        )
        .into()
    }

    async fn countdown(transport: StreamableHttpTransport, id: RequestId, params: Value) {
        let interval = Duration::from_millis(params["intervalMs"].as_u64().unwrap_or(100));
        let reply_after = Duration::from_millis(params["replyAfterMs"].as_u64().unwrap_or(0));
        let token = json!(format!("countdown-{}", id));

        for progress in 1..=3 {
            if let Err(e) = transport
                .send(Self::progress(&token, progress, 3), Some(id.clone()))
                .await
            {
                warn!("countdown progress failed: {}", e);
            }
            tokio::time::sleep(interval).await;
        }
        tokio::time::sleep(reply_after).await;

        let reply = JsonRpcResponse::success(id, json!({"done": true}));
        if let Err(e) = transport.send(reply.into(), None).await {
            warn!("countdown reply failed: {}", e);
        }
    }
}

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn on_message(&self, message: JsonRpcMessage, context: MessageContext) {
        let request = match message {
            JsonRpcMessage::Request(request) => request,
            other => {
                debug!("echo ignores {:?}", other.method());
                return;
            }
        };
        let transport = context.transport().clone();
        let params = request
            .params
            .as_ref()
            .map(|params| params.to_value())
            .unwrap_or(Value::Null);

        let result = match request.method.as_str() {
            "initialize" => json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "serverInfo": {"name": "echo", "version": "1.0.0"}
            }),
            "countdown" => {
                tokio::spawn(Self::countdown(transport, request.id, params));
                return;
            }
            "notify" => {
                let note = JsonRpcNotification::new(
                    "notifications/message",
                    json!({"level": "info", "data": params}).as_object().cloned().map(Into::into),
                );
                if let Err(e) = transport.send(note.into(), None).await {
                    warn!("notify failed: {}", e);
                }
                json!({"notified": true})
            }
            method => {
                if let Some(token) = params.pointer("/_meta/progressToken") {
                    for progress in 1..=2 {
                        let _ = transport
                            .send(Self::progress(token, progress, 2), Some(request.id.clone()))
                            .await;
                    }
                }
                json!({"method": method, "echo": params})
            }
        };

        let reply = JsonRpcResponse::success(request.id, result);
        if let Err(e) = transport.send(reply.into(), None).await {
            warn!("echo reply failed: {}", e);
        }
    }
}

/// In-process server bound to an ephemeral port; stopped on drop
pub struct TestServer {
    addr: SocketAddr,
    server: StreamableHttpServer,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start<F>(factory: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn() -> StreamableHttpTransport + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = StreamableHttpServer::builder()
            .bind_address(addr)
            .transport_factory(factory)
            .build()?;

        let runner = server.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = runner.serve(listener).await {
                warn!("test server stopped: {}", e);
            }
        });
        debug!("test server on {}", addr);
        Ok(Self { addr, server, task })
    }

    /// SSE replies, sessions, no event store
    pub async fn streaming() -> Result<Self, Box<dyn std::error::Error>> {
        let handler = Arc::new(EchoHandler);
        Self::start(move || {
            StreamableHttpTransport::builder()
                .shared_handler(handler.clone())
                .build()
        })
        .await
    }

    /// Buffered JSON replies
    pub async fn json() -> Result<Self, Box<dyn std::error::Error>> {
        let handler = Arc::new(EchoHandler);
        Self::start(move || {
            StreamableHttpTransport::builder()
                .shared_handler(handler.clone())
                .json_response(true)
                .build()
        })
        .await
    }

    /// SSE replies with one in-memory event store per session
    pub async fn resumable() -> Result<Self, Box<dyn std::error::Error>> {
        let handler = Arc::new(EchoHandler);
        Self::start(move || {
            StreamableHttpTransport::builder()
                .shared_handler(handler.clone())
                .event_store(Arc::new(InMemoryEventStore::new()))
                .build()
        })
        .await
    }

    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr, self.server.config().mcp_path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn server(&self) -> &StreamableHttpServer {
        &self.server
    }

    pub fn client(&self) -> McpTestClient {
        McpTestClient::new(self.url())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Minimal MCP client speaking raw HTTP
#[derive(Clone)]
pub struct McpTestClient {
    client: Client,
    url: String,
    session_id: Option<String>,
}

impl McpTestClient {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
            session_id: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn set_session_id(&mut self, session_id: Option<String>) {
        self.session_id = session_id;
    }

    pub fn init_request(id: i64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "mcp-e2e-test", "version": "1.0.0"}
            }
        })
    }

    pub fn call(id: i64, method: &str, params: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
    }

    /// POST `initialize` and remember the issued session id
    pub async fn initialize(&mut self) -> reqwest::Result<Response> {
        let response = self.post(&Self::init_request(0)).await?;
        self.session_id = response
            .headers()
            .get("mcp-session-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        debug!("session id: {:?}", self.session_id);
        Ok(response)
    }

    pub async fn post(&self, body: &Value) -> reqwest::Result<Response> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", "2025-06-18")
            .body(body.to_string());
        if let Some(session_id) = &self.session_id {
            request = request.header("Mcp-Session-Id", session_id);
        }
        request.send().await
    }

    /// Open the standalone stream, or resume one from `last_event_id`
    pub async fn get_stream(&self, last_event_id: Option<&str>) -> reqwest::Result<Response> {
        let mut request = self.client.get(&self.url).header("Accept", "text/event-stream");
        if let Some(session_id) = &self.session_id {
            request = request.header("Mcp-Session-Id", session_id);
        }
        if let Some(last_event_id) = last_event_id {
            request = request.header("Last-Event-ID", last_event_id);
        }
        request.send().await
    }

    pub async fn delete(&self) -> reqwest::Result<Response> {
        let mut request = self.client.delete(&self.url);
        if let Some(session_id) = &self.session_id {
            request = request.header("Mcp-Session-Id", session_id);
        }
        request.send().await
    }

    pub fn raw(&self) -> &Client {
        &self.client
    }
}

/// One SSE event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: Value,
}

impl SseEvent {
    /// Parse one frame; comment-only frames (keepalives) yield `None`
    pub fn parse(frame: &str) -> Option<Self> {
        let mut event = None;
        let mut id = None;
        let mut data = None;
        for line in frame.lines() {
            if let Some(rest) = line.strip_prefix("event: ") {
                event = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("id: ") {
                id = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("data: ") {
                data = serde_json::from_str(rest).ok();
            }
        }
        Some(Self {
            event,
            id,
            data: data?,
        })
    }
}

/// Reads SSE events incrementally from a streaming response
pub struct SseReader {
    response: Response,
    buffer: String,
}

impl SseReader {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            buffer: String::new(),
        }
    }

    /// Next event, or `None` once the stream ends or stays idle too long
    pub async fn next_event(&mut self) -> Option<SseEvent> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let frame: String = self.buffer.drain(..end + 2).collect();
                match SseEvent::parse(&frame) {
                    Some(event) => return Some(event),
                    None => continue,
                }
            }
            let chunk = tokio::time::timeout(EVENT_TIMEOUT, self.response.chunk())
                .await
                .ok()?
                .ok()??;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    /// True when the server finished the response, ignoring keepalives
    pub async fn ended(&mut self) -> bool {
        loop {
            match tokio::time::timeout(EVENT_TIMEOUT, self.response.chunk()).await {
                Ok(Ok(None)) | Ok(Err(_)) => return true,
                Ok(Ok(Some(chunk))) => self.buffer.push_str(&String::from_utf8_lossy(&chunk)),
                Err(_) => return false,
            }
        }
    }
}
