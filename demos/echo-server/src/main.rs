//! # Echo Server
//!
//! Minimal MCP endpoint on top of the streamable HTTP transport. Every call
//! is answered with its own params; calls carrying a `progressToken` in
//! `_meta` get two progress notifications first.
//!
//! ## Usage
//! ```bash
//! cargo run -p echo-server -- --port 8000
//! cargo run -p echo-server -- --json          # buffered JSON replies
//! cargo run -p echo-server -- --event-store   # resumable SSE streams
//! ```
//!
//! ## Equivalent Curl Commands
//! ```bash
//! curl -X POST http://127.0.0.1:8000/mcp \
//!   -H "Content-Type: application/json" \
//!   -H "Accept: application/json, text/event-stream" \
//!   -d '{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{},"clientInfo":{"name":"curl","version":"1.0.0"}}}' \
//!   -i
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use turul_mcp_event_store::InMemoryEventStore;
use turul_mcp_json_rpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcResponse};
use turul_mcp_streamable_http::{
    McpProtocolVersion, MessageContext, MessageHandler, StreamableHttpServer,
    StreamableHttpTransport, TransportError,
};

#[derive(Parser)]
#[command(name = "echo-server")]
#[command(about = "MCP echo server over streamable HTTP")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value = "8000")]
    port: u16,

    #[arg(long, default_value = "/mcp")]
    path: String,

    /// Answer calls with one JSON body instead of an SSE stream
    #[arg(long)]
    json: bool,

    /// Run without sessions
    #[arg(long)]
    stateless: bool,

    /// Keep outbound events in memory so clients can resume streams
    #[arg(long)]
    event_store: bool,

    /// Seconds between SSE keepalive comments (0 disables them)
    #[arg(long, default_value = "30")]
    keepalive_seconds: u64,

    /// Close sessions idle for this many seconds (0 keeps them forever)
    #[arg(long, default_value = "1800")]
    session_idle_seconds: u64,
}

struct EchoHandler;

impl EchoHandler {
    fn initialize_result() -> Value {
        json!({
            "protocolVersion": McpProtocolVersion::LATEST.as_str(),
            "capabilities": {"logging": {}},
            "serverInfo": {"name": "echo-server", "version": env!("CARGO_PKG_VERSION")}
        })
    }
}

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn on_message(&self, message: JsonRpcMessage, context: MessageContext) {
        let request = match message {
            JsonRpcMessage::Request(request) => request,
            other => {
                debug!("Ignoring {}", other.method().unwrap_or("client reply"));
                return;
            }
        };

        let transport = context.transport();
        let params = request
            .params
            .as_ref()
            .map(|params| params.to_value())
            .unwrap_or(Value::Null);

        let result = if request.method == "initialize" {
            Self::initialize_result()
        } else {
            if let Some(token) = params.pointer("/_meta/progressToken") {
                for progress in 1..=2 {
                    let update = json!({"progressToken": token, "progress": progress, "total": 2});
                    let notification = JsonRpcNotification::new(
                        "notifications/progress",
                        update.as_object().cloned().map(Into::into),
                    );
                    if let Err(e) = transport
                        .send(notification.into(), Some(request.id.clone()))
                        .await
                    {
                        warn!("Progress for {} not sent: {}", request.id, e);
                    }
                }
            }
            json!({"method": request.method, "echo": params})
        };

        let reply = JsonRpcResponse::success(request.id.clone(), result);
        if let Err(e) = transport.send(reply.into(), None).await {
            warn!("Reply to {} not sent: {}", request.id, e);
        }
    }

    async fn on_session_initialized(&self, session_id: &str) {
        info!("Session {} started", session_id);
    }

    async fn on_error(&self, error: &TransportError) {
        warn!("Transport error: {}", error);
    }

    async fn on_close(&self) {
        info!("Session closed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let bind_address: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    info!("Starting echo server");
    info!("  json responses: {}", args.json);
    info!("  stateless:      {}", args.stateless);
    info!("  event store:    {}", args.event_store);

    let handler = Arc::new(EchoHandler);
    let keepalive = (args.keepalive_seconds > 0).then(|| Duration::from_secs(args.keepalive_seconds));
    let idle_timeout =
        (args.session_idle_seconds > 0).then(|| Duration::from_secs(args.session_idle_seconds));
    let (json, stateless, event_store) = (args.json, args.stateless, args.event_store);

    let server = StreamableHttpServer::builder()
        .bind_address(bind_address)
        .mcp_path(args.path)
        .session_idle_timeout(idle_timeout)
        .transport_factory(move || {
            let mut builder = StreamableHttpTransport::builder()
                .shared_handler(handler.clone())
                .json_response(json)
                .keepalive_interval(keepalive);
            if stateless {
                builder = builder.stateless();
            }
            // one store per session
            if event_store {
                builder = builder.event_store(Arc::new(InMemoryEventStore::new()));
            }
            builder.build()
        })
        .build()?;

    server.run().await?;
    Ok(())
}
