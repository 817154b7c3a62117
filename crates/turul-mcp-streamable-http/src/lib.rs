//! # Streamable HTTP MCP Transport
//!
//! A bidirectional JSON-RPC transport over plain HTTP for Model Context
//! Protocol (MCP) servers.
//!
//! ## Interaction modes
//! - **Streamed replies**: each POSTed batch of calls gets its own
//!   Server-Sent Events stream carrying progress notifications and replies
//! - **Buffered JSON**: replies to a batch are collected and returned as one
//!   ordinary JSON response
//! - **Standalone stream**: a long-lived GET stream for server-initiated
//!   notifications, resumable through an optional [`EventStore`]
//!
//! ## Features
//! - Session ids issued on `initialize` and enforced on every later request
//! - `Last-Event-ID` resumption backed by pluggable event stores
//! - Protocol version header validation and optional DNS-rebinding checks
//! - A hyper host server that keeps one transport per session
//!
//! ```rust,no_run
//! use turul_mcp_streamable_http::{MessageContext, MessageHandler, StreamableHttpTransport};
//! use turul_mcp_json_rpc::{JsonRpcMessage, JsonRpcResponse};
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl MessageHandler for Echo {
//!     async fn on_message(&self, message: JsonRpcMessage, context: MessageContext) {
//!         if let JsonRpcMessage::Request(request) = message {
//!             let params = request.params.map(|p| p.to_value()).unwrap_or_default();
//!             let reply = JsonRpcResponse::success(request.id, params);
//!             let _ = context.transport().send(reply.into(), None).await;
//!         }
//!     }
//! }
//!
//! let transport = StreamableHttpTransport::builder().handler(Echo).build();
//! ```

pub mod config;
pub mod correlator;
pub mod handler;
pub mod protocol;
pub mod responses;
#[cfg(feature = "server")]
pub mod server;
pub mod session_guard;
pub mod sse;
pub mod stream_registry;
pub mod transport;

#[cfg(test)]
mod tests;

use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;

// Re-export main types
pub use config::{
    SessionIdGenerator, StreamableHttpTransportBuilder, TransportConfig,
    default_session_id_generator,
};
pub use handler::{AuthInfo, MessageContext, MessageHandler};
pub use protocol::{
    LAST_EVENT_ID, MCP_PROTOCOL_VERSION, MCP_SESSION_ID, McpProtocolVersion,
    extract_last_event_id, extract_protocol_version, extract_session_id,
};
pub use responses::Rejection;
#[cfg(feature = "server")]
pub use server::{ServerConfig, ServerError, StreamableHttpServer, StreamableHttpServerBuilder};
pub use sse::SseFrame;
pub use stream_registry::{STANDALONE_STREAM_ID, StreamWriteError};
pub use transport::{Lifecycle, StreamableHttpTransport, TransportStats};

// Re-export foundational types
pub use turul_mcp_event_store::{EventId, EventSink, EventStore, EventStoreError, StreamId};

/// Response body produced by the transport (JSON, empty or event stream)
pub type TransportBody = UnsyncBoxBody<Bytes, Infallible>;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors reported to the host application
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport already started")]
    AlreadyStarted,

    #[error("Transport is closed")]
    Closed,

    #[error("No connection established for request ID: {0}")]
    NoStreamForRequest(turul_mcp_json_rpc::RequestId),

    #[error(
        "Cannot send a response on a standalone SSE stream unless resuming a previous client request"
    )]
    ReplyWithoutId,

    #[error("Stream write failed: {0}")]
    StreamWrite(#[from] StreamWriteError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),
}
