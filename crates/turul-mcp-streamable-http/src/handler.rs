//! Application-facing callbacks
//!
//! The transport never interprets call payloads. Every accepted inbound
//! message is handed to a [`MessageHandler`]; replies come back later
//! through [`StreamableHttpTransport::send`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use turul_mcp_json_rpc::JsonRpcMessage;

use crate::{StreamableHttpTransport, TransportError};

/// Credentials extracted by the host before the request reached the
/// transport. Passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub token: String,
    pub client_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Expiry as Unix seconds
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

/// Everything the application may need to process one inbound message
#[derive(Clone)]
pub struct MessageContext {
    pub session_id: Option<String>,
    pub auth_info: Option<AuthInfo>,
    pub headers: HeaderMap,
    pub received_at: DateTime<Utc>,
    transport: StreamableHttpTransport,
}

impl MessageContext {
    pub(crate) fn new(
        transport: StreamableHttpTransport,
        session_id: Option<String>,
        auth_info: Option<AuthInfo>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            session_id,
            auth_info,
            headers,
            received_at: Utc::now(),
            transport,
        }
    }

    /// The transport that received the message; reply through it.
    pub fn transport(&self) -> &StreamableHttpTransport {
        &self.transport
    }
}

impl std::fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContext")
            .field("session_id", &self.session_id)
            .field("auth_info", &self.auth_info.is_some())
            .field("received_at", &self.received_at)
            .finish()
    }
}

/// Callbacks invoked by the transport
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Called once per accepted inbound message, in batch order.
    ///
    /// Runs on a task spawned per POST, after the stream (or buffered
    /// batch) for the call has been registered, so the HTTP response does
    /// not wait for it. A handler may send a request on the call's stream
    /// and wait for the client's answer, which arrives in a later POST.
    async fn on_message(&self, message: JsonRpcMessage, context: MessageContext);

    /// Called once when an initialize call creates a new session
    async fn on_session_initialized(&self, session_id: &str) {
        debug!("Session initialized: {}", session_id);
    }

    /// Stream write failures, replay failures and `send` usage errors
    async fn on_error(&self, error: &TransportError) {
        error!("Transport error: {}", error);
    }

    /// Called once, on the first close
    async fn on_close(&self) {}
}

/// Default handler: logs and drops everything
pub(crate) struct DiscardHandler;

#[async_trait]
impl MessageHandler for DiscardHandler {
    async fn on_message(&self, message: JsonRpcMessage, _context: MessageContext) {
        debug!(
            "No message handler configured, dropping {:?}",
            message.method().unwrap_or("<reply>")
        );
    }
}
