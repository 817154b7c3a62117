//! Event Store Trait
//!
//! The transport depends only on this trait; backends decide how events are
//! persisted and how identifiers are ordered. Identifiers are opaque strings
//! to the transport and are echoed verbatim in the SSE `id:` field.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use turul_mcp_json_rpc::JsonRpcMessage;

/// Identifier of an outbound stream (per call batch, or the standalone stream)
pub type StreamId = String;

/// Identifier of a persisted event, echoed back by clients as `Last-Event-ID`
pub type EventId = String;

/// A persisted outbound event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: EventId,
    pub stream_id: StreamId,
    /// Storage timestamp (Unix millis)
    pub timestamp: u64,
    pub message: JsonRpcMessage,
}

/// Error type for event store operations
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("Event not found: {0}")]
    EventNotFound(EventId),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Receives replayed events, in order, during [`EventStore::replay_events_after`]
pub trait EventSink: Send {
    fn emit(&mut self, event_id: EventId, message: JsonRpcMessage);
}

impl EventSink for Vec<(EventId, JsonRpcMessage)> {
    fn emit(&mut self, event_id: EventId, message: JsonRpcMessage) {
        self.push((event_id, message));
    }
}

/// Core trait for event store backends
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Backend name for logging and debugging
    fn backend_name(&self) -> &'static str;

    /// Persist one outbound event and return its durable identifier
    async fn store_event(
        &self,
        stream_id: &str,
        message: &JsonRpcMessage,
    ) -> Result<EventId, EventStoreError>;

    /// Emit every event stored after `last_event_id` on the same stream, in
    /// original order, and return that stream's identifier
    async fn replay_events_after(
        &self,
        last_event_id: &str,
        sink: &mut dyn EventSink,
    ) -> Result<StreamId, EventStoreError>;
}
