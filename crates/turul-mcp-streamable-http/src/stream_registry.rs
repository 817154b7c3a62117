//! Stream Registry
//!
//! Owns the write side of every open event stream, keyed by stream id. Each
//! stream is a bounded channel whose receiver is driven by the HTTP response
//! body. Closing a stream drops its sender, which ends the body.
//!
//! A stream id can be re-bound to a new connection (resumption). Every
//! registration gets a fresh connection id so the disconnect cleanup of a
//! replaced connection never removes its successor.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use turul_mcp_event_store::StreamId;

use crate::sse::SseFrame;

/// Fixed id of the standalone (server-initiated) stream
pub const STANDALONE_STREAM_ID: &str = "_GET_stream";

/// Identifies one HTTP connection bound to a stream id
pub type ConnectionId = Uuid;

struct StreamEntry {
    connection_id: ConnectionId,
    sender: mpsc::Sender<SseFrame>,
}

/// Why a frame could not be queued on a stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamWriteError {
    #[error("stream {0} is not open")]
    NotOpen(StreamId),
    #[error("stream {0} buffer is full")]
    Full(StreamId),
    #[error("stream {0} client disconnected")]
    Disconnected(StreamId),
}

#[derive(Default)]
pub struct StreamRegistry {
    streams: HashMap<StreamId, StreamEntry>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sender` under `stream_id`, replacing (and thereby closing)
    /// any connection previously bound to it.
    pub fn register(&mut self, stream_id: &str, sender: mpsc::Sender<SseFrame>) -> ConnectionId {
        let connection_id = Uuid::now_v7();
        let previous = self.streams.insert(
            stream_id.to_string(),
            StreamEntry {
                connection_id,
                sender,
            },
        );
        if let Some(previous) = previous {
            debug!(
                "Stream {} re-bound: connection {} replaced by {}",
                stream_id, previous.connection_id, connection_id
            );
        } else {
            debug!("Stream {} opened on connection {}", stream_id, connection_id);
        }
        connection_id
    }

    pub fn contains(&self, stream_id: &str) -> bool {
        self.streams.contains_key(stream_id)
    }

    /// Queue a frame without waiting. Write failures leave the registry untouched.
    pub fn write(&self, stream_id: &str, frame: SseFrame) -> Result<(), StreamWriteError> {
        let entry = self
            .streams
            .get(stream_id)
            .ok_or_else(|| StreamWriteError::NotOpen(stream_id.to_string()))?;

        entry.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!("Stream buffer full: stream={}", stream_id);
                StreamWriteError::Full(stream_id.to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                warn!("Stream closed during send: stream={}", stream_id);
                StreamWriteError::Disconnected(stream_id.to_string())
            }
        })
    }

    /// Close a stream. Frames already queued are still delivered.
    pub fn close(&mut self, stream_id: &str) -> bool {
        let removed = self.streams.remove(stream_id).is_some();
        if removed {
            debug!("Stream {} closed", stream_id);
        }
        removed
    }

    /// Remove the entry only if it still belongs to `connection_id`.
    pub fn remove_connection(&mut self, stream_id: &str, connection_id: ConnectionId) -> bool {
        let owned = self
            .streams
            .get(stream_id)
            .is_some_and(|entry| entry.connection_id == connection_id);
        if owned {
            self.streams.remove(stream_id);
            debug!(
                "Stream {} unregistered after disconnect of connection {}",
                stream_id, connection_id
            );
        }
        owned
    }

    pub fn close_all(&mut self) -> usize {
        let count = self.streams.len();
        self.streams.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
