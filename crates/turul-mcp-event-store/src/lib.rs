//! # Event Store Abstractions and Implementations
//!
//! **Pluggable event persistence for resumable MCP Server-Sent Event streams.**
//!
//! Every event written to an outbound SSE stream can be persisted through an
//! [`EventStore`]. When a client reconnects with a `Last-Event-ID` header the
//! transport asks the store to replay everything newer than that checkpoint
//! on the same stream, then re-binds the stream to the new connection.
//!
//! ```toml
//! [dependencies]
//! turul-mcp-event-store = "0.1"
//! ```

mod traits;
/// Core event store trait and types for pluggable backend implementations
pub use traits::*;

#[cfg(feature = "in-memory")]
pub mod in_memory;

#[cfg(feature = "in-memory")]
/// In-memory event store for development, testing and single-process servers
pub use in_memory::{InMemoryEventStore, InMemoryEventStoreConfig, InMemoryEventStoreStats};
