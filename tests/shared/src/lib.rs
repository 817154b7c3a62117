//! Shared E2E Testing Utilities for the streamable HTTP transport
//!
//! An in-process server on an ephemeral port, an echo application, a
//! reqwest-based MCP client and an incremental SSE reader.

pub mod e2e_utils;

// Re-export the main types for convenience
pub use e2e_utils::{EchoHandler, McpTestClient, SseEvent, SseReader, TestServer, init_tracing};
