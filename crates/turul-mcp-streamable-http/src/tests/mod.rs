//! Test modules for turul-mcp-streamable-http crate
//!
//! Transports are driven directly through `handle` with in-memory request
//! bodies; SSE responses are read frame by frame.

pub mod common;
