//! # JSON-RPC 2.0 Message Model
//!
//! Transport-agnostic JSON-RPC 2.0 types used by the streamable HTTP transport.
//!
//! ## Features
//! - Requests, notifications, responses and error responses as plain structs
//! - A single tagged [`JsonRpcMessage`] union, classified once at the boundary
//! - Batch parsing with offending-id recovery for parse error replies

pub mod error;
pub mod message;
pub mod notification;
pub mod request;
pub mod response;
pub mod types;

// Re-export main types
pub use error::{JsonRpcError, JsonRpcErrorObject};
pub use message::{JsonRpcMessage, ParseFailure, parse_messages};
pub use notification::JsonRpcNotification;
pub use request::{JsonRpcRequest, RequestParams};
pub use response::JsonRpcResponse;
pub use types::{JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of the call that opens an MCP session
pub const INITIALIZE_METHOD: &str = "initialize";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;

    /// Generic transport-level rejection
    pub const TRANSPORT_ERROR: i64 = -32000;
    /// Session identifier does not match the transport's session
    pub const SESSION_NOT_FOUND: i64 = -32001;
}
