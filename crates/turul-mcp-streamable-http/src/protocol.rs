//! MCP Protocol Version and Header Helpers
//!
//! Header names, protocol version validation and the small amount of media
//! type sniffing the transport needs.

use http::HeaderMap;
use http::header::{ACCEPT, CONTENT_TYPE, HOST, ORIGIN};

/// Session correlation header
pub const MCP_SESSION_ID: &str = "mcp-session-id";
/// Negotiated protocol version header
pub const MCP_PROTOCOL_VERSION: &str = "mcp-protocol-version";
/// SSE resumption checkpoint header
pub const LAST_EVENT_ID: &str = "last-event-id";

pub const JSON_MEDIA_TYPE: &str = "application/json";
pub const EVENT_STREAM_MEDIA_TYPE: &str = "text/event-stream";

/// Supported MCP protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpProtocolVersion {
    /// Original protocol without streamable HTTP (introduced 2024-11-05)
    V2024_11_05,
    /// Protocol including streamable HTTP (introduced 2025-03-26)
    V2025_03_26,
    /// Protocol with structured _meta and elicitation (introduced 2025-06-18)
    V2025_06_18,
    /// Protocol with tasks and icons (introduced 2025-11-25)
    V2025_11_25,
}

impl McpProtocolVersion {
    /// Version assumed when a client omits the header
    pub const DEFAULT_NEGOTIATED: McpProtocolVersion = McpProtocolVersion::V2025_03_26;

    /// The latest protocol version this transport accepts.
    pub const LATEST: McpProtocolVersion = McpProtocolVersion::V2025_11_25;

    pub const SUPPORTED: [McpProtocolVersion; 4] = [
        McpProtocolVersion::V2024_11_05,
        McpProtocolVersion::V2025_03_26,
        McpProtocolVersion::V2025_06_18,
        McpProtocolVersion::V2025_11_25,
    ];

    /// Parses a version string like "2024-11-05" or "2025-06-18".
    pub fn parse_version(s: &str) -> Option<Self> {
        match s {
            "2024-11-05" => Some(McpProtocolVersion::V2024_11_05),
            "2025-03-26" => Some(McpProtocolVersion::V2025_03_26),
            "2025-06-18" => Some(McpProtocolVersion::V2025_06_18),
            "2025-11-25" => Some(McpProtocolVersion::V2025_11_25),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            McpProtocolVersion::V2024_11_05 => "2024-11-05",
            McpProtocolVersion::V2025_03_26 => "2025-03-26",
            McpProtocolVersion::V2025_06_18 => "2025-06-18",
            McpProtocolVersion::V2025_11_25 => "2025-11-25",
        }
    }

    /// Returns whether this version supports streamable HTTP (SSE).
    pub fn supports_streamable_http(&self) -> bool {
        !matches!(self, McpProtocolVersion::V2024_11_05)
    }
}

impl std::fmt::Display for McpProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extract the protocol version header.
///
/// An absent header yields [`McpProtocolVersion::DEFAULT_NEGOTIATED`]; an
/// unrecognised value is returned as `Err` carrying the raw header text.
pub fn extract_protocol_version(headers: &HeaderMap) -> Result<McpProtocolVersion, String> {
    match headers.get(MCP_PROTOCOL_VERSION) {
        None => Ok(McpProtocolVersion::DEFAULT_NEGOTIATED),
        Some(value) => {
            let raw = value.to_str().unwrap_or_default();
            McpProtocolVersion::parse_version(raw).ok_or_else(|| raw.to_string())
        }
    }
}

/// Extract MCP session ID from HTTP request headers
pub fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    header_str(headers, MCP_SESSION_ID).map(str::to_string)
}

/// Extract Last-Event-ID from HTTP request headers for SSE resumability
pub fn extract_last_event_id(headers: &HeaderMap) -> Option<String> {
    header_str(headers, LAST_EVENT_ID)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn extract_host(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, HOST.as_str())
}

pub fn extract_origin(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, ORIGIN.as_str())
}

/// True when the `Accept` header names `media_type` explicitly. Wildcards
/// such as `*/*` do not count.
pub fn accepts(headers: &HeaderMap, media_type: &str) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|item| item.split(';').next().unwrap_or_default().trim())
        .any(|item| item.eq_ignore_ascii_case(media_type))
}

/// True when the `Content-Type` header is JSON (parameters such as charset are ignored)
pub fn is_json_content(headers: &HeaderMap) -> bool {
    header_str(headers, CONTENT_TYPE.as_str())
        .and_then(|value| value.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}
