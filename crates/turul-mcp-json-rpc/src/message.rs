//! Tagged JSON-RPC message union
//!
//! Messages arrive as untyped JSON. They are classified exactly once, here,
//! by structural shape; everything downstream matches on [`JsonRpcMessage`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    error::{JsonRpcError, JsonRpcErrorObject},
    notification::JsonRpcNotification,
    request::JsonRpcRequest,
    response::JsonRpcResponse,
    types::RequestId,
};

/// Any JSON-RPC 2.0 message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Call expecting a reply
    Request(JsonRpcRequest),
    /// Call without an id; never replied to
    Notification(JsonRpcNotification),
    /// Successful final reply
    Response(JsonRpcResponse),
    /// Error final reply
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    /// Classify a JSON value by shape and validate it against the matching struct.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "message must be a JSON object".to_string())?;

        let has = |key: &str| object.contains_key(key);
        let result = if has("method") {
            if has("id") {
                serde_json::from_value(value).map(JsonRpcMessage::Request)
            } else {
                serde_json::from_value(value).map(JsonRpcMessage::Notification)
            }
        } else if has("result") && has("id") {
            serde_json::from_value(value).map(JsonRpcMessage::Response)
        } else if has("error") {
            serde_json::from_value(value).map(JsonRpcMessage::Error)
        } else {
            return Err("message is not a request, notification, response or error".to_string());
        };

        result.map_err(|e| e.to_string())
    }

    /// Identifier carried by the message itself, if any
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(request) => Some(&request.id),
            JsonRpcMessage::Response(response) => Some(&response.id),
            JsonRpcMessage::Error(error) => error.id.as_ref(),
            JsonRpcMessage::Notification(_) => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(request) => Some(&request.method),
            JsonRpcMessage::Notification(notification) => Some(&notification.method),
            _ => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, JsonRpcMessage::Request(_))
    }

    /// True for responses and error responses
    pub fn is_final_reply(&self) -> bool {
        matches!(self, JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_))
    }

    pub fn is_initialize_request(&self) -> bool {
        matches!(self, JsonRpcMessage::Request(request) if request.is_initialize())
    }
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        JsonRpcMessage::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(request: JsonRpcRequest) -> Self {
        Self::Request(request)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(notification: JsonRpcNotification) -> Self {
        Self::Notification(notification)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(response: JsonRpcResponse) -> Self {
        Self::Response(response)
    }
}

impl From<JsonRpcError> for JsonRpcMessage {
    fn from(error: JsonRpcError) -> Self {
        Self::Error(error)
    }
}

/// Why an inbound body could not be turned into messages
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseFailure {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid JSON-RPC message: {reason}")]
    InvalidMessage {
        id: Option<RequestId>,
        reason: String,
    },

    #[error("batch must contain at least one message")]
    EmptyBatch,
}

impl ParseFailure {
    /// Identifier of the offending call, when it could be recovered
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            ParseFailure::InvalidMessage { id, .. } => id.as_ref(),
            _ => None,
        }
    }

    /// JSON-RPC error reply describing this failure
    pub fn to_error(&self) -> JsonRpcError {
        match self {
            ParseFailure::InvalidJson(reason) => {
                JsonRpcError::parse_error(None, Some(Value::String(reason.clone())))
            }
            ParseFailure::InvalidMessage { id, reason } => {
                JsonRpcError::parse_error(id.clone(), Some(Value::String(reason.clone())))
            }
            ParseFailure::EmptyBatch => JsonRpcError::new(
                None,
                JsonRpcErrorObject::invalid_request("Invalid Request: empty batch"),
            ),
        }
    }
}

/// Parse a request body holding either one message or a batch of messages.
pub fn parse_messages(body: &[u8]) -> Result<Vec<JsonRpcMessage>, ParseFailure> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;

    let raw = match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(ParseFailure::EmptyBatch);
            }
            items
        }
        other => vec![other],
    };

    raw.into_iter()
        .map(|item| {
            let id = item.get("id").and_then(RequestId::from_value);
            JsonRpcMessage::from_value(item)
                .map_err(|reason| ParseFailure::InvalidMessage { id, reason })
        })
        .collect()
}
