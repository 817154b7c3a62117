//! JSON-RPC 2.0 response builders for HTTP transport
//!
//! Every rejection the transport produces carries a JSON-RPC error object in
//! its body. [`Rejection`] is the typed form; it is turned into an HTTP
//! response exactly once, at the edge of the request handler.

use bytes::Bytes;
use http::header::{ALLOW, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::{BodyExt, Empty, Full};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use turul_mcp_json_rpc::{JsonRpcError, JsonRpcErrorObject, ParseFailure, RequestId, error_codes};

use crate::TransportBody;
use crate::protocol::{EVENT_STREAM_MEDIA_TYPE, JSON_MEDIA_TYPE, MCP_SESSION_ID};

/// A request the transport refuses to process
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub status: StatusCode,
    pub error: JsonRpcError,
}

impl Rejection {
    pub fn new(status: StatusCode, code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        let object = if code == error_codes::INVALID_REQUEST {
            JsonRpcErrorObject::invalid_request(message)
        } else if code == error_codes::INTERNAL_ERROR {
            JsonRpcErrorObject::internal_error(Some(message))
        } else {
            JsonRpcErrorObject::server_error(code, message, None)
        };
        Self {
            status,
            error: JsonRpcError::new(None, object),
        }
    }

    pub fn with_id(mut self, id: Option<RequestId>) -> Self {
        self.error.id = id;
        self
    }

    pub fn code(&self) -> i64 {
        self.error.error.code
    }

    pub fn message(&self) -> &str {
        &self.error.error.message
    }

    /// 400 with the generic transport error code
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::TRANSPORT_ERROR, message)
    }

    /// 400 with the JSON-RPC "invalid request" code
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_REQUEST, message)
    }

    pub fn session_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            error_codes::SESSION_NOT_FOUND,
            "Session not found",
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error_codes::TRANSPORT_ERROR, message)
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_ACCEPTABLE, error_codes::TRANSPORT_ERROR, message)
    }

    pub fn unsupported_media_type() -> Self {
        Self::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            error_codes::TRANSPORT_ERROR,
            "Unsupported Media Type: Content-Type must be application/json",
        )
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            error_codes::TRANSPORT_ERROR,
            format!("Payload Too Large: request body exceeds {} bytes", limit),
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, error_codes::TRANSPORT_ERROR, message)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            error_codes::TRANSPORT_ERROR,
            "Method not allowed.",
        )
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, error_codes::TRANSPORT_ERROR, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::TRANSPORT_ERROR,
            message,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            message,
        )
    }

    pub fn into_response(self) -> Response<TransportBody> {
        debug!(
            "Rejecting request: status={}, code={}, message={}",
            self.status, self.error.error.code, self.error.error.message
        );
        let mut response = json_response(self.status, &self.error, None);
        if self.status == StatusCode::METHOD_NOT_ALLOWED {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, POST, DELETE"));
        }
        response
    }
}

impl From<ParseFailure> for Rejection {
    fn from(failure: ParseFailure) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: failure.to_error(),
        }
    }
}

/// Build a JSON response, echoing the session header when one exists.
pub fn json_response<T: Serialize + ?Sized>(
    status: StatusCode,
    payload: &T,
    session_id: Option<&str>,
) -> Response<TransportBody> {
    let body_bytes = serde_json::to_vec(payload).unwrap_or_else(|e| {
        error!("Failed to serialize JSON-RPC payload: {}", e);
        b"{}".to_vec()
    });

    let mut response = Response::new(Full::new(Bytes::from(body_bytes)).boxed_unsync());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MEDIA_TYPE));
    with_session_header(response, session_id)
}

/// Build a response with no body (202 Accepted, DELETE success).
pub fn empty_response(status: StatusCode, session_id: Option<&str>) -> Response<TransportBody> {
    let mut response = Response::new(Empty::new().boxed_unsync());
    *response.status_mut() = status;
    with_session_header(response, session_id)
}

/// Wrap an event stream body in a 200 response with SSE headers.
pub fn event_stream_response(body: TransportBody, session_id: Option<&str>) -> Response<TransportBody> {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM_MEDIA_TYPE));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    with_session_header(response, session_id)
}

/// Plain 404 for paths outside the MCP endpoint.
pub fn not_found_response() -> Response<TransportBody> {
    let mut response = Response::new(Full::new(Bytes::from_static(b"Not Found")).boxed_unsync());
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

fn with_session_header(
    mut response: Response<TransportBody>,
    session_id: Option<&str>,
) -> Response<TransportBody> {
    if let Some(session_id) = session_id {
        match HeaderValue::from_str(session_id) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(MCP_SESSION_ID), value);
            }
            Err(e) => error!("Session id is not a valid header value: {}", e),
        }
    }
    response
}

/// Aggregate body for a buffered batch: one object for a single call,
/// otherwise an array in call order.
pub fn aggregate_body(mut replies: Vec<turul_mcp_json_rpc::JsonRpcMessage>) -> Value {
    if replies.len() == 1 {
        let reply = replies.remove(0);
        serde_json::to_value(reply).unwrap_or(Value::Null)
    } else {
        serde_json::to_value(replies).unwrap_or_else(|_| Value::Array(Vec::new()))
    }
}
