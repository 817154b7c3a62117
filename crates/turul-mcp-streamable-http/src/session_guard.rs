//! Session state and the per-request session check

use http::HeaderMap;

use crate::protocol::extract_session_id;
use crate::responses::Rejection;

/// The transport's single session
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Assigned once by the first accepted initialize call
    pub session_id: Option<String>,
    pub initialized: bool,
    /// Set when the transport is closed or a DELETE was handled
    pub terminated: bool,
    /// No session ids are issued or checked
    pub stateless: bool,
}

impl SessionState {
    pub fn new(stateless: bool) -> Self {
        Self {
            stateless,
            ..Self::default()
        }
    }

    /// Check a non-initialize request against the session.
    ///
    /// Pure: inspects headers and state, never mutates either.
    pub fn validate(&self, headers: &HeaderMap) -> Result<(), Rejection> {
        if self.stateless {
            return Ok(());
        }
        if !self.initialized {
            return Err(Rejection::bad_request("Bad Request: Server not initialized"));
        }
        let Some(presented) = extract_session_id(headers) else {
            return Err(Rejection::bad_request(
                "Bad Request: Mcp-Session-Id header is required",
            ));
        };
        if self.terminated || self.session_id.as_deref() != Some(presented.as_str()) {
            return Err(Rejection::session_not_found());
        }
        Ok(())
    }

    /// A second initialize is refused once a session id has been issued.
    pub fn already_initialized(&self) -> bool {
        self.initialized && self.session_id.is_some()
    }
}
