//! Streamable HTTP Transport
//!
//! One transport instance serves one MCP session:
//! - `POST` submits JSON-RPC messages; calls are answered on a fresh SSE
//!   stream or, in buffered-JSON mode, in one aggregate JSON body
//! - `GET` opens the standalone server-initiated stream, or resumes a stream
//!   from a `Last-Event-ID` checkpoint when an event store is configured
//! - `DELETE` terminates the session
//!
//! Replies travel back through [`StreamableHttpTransport::send`], which
//! routes each message to the stream (or buffered batch) its call id was
//! bound to.
//!
//! All routing state lives in one [`TransportState`] behind a synchronous
//! lock that is never held across an await. `send` is additionally
//! serialized so per-stream order survives the awaited event-store write.
//! Inbound messages reach the application on a spawned task per POST, so
//! a stream is returned to the client before any handler runs.

use std::collections::HashSet;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use turul_mcp_event_store::{EventId, StreamId};
use turul_mcp_json_rpc::{JsonRpcMessage, ParseFailure, RequestId, parse_messages};

use crate::config::{StreamableHttpTransportBuilder, TransportConfig};
use crate::correlator::{BufferedOutcome, Correlator, RecordOutcome};
use crate::handler::{AuthInfo, MessageContext, MessageHandler};
use crate::protocol::{
    EVENT_STREAM_MEDIA_TYPE, JSON_MEDIA_TYPE, McpProtocolVersion, accepts, extract_host,
    extract_last_event_id, extract_origin, extract_protocol_version, is_json_content,
};
use crate::responses::{
    Rejection, aggregate_body, empty_response, event_stream_response, json_response,
};
use crate::session_guard::SessionState;
use crate::sse::{SseFrame, event_stream_body};
use crate::stream_registry::{
    ConnectionId, STANDALONE_STREAM_ID, StreamRegistry, StreamWriteError,
};
use crate::{Result, TransportBody, TransportError};

/// Transport lifecycle. Initialization is tracked on the session itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Started,
    Closed,
}

/// Snapshot of transport counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub open_streams: usize,
    pub pending_calls: usize,
    pub pending_batches: usize,
    /// Notifications dropped because nothing was listening
    pub discarded_notifications: u64,
    pub write_failures: u64,
}

struct TransportState {
    lifecycle: Lifecycle,
    session: SessionState,
    registry: StreamRegistry,
    correlator: Correlator,
}

#[derive(Default)]
struct Counters {
    discarded_notifications: AtomicU64,
    write_failures: AtomicU64,
}

struct Inner {
    config: TransportConfig,
    handler: Arc<dyn MessageHandler>,
    state: Mutex<TransportState>,
    send_lock: tokio::sync::Mutex<()>,
    counters: Counters,
}

/// Streamable HTTP transport for a single MCP session
#[derive(Clone)]
pub struct StreamableHttpTransport {
    inner: Arc<Inner>,
}

/// Where `send` routes one message
enum Route {
    Unbound,
    Recorded(RecordOutcome),
    DroppedIntermediate,
    Stream(StreamId, JsonRpcMessage),
}

impl StreamableHttpTransport {
    pub fn builder() -> StreamableHttpTransportBuilder {
        StreamableHttpTransportBuilder::new()
    }

    pub(crate) fn new(mut config: TransportConfig, handler: Arc<dyn MessageHandler>) -> Self {
        config.channel_buffer_size = config.channel_buffer_size.max(1);
        let session = SessionState::new(config.is_stateless());
        debug!("Creating streamable HTTP transport: {:?}", config);
        Self {
            inner: Arc::new(Inner {
                config,
                handler,
                state: Mutex::new(TransportState {
                    lifecycle: Lifecycle::Created,
                    session,
                    registry: StreamRegistry::new(),
                    correlator: Correlator::new(),
                }),
                send_lock: tokio::sync::Mutex::new(()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Mark the transport started. Calling it twice is a usage error.
    pub fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        match state.lifecycle {
            Lifecycle::Created => {
                state.lifecycle = Lifecycle::Started;
                debug!("Transport started");
                Ok(())
            }
            Lifecycle::Started => Err(TransportError::AlreadyStarted),
            Lifecycle::Closed => Err(TransportError::Closed),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.state.lock().lifecycle
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.state.lock().session.session_id.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().session.initialized
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().lifecycle == Lifecycle::Closed
    }

    pub fn stats(&self) -> TransportStats {
        let state = self.inner.state.lock();
        TransportStats {
            open_streams: state.registry.len(),
            pending_calls: state.correlator.pending_calls(),
            pending_batches: state.correlator.pending_batches(),
            discarded_notifications: self
                .inner
                .counters
                .discarded_notifications
                .load(Ordering::Relaxed),
            write_failures: self.inner.counters.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Handle one HTTP request
    pub async fn handle<B>(&self, request: Request<B>) -> Response<TransportBody>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        self.handle_with_auth(request, None).await
    }

    /// Handle one HTTP request, forwarding `auth_info` to the application
    pub async fn handle_with_auth<B>(
        &self,
        request: Request<B>,
        auth_info: Option<AuthInfo>,
    ) -> Response<TransportBody>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();
        debug!("Handling {} {}", parts.method, parts.uri.path());

        if let Err(rejection) = self.check_dns_rebinding(&parts.headers) {
            return rejection.into_response();
        }

        let result = match parts.method {
            Method::POST => self.handle_post(parts.headers, body, auth_info).await,
            Method::GET => self.handle_get(&parts.headers).await,
            Method::DELETE => self.handle_delete(&parts.headers).await,
            _ => Err(Rejection::method_not_allowed()),
        };
        result.unwrap_or_else(Rejection::into_response)
    }

    async fn handle_post<B>(
        &self,
        headers: HeaderMap,
        body: B,
        auth_info: Option<AuthInfo>,
    ) -> std::result::Result<Response<TransportBody>, Rejection>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        if !(accepts(&headers, JSON_MEDIA_TYPE) && accepts(&headers, EVENT_STREAM_MEDIA_TYPE)) {
            return Err(Rejection::not_acceptable(
                "Not Acceptable: Client must accept both application/json and text/event-stream",
            ));
        }
        if !is_json_content(&headers) {
            return Err(Rejection::unsupported_media_type());
        }

        let body = self.read_body(&headers, body).await?;
        let messages = parse_messages(&body).map_err(|failure| {
            warn!("Rejecting unparseable POST body: {}", failure);
            Rejection::from(failure)
        })?;

        let session_id = if messages.iter().any(JsonRpcMessage::is_initialize_request) {
            self.initialize_session(messages.len()).await?
        } else {
            self.check_session(&headers)?
        };

        let calls: Vec<RequestId> = messages
            .iter()
            .filter(|message| message.is_request())
            .filter_map(|message| message.id().cloned())
            .collect();
        let context = MessageContext::new(self.clone(), session_id.clone(), auth_info, headers);

        if calls.is_empty() {
            self.dispatch(messages, context);
            return Ok(empty_response(StatusCode::ACCEPTED, session_id.as_deref()));
        }

        let stream_id = Uuid::now_v7().to_string();
        if self.inner.config.enable_json_response {
            let receiver = {
                let mut state = self.inner.state.lock();
                Self::reserve_calls(&mut state, &calls, &stream_id)?;
                state.correlator.register_buffered(&stream_id, calls)
            };
            let _batch = PendingBatchGuard {
                inner: Arc::downgrade(&self.inner),
                stream_id: stream_id.clone(),
            };
            debug!("Holding buffered response for batch on stream {}", stream_id);
            self.dispatch(messages, context);

            match receiver.await {
                Ok(BufferedOutcome::Complete(replies)) => Ok(json_response(
                    StatusCode::OK,
                    &aggregate_body(replies),
                    session_id.as_deref(),
                )),
                Ok(BufferedOutcome::Closed) | Err(_) => Err(Rejection::service_unavailable(
                    "Service Unavailable: transport closed before all replies were sent",
                )),
            }
        } else {
            let (sender, receiver) = mpsc::channel(self.inner.config.channel_buffer_size);
            let connection_id = {
                let mut state = self.inner.state.lock();
                Self::reserve_calls(&mut state, &calls, &stream_id)?;
                state.registry.register(&stream_id, sender)
            };
            let guard = self.stream_guard(&stream_id, connection_id);
            debug!("Opened SSE stream {} for {} call(s)", stream_id, calls.len());
            self.dispatch(messages, context);

            let body = event_stream_body(
                Vec::new(),
                receiver,
                self.inner.config.keepalive_interval,
                guard,
            );
            Ok(event_stream_response(body, session_id.as_deref()))
        }
    }

    async fn handle_get(
        &self,
        headers: &HeaderMap,
    ) -> std::result::Result<Response<TransportBody>, Rejection> {
        if !accepts(headers, EVENT_STREAM_MEDIA_TYPE) {
            return Err(Rejection::not_acceptable(
                "Not Acceptable: Client must accept text/event-stream",
            ));
        }
        let session_id = self.check_session(headers)?;

        if let Some(last_event_id) = extract_last_event_id(headers) {
            return self.resume_stream(&last_event_id, session_id).await;
        }

        let (sender, receiver) = mpsc::channel(self.inner.config.channel_buffer_size);
        let connection_id = {
            let mut state = self.inner.state.lock();
            if state.registry.contains(STANDALONE_STREAM_ID) {
                warn!("Rejecting second standalone stream for session {:?}", session_id);
                return Err(Rejection::conflict(
                    "Conflict: Only one SSE stream is allowed per session",
                ));
            }
            state.registry.register(STANDALONE_STREAM_ID, sender)
        };
        info!("Standalone SSE stream opened for session {:?}", session_id);

        let guard = self.stream_guard(STANDALONE_STREAM_ID, connection_id);
        let body = event_stream_body(
            Vec::new(),
            receiver,
            self.inner.config.keepalive_interval,
            guard,
        );
        Ok(event_stream_response(body, session_id.as_deref()))
    }

    async fn handle_delete(
        &self,
        headers: &HeaderMap,
    ) -> std::result::Result<Response<TransportBody>, Rejection> {
        let session_id = self.check_session(headers)?;
        info!("Terminating session {:?}", session_id);
        self.close().await;
        Ok(empty_response(StatusCode::OK, None))
    }

    /// Replay events after `last_event_id` and re-bind their stream to a new
    /// connection. Sends are held off meanwhile, so every event produced
    /// after the checkpoint is either replayed or delivered live, never both.
    async fn resume_stream(
        &self,
        last_event_id: &str,
        session_id: Option<String>,
    ) -> std::result::Result<Response<TransportBody>, Rejection> {
        let Some(store) = self.inner.config.event_store.clone() else {
            return Err(Rejection::not_implemented(
                "Not Implemented: stream resumption requires an event store",
            ));
        };

        let serial = self.inner.send_lock.lock().await;
        let mut replayed: Vec<(EventId, JsonRpcMessage)> = Vec::new();
        let stream_id = match store.replay_events_after(last_event_id, &mut replayed).await {
            Ok(stream_id) => stream_id,
            Err(e) => {
                drop(serial);
                error!("Replay after {} failed on {}: {}", last_event_id, store.backend_name(), e);
                self.report(TransportError::EventStore(e)).await;
                return Err(Rejection::internal("Internal error: failed to replay events"));
            }
        };

        let (sender, receiver) = mpsc::channel(self.inner.config.channel_buffer_size);
        let connection_id = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == Lifecycle::Closed {
                return Err(Rejection::service_unavailable(
                    "Service Unavailable: transport is closed",
                ));
            }
            // A call stream may be taken over by its reconnecting client; the
            // standalone stream follows the one-listener rule of a fresh GET.
            if stream_id == STANDALONE_STREAM_ID && state.registry.contains(STANDALONE_STREAM_ID) {
                warn!("Rejecting resume of the open standalone stream for session {:?}", session_id);
                return Err(Rejection::conflict(
                    "Conflict: Only one SSE stream is allowed per session",
                ));
            }
            state.registry.register(&stream_id, sender)
        };
        drop(serial);

        info!(
            "Resumed stream {} after {}: replaying {} event(s)",
            stream_id,
            last_event_id,
            replayed.len()
        );
        let replay = replayed
            .into_iter()
            .map(|(event_id, message)| SseFrame::message(Some(event_id), message))
            .collect();
        let guard = self.stream_guard(&stream_id, connection_id);
        let body = event_stream_body(
            replay,
            receiver,
            self.inner.config.keepalive_interval,
            guard,
        );
        Ok(event_stream_response(body, session_id.as_deref()))
    }

    /// Deliver a message to the client.
    ///
    /// Replies use their own id; anything else uses `related_request_id`.
    /// Messages without an id go to the standalone stream and are dropped
    /// when none is open.
    pub async fn send(
        &self,
        message: JsonRpcMessage,
        related_request_id: Option<RequestId>,
    ) -> Result<()> {
        let _serial = self.inner.send_lock.lock().await;

        if self.is_closed() {
            debug!("Send after close ignored");
            return Err(TransportError::Closed);
        }

        let request_id = if message.is_final_reply() {
            match message.id() {
                Some(id) => Some(id.clone()),
                None => return Err(self.report(TransportError::ReplyWithoutId).await),
            }
        } else {
            related_request_id
        };

        match request_id {
            None => self.send_standalone(message).await,
            Some(id) => self.send_related(message, id).await,
        }
    }

    async fn send_standalone(&self, message: JsonRpcMessage) -> Result<()> {
        let listening = self.inner.state.lock().registry.contains(STANDALONE_STREAM_ID);
        if !listening {
            self.discard(&message);
            return Ok(());
        }

        let event_id = self.persist(STANDALONE_STREAM_ID, &message).await?;
        let written = self
            .inner
            .state
            .lock()
            .registry
            .write(STANDALONE_STREAM_ID, SseFrame::message(event_id, message));
        match written {
            Ok(()) => Ok(()),
            Err(StreamWriteError::NotOpen(_)) => {
                debug!("Standalone stream went away before the write");
                self.inner
                    .counters
                    .discarded_notifications
                    .fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.write_failed(e).await;
                Ok(())
            }
        }
    }

    async fn send_related(&self, message: JsonRpcMessage, id: RequestId) -> Result<()> {
        let route = {
            let mut state = self.inner.state.lock();
            let bound = state.correlator.stream_for(&id).cloned();
            match bound {
                None => Route::Unbound,
                Some(stream_id) if state.correlator.has_buffered(&stream_id) => {
                    if message.is_final_reply() {
                        Route::Recorded(state.correlator.record_reply(&stream_id, id.clone(), message))
                    } else {
                        Route::DroppedIntermediate
                    }
                }
                Some(stream_id) => Route::Stream(stream_id, message),
            }
        };

        let (stream_id, message) = match route {
            Route::Unbound => {
                return Err(self.report(TransportError::NoStreamForRequest(id)).await);
            }
            Route::Recorded(outcome) => {
                debug!("Buffered reply for request {} recorded: {:?}", id, outcome);
                return Ok(());
            }
            Route::DroppedIntermediate => {
                debug!("Buffered mode: dropping intermediate message for request {}", id);
                self.inner
                    .counters
                    .discarded_notifications
                    .fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Route::Stream(stream_id, message) => (stream_id, message),
        };

        let event_id = self.persist(&stream_id, &message).await?;
        let is_final = message.is_final_reply();
        let written = {
            let mut state = self.inner.state.lock();
            let written = state
                .registry
                .write(&stream_id, SseFrame::message(event_id, message));
            // The first final reply closes the stream, even when other calls
            // of the same batch are still bound to it.
            if is_final {
                state.correlator.unbind(&id);
                state.registry.close(&stream_id);
            }
            written
        };

        match written {
            Ok(()) => Ok(()),
            Err(StreamWriteError::NotOpen(_)) => {
                warn!(
                    "Stream {} for request {} is not open; message not delivered{}",
                    stream_id,
                    id,
                    if self.inner.config.event_store.is_some() {
                        " (stored for replay)"
                    } else {
                        ""
                    }
                );
                Ok(())
            }
            Err(e) => {
                self.write_failed(e).await;
                Ok(())
            }
        }
    }

    /// Close every stream, fail every pending buffered batch with 503 and
    /// terminate the session. Idempotent.
    pub async fn close(&self) {
        let closed = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == Lifecycle::Closed {
                None
            } else {
                state.lifecycle = Lifecycle::Closed;
                state.session.terminated = true;
                let streams = state.registry.close_all();
                let batches = state.correlator.close_all();
                Some((state.session.session_id.clone(), streams, batches))
            }
        };

        if let Some((session_id, streams, batches)) = closed {
            info!(
                "Transport closed: session={:?}, streams={}, pending_batches={}",
                session_id, streams, batches
            );
            self.inner.handler.on_close().await;
        }
    }

    async fn initialize_session(
        &self,
        batch_len: usize,
    ) -> std::result::Result<Option<String>, Rejection> {
        let session_id = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == Lifecycle::Closed {
                return Err(Rejection::service_unavailable(
                    "Service Unavailable: transport is closed",
                ));
            }
            if state.session.already_initialized() {
                return Err(Rejection::invalid_request(
                    "Invalid Request: Server already initialized",
                ));
            }
            if batch_len > 1 {
                return Err(Rejection::invalid_request(
                    "Invalid Request: Only one initialization request is allowed",
                ));
            }
            let session_id = self
                .inner
                .config
                .session_id_generator
                .as_ref()
                .map(|generate| generate());
            state.session.session_id = session_id.clone();
            state.session.initialized = true;
            session_id
        };

        if let Some(session_id) = &session_id {
            info!("New session initialized: {}", session_id);
            self.inner.handler.on_session_initialized(session_id).await;
        }
        Ok(session_id)
    }

    /// Session guard, closed check and protocol version for non-initialize requests
    fn check_session(&self, headers: &HeaderMap) -> std::result::Result<Option<String>, Rejection> {
        let session_id = {
            let state = self.inner.state.lock();
            state.session.validate(headers)?;
            if state.lifecycle == Lifecycle::Closed {
                return Err(Rejection::service_unavailable(
                    "Service Unavailable: transport is closed",
                ));
            }
            state.session.session_id.clone()
        };

        extract_protocol_version(headers).map_err(|raw| {
            let supported: Vec<&str> = McpProtocolVersion::SUPPORTED
                .iter()
                .map(McpProtocolVersion::as_str)
                .collect();
            Rejection::bad_request(format!(
                "Bad Request: Unsupported protocol version {} (supported versions: {})",
                raw,
                supported.join(", ")
            ))
        })?;
        Ok(session_id)
    }

    fn check_dns_rebinding(&self, headers: &HeaderMap) -> std::result::Result<(), Rejection> {
        let config = &self.inner.config;
        if !config.enable_dns_rebinding_protection {
            return Ok(());
        }

        if !config.allowed_hosts.is_empty() {
            let host = extract_host(headers);
            if !host.is_some_and(|host| config.allowed_hosts.iter().any(|allowed| allowed == host)) {
                warn!("Rejected request with Host {:?}", host);
                return Err(Rejection::forbidden(format!(
                    "Invalid Host header: {}",
                    host.unwrap_or("<missing>")
                )));
            }
        }

        if !config.allowed_origins.is_empty()
            && let Some(origin) = extract_origin(headers)
            && !config.allowed_origins.iter().any(|allowed| allowed == origin)
        {
            warn!("Rejected request with Origin {}", origin);
            return Err(Rejection::forbidden(format!("Invalid Origin header: {}", origin)));
        }
        Ok(())
    }

    async fn read_body<B>(&self, headers: &HeaderMap, body: B) -> std::result::Result<Bytes, Rejection>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let limit = self.inner.config.max_body_size;
        let declared = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());
        if declared.is_some_and(|length| length > limit) {
            return Err(Rejection::payload_too_large(limit));
        }

        match Limited::new(body, limit).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(Rejection::payload_too_large(limit))
            }
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                Err(Rejection::from(ParseFailure::InvalidJson(format!(
                    "failed to read request body: {}",
                    e
                ))))
            }
        }
    }

    /// Bind a batch's call ids to `stream_id`. Ids already pending (or
    /// repeated inside the batch) reject the whole batch.
    fn reserve_calls(
        state: &mut TransportState,
        calls: &[RequestId],
        stream_id: &str,
    ) -> std::result::Result<(), Rejection> {
        if state.lifecycle == Lifecycle::Closed {
            return Err(Rejection::service_unavailable(
                "Service Unavailable: transport is closed",
            ));
        }
        let mut seen = HashSet::new();
        for id in calls {
            if !seen.insert(id) || state.correlator.is_bound(id) {
                warn!("Rejecting batch with duplicate request id {}", id);
                return Err(Rejection::invalid_request(format!(
                    "Invalid Request: duplicate request id {}",
                    id
                ))
                .with_id(Some(id.clone())));
            }
        }
        state.correlator.bind_all(calls, stream_id);
        Ok(())
    }

    /// Hand a batch to the application on its own task, in batch order.
    /// The HTTP response never waits for it.
    fn dispatch(&self, messages: Vec<JsonRpcMessage>, context: MessageContext) {
        let handler = Arc::clone(&self.inner.handler);
        tokio::spawn(async move {
            for message in messages {
                debug!(
                    "Delivering {} to application",
                    message.method().unwrap_or("reply")
                );
                handler.on_message(message, context.clone()).await;
            }
        });
    }

    async fn persist(&self, stream_id: &str, message: &JsonRpcMessage) -> Result<Option<EventId>> {
        let Some(store) = &self.inner.config.event_store else {
            return Ok(None);
        };
        match store.store_event(stream_id, message).await {
            Ok(event_id) => Ok(Some(event_id)),
            Err(e) => Err(self.report(TransportError::EventStore(e)).await),
        }
    }

    fn discard(&self, message: &JsonRpcMessage) {
        let total = self
            .inner
            .counters
            .discarded_notifications
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        debug!(
            "No standalone stream open, discarding {} (discarded so far: {})",
            message.method().unwrap_or("message"),
            total
        );
    }

    async fn write_failed(&self, error: StreamWriteError) {
        self.inner
            .counters
            .write_failures
            .fetch_add(1, Ordering::Relaxed);
        self.report(TransportError::StreamWrite(error)).await;
    }

    async fn report(&self, error: TransportError) -> TransportError {
        error!("{}", error);
        self.inner.handler.on_error(&error).await;
        error
    }

    fn stream_guard(&self, stream_id: &str, connection_id: ConnectionId) -> StreamGuard {
        StreamGuard {
            inner: Arc::downgrade(&self.inner),
            stream_id: stream_id.to_string(),
            connection_id,
        }
    }
}

/// Unregisters a stream when its response body is dropped
struct StreamGuard {
    inner: Weak<Inner>,
    stream_id: StreamId,
    connection_id: ConnectionId,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut state = inner.state.lock();
        if state
            .registry
            .remove_connection(&self.stream_id, self.connection_id)
        {
            // Without an event store nothing can resume this stream.
            if inner.config.event_store.is_none() {
                let unbound = state.correlator.unbind_stream(&self.stream_id);
                debug!(
                    "Client left stream {}: {} pending call(s) unbound",
                    self.stream_id, unbound
                );
            } else {
                debug!("Client left stream {}; bindings kept for resumption", self.stream_id);
            }
        }
    }
}

/// Forgets a buffered batch whose POST was cancelled
struct PendingBatchGuard {
    inner: Weak<Inner>,
    stream_id: StreamId,
}

impl Drop for PendingBatchGuard {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if inner.state.lock().correlator.remove_buffered(&self.stream_id) {
            debug!("Buffered batch on stream {} abandoned by client", self.stream_id);
        }
    }
}
