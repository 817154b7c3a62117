//! HTTP server for hosting streamable HTTP transports
//!
//! Keeps one [`StreamableHttpTransport`] per MCP session. A request without
//! an `Mcp-Session-Id` header is handed to a fresh transport from the
//! factory; if that request opened a session, the transport is kept under
//! the new id. Requests naming an unknown session get 404.
//!
//! Sessions without traffic, open streams or pending batches for longer
//! than [`ServerConfig::session_idle_timeout`] are closed and evicted by a
//! periodic sweep that runs alongside the accept loop.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use http_body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::protocol::extract_session_id;
use crate::responses::{Rejection, not_found_response};
use crate::{StreamableHttpTransport, TransportBody, TransportError};

/// Builds the transport for a new session
pub type TransportFactory = Arc<dyn Fn() -> StreamableHttpTransport + Send + Sync>;

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No transport factory configured")]
    MissingTransportFactory,
}

/// Configuration for the HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_address: SocketAddr,
    /// Path for the MCP endpoint
    pub mcp_path: String,
    /// Idle sessions are closed after this long; `None` keeps them forever
    pub session_idle_timeout: Option<Duration>,
    /// How often idle sessions are looked for
    pub cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            mcp_path: "/mcp".to_string(),
            session_idle_timeout: Some(Duration::from_secs(30 * 60)),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Builder for [`StreamableHttpServer`]
#[derive(Default)]
pub struct StreamableHttpServerBuilder {
    config: ServerConfig,
    factory: Option<TransportFactory>,
}

impl StreamableHttpServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    pub fn mcp_path(mut self, path: impl Into<String>) -> Self {
        self.config.mcp_path = path.into();
        self
    }

    pub fn session_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.session_idle_timeout = timeout;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    /// Set the factory that creates one transport per session
    pub fn transport_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> StreamableHttpTransport + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn build(self) -> Result<StreamableHttpServer, ServerError> {
        let factory = self.factory.ok_or(ServerError::MissingTransportFactory)?;
        Ok(StreamableHttpServer {
            config: Arc::new(self.config),
            factory,
            transports: Arc::new(RwLock::new(HashMap::new())),
        })
    }
}

struct SessionEntry {
    transport: StreamableHttpTransport,
    last_activity: Instant,
}

/// Multi-session streamable HTTP server
#[derive(Clone)]
pub struct StreamableHttpServer {
    config: Arc<ServerConfig>,
    factory: TransportFactory,
    transports: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl StreamableHttpServer {
    pub fn builder() -> StreamableHttpServerBuilder {
        StreamableHttpServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.transports.read().len()
    }

    /// Transport serving `session_id`, if any
    pub fn transport(&self, session_id: &str) -> Option<StreamableHttpTransport> {
        self.transports
            .read()
            .get(session_id)
            .map(|entry| entry.transport.clone())
    }

    /// Bind the configured address and serve until an accept error
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_address).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        info!("Streamable HTTP server listening on {}", listener.local_addr()?);
        info!("MCP endpoint available at: {}", self.config.mcp_path);

        let mut sweep = self.config.session_idle_timeout.map(|_| {
            let period = self.config.cleanup_interval.max(Duration::from_millis(1));
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let (stream, peer_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = next_sweep(&mut sweep) => {
                    self.expire_idle_sessions().await;
                    continue;
                }
            };
            debug!("New connection from {}", peer_addr);

            let server = self.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, std::convert::Infallible>(server.handle_request(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    if err.is_incomplete_message() {
                        debug!("Client disconnected (normal): {}", err);
                    } else {
                        error!("Error serving connection: {}", err);
                    }
                }
            });
        }
    }

    /// Close and evict sessions idle for longer than the configured timeout.
    /// Returns the evicted session ids.
    pub async fn expire_idle_sessions(&self) -> Vec<String> {
        let Some(timeout) = self.config.session_idle_timeout else {
            return Vec::new();
        };

        let expired: Vec<(String, StreamableHttpTransport)> = {
            let mut transports = self.transports.write();
            let idle: Vec<String> = transports
                .iter()
                .filter(|(_, entry)| {
                    let stats = entry.transport.stats();
                    entry.last_activity.elapsed() >= timeout
                        && stats.open_streams == 0
                        && stats.pending_batches == 0
                })
                .map(|(session_id, _)| session_id.clone())
                .collect();
            idle.into_iter()
                .filter_map(|session_id| {
                    transports
                        .remove(&session_id)
                        .map(|entry| (session_id, entry.transport))
                })
                .collect()
        };

        for (session_id, transport) in &expired {
            debug!("Expiring idle session {}", session_id);
            transport.close().await;
        }
        if !expired.is_empty() {
            info!("Expired {} idle session(s)", expired.len());
        }
        expired.into_iter().map(|(session_id, _)| session_id).collect()
    }

    fn touch(&self, session_id: &str) {
        if let Some(entry) = self.transports.write().get_mut(session_id) {
            entry.last_activity = Instant::now();
        }
    }

    /// Route one request to the transport owning its session
    pub async fn handle_request<B>(&self, req: Request<B>) -> Response<TransportBody>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        if req.uri().path() != self.config.mcp_path {
            debug!("No route for {} {}", req.method(), req.uri().path());
            return not_found_response();
        }

        let session_id = extract_session_id(req.headers());
        match session_id {
            Some(session_id) => {
                let Some(transport) = self.transport(&session_id) else {
                    debug!("Unknown session {}", session_id);
                    return Rejection::session_not_found().into_response();
                };
                self.touch(&session_id);
                let response = transport.handle(req).await;
                if transport.is_closed() {
                    self.transports.write().remove(&session_id);
                    info!("Session {} removed", session_id);
                } else {
                    self.touch(&session_id);
                }
                response
            }
            None if req.method() == Method::POST => self.handle_sessionless_post(req).await,
            None if req.method() == Method::GET || req.method() == Method::DELETE => {
                Rejection::bad_request("Bad Request: Mcp-Session-Id header is required")
                    .into_response()
            }
            None => Rejection::method_not_allowed().into_response(),
        }
    }

    /// A POST without a session header either initializes a new session or
    /// runs on a stateless transport.
    async fn handle_sessionless_post<B>(&self, req: Request<B>) -> Response<TransportBody>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let transport = (self.factory)();
        if let Err(e) = transport.start() {
            error!("Failed to start transport: {}", e);
            return Rejection::internal("Internal error: transport unavailable").into_response();
        }

        let response = transport.handle(req).await;
        if let Some(session_id) = transport.session_id()
            && response.status().is_success()
            && !transport.is_closed()
        {
            self.transports.write().insert(
                session_id.clone(),
                SessionEntry {
                    transport,
                    last_activity: Instant::now(),
                },
            );
            info!("Session {} registered", session_id);
        }
        response
    }
}

async fn next_sweep(sweep: &mut Option<Interval>) {
    match sweep {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
