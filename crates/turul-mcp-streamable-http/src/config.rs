//! Transport configuration and builder

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use turul_mcp_event_store::EventStore;

use crate::handler::{DiscardHandler, MessageHandler};
use crate::transport::StreamableHttpTransport;

/// Produces the id of a new session
pub type SessionIdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Configuration for one transport instance
#[derive(Clone)]
pub struct TransportConfig {
    /// `None` runs the transport stateless: no session ids, no session checks
    pub session_id_generator: Option<SessionIdGenerator>,
    /// Reply with one buffered JSON body instead of an event stream
    pub enable_json_response: bool,
    /// Optional persistence used for resumable streams
    pub event_store: Option<Arc<dyn EventStore>>,
    /// Interval between `: keepalive` comments on idle streams; `None` disables
    pub keepalive_interval: Option<Duration>,
    /// Per-stream channel buffer
    pub channel_buffer_size: usize,
    /// Maximum accepted POST body
    pub max_body_size: usize,
    /// Validate `Host` and `Origin` against the allow-lists below
    pub enable_dns_rebinding_protection: bool,
    pub allowed_hosts: Vec<String>,
    pub allowed_origins: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            session_id_generator: Some(default_session_id_generator()),
            enable_json_response: false,
            event_store: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            channel_buffer_size: 1000,
            max_body_size: 4 * 1024 * 1024, // 4MB
            enable_dns_rebinding_protection: false,
            allowed_hosts: Vec::new(),
            allowed_origins: Vec::new(),
        }
    }
}

impl TransportConfig {
    pub fn is_stateless(&self) -> bool {
        self.session_id_generator.is_none()
    }
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("stateless", &self.is_stateless())
            .field("enable_json_response", &self.enable_json_response)
            .field(
                "event_store",
                &self.event_store.as_ref().map(|store| store.backend_name()),
            )
            .field("keepalive_interval", &self.keepalive_interval)
            .field("channel_buffer_size", &self.channel_buffer_size)
            .field("max_body_size", &self.max_body_size)
            .field(
                "enable_dns_rebinding_protection",
                &self.enable_dns_rebinding_protection,
            )
            .field("allowed_hosts", &self.allowed_hosts)
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

/// UUID v7 session ids
pub fn default_session_id_generator() -> SessionIdGenerator {
    Arc::new(|| Uuid::now_v7().to_string())
}

/// Builder for [`StreamableHttpTransport`]
pub struct StreamableHttpTransportBuilder {
    config: TransportConfig,
    handler: Arc<dyn MessageHandler>,
}

impl StreamableHttpTransportBuilder {
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
            handler: Arc::new(DiscardHandler),
        }
    }

    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            config,
            handler: Arc::new(DiscardHandler),
        }
    }

    /// Set the application callbacks
    pub fn handler<H>(mut self, handler: H) -> Self
    where
        H: MessageHandler + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    pub fn shared_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn session_id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.config.session_id_generator = Some(Arc::new(generator));
        self
    }

    /// Run without sessions
    pub fn stateless(mut self) -> Self {
        self.config.session_id_generator = None;
        self
    }

    pub fn json_response(mut self, enable: bool) -> Self {
        self.config.enable_json_response = enable;
        self
    }

    pub fn event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.config.event_store = Some(store);
        self
    }

    pub fn keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    pub fn channel_buffer_size(mut self, size: usize) -> Self {
        self.config.channel_buffer_size = size.max(1);
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Enable `Host` / `Origin` validation with the given allow-lists.
    /// An empty list leaves that header unchecked.
    pub fn dns_rebinding_protection(
        mut self,
        allowed_hosts: Vec<String>,
        allowed_origins: Vec<String>,
    ) -> Self {
        self.config.enable_dns_rebinding_protection = true;
        self.config.allowed_hosts = allowed_hosts;
        self.config.allowed_origins = allowed_origins;
        self
    }

    pub fn build(self) -> StreamableHttpTransport {
        StreamableHttpTransport::new(self.config, self.handler)
    }
}

impl Default for StreamableHttpTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
