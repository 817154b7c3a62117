//! In-Memory Event Store Implementation
//!
//! Keeps every stored event in insertion order behind a single lock. Event
//! identifiers have the form `<streamId>_<sequence>` where the sequence is a
//! process-wide counter, so ordering across streams is total.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use turul_mcp_json_rpc::JsonRpcMessage;

use crate::{EventId, EventSink, EventStore, EventStoreError, StoredEvent, StreamId};

/// Configuration for the in-memory event store
#[derive(Debug, Clone)]
pub struct InMemoryEventStoreConfig {
    /// Maximum number of events retained; the oldest are evicted first
    pub max_events: usize,
}

impl Default for InMemoryEventStoreConfig {
    fn default() -> Self {
        Self { max_events: 10_000 }
    }
}

/// Counters describing the current store contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryEventStoreStats {
    pub total_events: usize,
    pub total_streams: usize,
    pub evicted_events: u64,
}

#[derive(Default)]
struct EventLog {
    /// sequence -> event, iterated in insertion order
    events: BTreeMap<u64, StoredEvent>,
    /// event id -> sequence
    index: HashMap<EventId, u64>,
    evicted: u64,
}

/// In-memory event store
#[derive(Clone)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<EventLog>>,
    config: InMemoryEventStoreConfig,
    event_counter: Arc<AtomicU64>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::with_config(InMemoryEventStoreConfig::default())
    }

    pub fn with_config(config: InMemoryEventStoreConfig) -> Self {
        Self {
            log: Arc::new(RwLock::new(EventLog::default())),
            config,
            event_counter: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &InMemoryEventStoreConfig {
        &self.config
    }

    pub async fn stats(&self) -> InMemoryEventStoreStats {
        let log = self.log.read().await;
        let mut streams: Vec<&str> = log.events.values().map(|e| e.stream_id.as_str()).collect();
        streams.sort_unstable();
        streams.dedup();
        InMemoryEventStoreStats {
            total_events: log.events.len(),
            total_streams: streams.len(),
            evicted_events: log.evicted,
        }
    }

    /// Look up a single stored event
    pub async fn get_event(&self, event_id: &str) -> Option<StoredEvent> {
        let log = self.log.read().await;
        log.index
            .get(event_id)
            .and_then(|sequence| log.events.get(sequence))
            .cloned()
    }

    /// Drop every event belonging to one stream
    pub async fn remove_stream(&self, stream_id: &str) -> usize {
        let mut log = self.log.write().await;
        let doomed: Vec<(u64, EventId)> = log
            .events
            .iter()
            .filter(|(_, event)| event.stream_id == stream_id)
            .map(|(sequence, event)| (*sequence, event.event_id.clone()))
            .collect();
        for (sequence, event_id) in &doomed {
            log.events.remove(sequence);
            log.index.remove(event_id);
        }
        debug!("Removed {} events for stream {}", doomed.len(), stream_id);
        doomed.len()
    }

    fn evict_oldest(log: &mut EventLog, max_events: usize) {
        while log.events.len() > max_events {
            let Some((_, event)) = log.events.pop_first() else {
                break;
            };
            log.index.remove(&event.event_id);
            log.evicted += 1;
            trace!("Evicted event {}", event.event_id);
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    fn backend_name(&self) -> &'static str {
        "InMemory"
    }

    async fn store_event(
        &self,
        stream_id: &str,
        message: &JsonRpcMessage,
    ) -> Result<EventId, EventStoreError> {
        let mut log = self.log.write().await;

        // Allocated under the write lock so sequence order matches map order.
        let sequence = self.event_counter.fetch_add(1, Ordering::SeqCst);
        let event_id = format!("{stream_id}_{sequence}");

        let event = StoredEvent {
            event_id: event_id.clone(),
            stream_id: stream_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
            message: message.clone(),
        };
        log.events.insert(sequence, event);
        log.index.insert(event_id.clone(), sequence);
        Self::evict_oldest(&mut log, self.config.max_events);

        trace!("Stored event {} on stream {}", event_id, stream_id);
        Ok(event_id)
    }

    async fn replay_events_after(
        &self,
        last_event_id: &str,
        sink: &mut dyn EventSink,
    ) -> Result<StreamId, EventStoreError> {
        let log = self.log.read().await;

        let sequence = *log
            .index
            .get(last_event_id)
            .ok_or_else(|| EventStoreError::EventNotFound(last_event_id.to_string()))?;
        let stream_id = log
            .events
            .get(&sequence)
            .map(|event| event.stream_id.clone())
            .ok_or_else(|| EventStoreError::EventNotFound(last_event_id.to_string()))?;

        let mut replayed = 0usize;
        for event in log
            .events
            .range(sequence + 1..)
            .map(|(_, event)| event)
            .filter(|event| event.stream_id == stream_id)
        {
            sink.emit(event.event_id.clone(), event.message.clone());
            replayed += 1;
        }

        debug!(
            "Replayed {} events after {} on stream {}",
            replayed, last_event_id, stream_id
        );
        Ok(stream_id)
    }
}
