//! Response Correlator
//!
//! Binds pending call ids to the stream that will carry their replies and,
//! in buffered-JSON mode, gathers the replies of one batch until every call
//! has answered.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use turul_mcp_event_store::StreamId;
use turul_mcp_json_rpc::{JsonRpcMessage, RequestId};

/// How a buffered batch ended
#[derive(Debug)]
pub enum BufferedOutcome {
    /// Replies in the batch's original call order
    Complete(Vec<JsonRpcMessage>),
    /// The transport closed before every call answered
    Closed,
}

/// Replies collected so far for one buffered batch
struct BufferedReplySet {
    order: Vec<RequestId>,
    replies: HashMap<RequestId, JsonRpcMessage>,
    resolver: oneshot::Sender<BufferedOutcome>,
}

impl BufferedReplySet {
    fn is_complete(&self) -> bool {
        self.order.iter().all(|id| self.replies.contains_key(id))
    }
}

/// What happened to a final reply handed to [`Correlator::record_reply`]
#[derive(Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Stored; other calls in the batch are still outstanding
    Pending,
    /// Last reply of the batch; the held response has been resolved
    Resolved,
    /// No buffered set exists for the stream
    NoBatch,
}

#[derive(Default)]
pub struct Correlator {
    bindings: HashMap<RequestId, StreamId>,
    buffered: HashMap<StreamId, BufferedReplySet>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, id: &RequestId) -> bool {
        self.bindings.contains_key(id)
    }

    pub fn stream_for(&self, id: &RequestId) -> Option<&StreamId> {
        self.bindings.get(id)
    }

    pub fn bind_all(&mut self, ids: &[RequestId], stream_id: &str) {
        for id in ids {
            self.bindings.insert(id.clone(), stream_id.to_string());
        }
    }

    pub fn unbind(&mut self, id: &RequestId) -> Option<StreamId> {
        self.bindings.remove(id)
    }

    /// Drop every binding pointing at `stream_id`
    pub fn unbind_stream(&mut self, stream_id: &str) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|_, bound| bound != stream_id);
        before - self.bindings.len()
    }

    /// Open a buffered reply set for a batch of calls. The receiver resolves
    /// exactly once.
    pub fn register_buffered(
        &mut self,
        stream_id: &str,
        order: Vec<RequestId>,
    ) -> oneshot::Receiver<BufferedOutcome> {
        let (resolver, receiver) = oneshot::channel();
        self.buffered.insert(
            stream_id.to_string(),
            BufferedReplySet {
                order,
                replies: HashMap::new(),
                resolver,
            },
        );
        receiver
    }

    pub fn has_buffered(&self, stream_id: &str) -> bool {
        self.buffered.contains_key(stream_id)
    }

    /// Record a final reply for a buffered batch. On the last reply the set
    /// is removed, its ids are unbound and the held response is resolved.
    pub fn record_reply(
        &mut self,
        stream_id: &str,
        id: RequestId,
        reply: JsonRpcMessage,
    ) -> RecordOutcome {
        let Some(set) = self.buffered.get_mut(stream_id) else {
            return RecordOutcome::NoBatch;
        };
        set.replies.insert(id, reply);
        if !set.is_complete() {
            return RecordOutcome::Pending;
        }

        let Some(mut set) = self.buffered.remove(stream_id) else {
            return RecordOutcome::NoBatch;
        };
        let replies: Vec<JsonRpcMessage> = set
            .order
            .iter()
            .filter_map(|id| set.replies.remove(id))
            .collect();
        for id in &set.order {
            self.bindings.remove(id);
        }
        if set.resolver.send(BufferedOutcome::Complete(replies)).is_err() {
            warn!("Buffered response for stream {} was abandoned by its client", stream_id);
        }
        debug!("Buffered batch on stream {} complete", stream_id);
        RecordOutcome::Resolved
    }

    /// Forget a buffered batch without resolving it (client went away).
    pub fn remove_buffered(&mut self, stream_id: &str) -> bool {
        let removed = self.buffered.remove(stream_id).is_some();
        self.unbind_stream(stream_id);
        removed
    }

    /// Resolve every outstanding buffered batch as closed and clear all bindings.
    pub fn close_all(&mut self) -> usize {
        let pending = self.buffered.len();
        for (stream_id, set) in self.buffered.drain() {
            if set.resolver.send(BufferedOutcome::Closed).is_err() {
                debug!("Buffered response for stream {} already gone", stream_id);
            }
        }
        self.bindings.clear();
        pending
    }

    pub fn pending_calls(&self) -> usize {
        self.bindings.len()
    }

    pub fn pending_batches(&self) -> usize {
        self.buffered.len()
    }
}
