//! Server-Sent Events framing and response bodies

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tracing::{debug, error};

use turul_mcp_event_store::EventId;
use turul_mcp_json_rpc::JsonRpcMessage;

use crate::TransportBody;

/// One unit written to an open event stream
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// A JSON-RPC message, with the durable id when an event store produced one
    Message {
        event_id: Option<EventId>,
        message: JsonRpcMessage,
    },
    /// Comment frame that keeps idle connections open
    KeepAlive,
}

impl SseFrame {
    pub fn message(event_id: Option<EventId>, message: JsonRpcMessage) -> Self {
        SseFrame::Message { event_id, message }
    }

    /// Format as SSE wire text
    pub fn format(&self) -> String {
        match self {
            SseFrame::Message { event_id, message } => {
                let data = serde_json::to_string(message).unwrap_or_else(|e| {
                    error!("Failed to serialize SSE message: {}", e);
                    "{}".to_string()
                });
                match event_id {
                    Some(id) => format!("event: message\nid: {}\ndata: {}\n\n", id, data),
                    None => format!("event: message\ndata: {}\n\n", data),
                }
            }
            SseFrame::KeepAlive => ": keepalive\n\n".to_string(),
        }
    }
}

/// Build a streaming body that first yields `replay`, then every frame sent
/// on `receiver` until all senders are dropped.
///
/// `guard` lives exactly as long as the body; dropping the body (client
/// disconnect or normal completion) drops it.
pub(crate) fn event_stream_body<G>(
    replay: Vec<SseFrame>,
    mut receiver: mpsc::Receiver<SseFrame>,
    keepalive: Option<Duration>,
    guard: G,
) -> TransportBody
where
    G: Send + 'static,
{
    let frames = async_stream::stream! {
        let _guard = guard;

        for frame in replay {
            yield frame;
        }

        let mut keepalive = keepalive
            .filter(|period| !period.is_zero())
            .map(|period| tokio::time::interval_at(Instant::now() + period, period));

        loop {
            tokio::select! {
                frame = receiver.recv() => {
                    match frame {
                        Some(frame) => {
                            yield frame;
                        }
                        None => {
                            debug!("Event stream channel closed");
                            break;
                        }
                    }
                },
                _ = next_keepalive(&mut keepalive) => {
                    yield SseFrame::KeepAlive;
                }
            }
        }
    };

    let body = frames.map(|frame| Ok::<_, Infallible>(Frame::data(Bytes::from(frame.format()))));
    StreamBody::new(body).boxed_unsync()
}

async fn next_keepalive(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
