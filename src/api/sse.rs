//! Server-Sent Events support
//!
//! Re-emits the aggregator's normalized deltas to the browser, one SSE
//! frame per delta, with the delta kind as the event name.

use crate::protocol::{Delta, DeltaSink};
use async_trait::async_trait;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// One frame bound for the client.
#[derive(Debug)]
pub enum OutboundEvent {
    Delta(Delta),
    Usage { total_tokens: u64 },
    Error { message: String },
}

/// Sink forwarding deltas into the response channel.
///
/// The bounded channel is what couples decode progress to the client:
/// a slow reader fills it and `emit` waits. Send failures mean the client
/// went away; the invocation keeps running server-side.
pub struct ChannelSink {
    tx: mpsc::Sender<OutboundEvent>,
    delivered: bool,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<OutboundEvent>) -> Self {
        Self {
            tx,
            delivered: false,
        }
    }

    /// Emits the trailing usage frame.
    pub async fn finish_with_usage(&mut self, total_tokens: Option<u64>) {
        if let Some(total_tokens) = total_tokens {
            let _ = self.tx.send(OutboundEvent::Usage { total_tokens }).await;
        }
    }

    /// Emits a terminal error frame, unless output already reached the
    /// client; a late error after streamed output would contradict it.
    pub async fn finish_with_error(&mut self, message: &str) {
        if self.delivered {
            return;
        }
        let _ = self
            .tx
            .send(OutboundEvent::Error {
                message: message.to_string(),
            })
            .await;
    }
}

#[async_trait]
impl DeltaSink for ChannelSink {
    async fn emit(&mut self, delta: Delta) {
        if self.tx.send(OutboundEvent::Delta(delta)).await.is_ok() {
            self.delivered = true;
        }
    }
}

/// Convert the outbound channel into an SSE response stream
pub fn delta_stream(
    rx: mpsc::Receiver<OutboundEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(|event| Ok(outbound_to_axum(event)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn outbound_to_axum(event: OutboundEvent) -> Event {
    match event {
        OutboundEvent::Delta(delta) => {
            let data = serde_json::to_string(&delta).unwrap_or_else(|_| "{}".to_string());
            Event::default().event(delta.kind.as_str()).data(data)
        }
        OutboundEvent::Usage { total_tokens } => Event::default().event("response.usage").data(
            json!({"kind": "response.usage", "total_tokens": total_tokens}).to_string(),
        ),
        OutboundEvent::Error { message } => Event::default()
            .event("error")
            .data(json!({"message": message}).to_string()),
    }
}
