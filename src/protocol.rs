//! Streaming protocol layer for the model endpoint.
//!
//! Decodes the endpoint's server-sent event framing into typed wire events,
//! and aggregates those events into per-item state plus a normalized delta
//! feed for consumers.

mod aggregator;
mod decoder;
mod events;

pub use aggregator::{DeltaSink, ResponseAggregator};
pub use decoder::{event_stream, DecodeError, FrameDecoder};
pub use events::{
    AggregatedResponse, CustomToolCall, Delta, DeltaKind, FunctionCall, ResponseSnapshot,
    StreamEvent, Usage,
};

#[cfg(test)]
mod proptests;
