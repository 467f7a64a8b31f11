//! Model endpoint abstraction
//!
//! Provides the streaming transport used by the agent turn loop. The
//! transport seam exists so the loop can be driven by a scripted fake in
//! tests.

mod client;
mod error;
mod types;

pub use client::ResponsesClient;
pub use error::{LlmError, LlmErrorKind};
pub use types::*;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Raw body bytes of one streaming response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Transport capable of opening one streamed turn against the endpoint.
#[async_trait]
pub trait ResponsesTransport: Send + Sync {
    /// Issues the request and hands back the live response body.
    ///
    /// A non-success status fails here, with the diagnostic body captured
    /// in the error; retries are the caller's concern.
    async fn stream_turn(&self, body: &RequestBody) -> Result<ByteStream, LlmError>;
}
