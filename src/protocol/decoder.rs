//! Server-sent event frame decoder
//!
//! Reassembles newline-delimited frames out of a raw byte stream and maps
//! each frame's JSON payload onto a [`StreamEvent`].

use super::events::StreamEvent;
use bytes::Bytes;
use futures::stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use thiserror::Error;

/// Fatal decode failure for a stream.
///
/// Schema mismatches downgrade to [`StreamEvent::Unknown`]; only a payload
/// that is not valid JSON at all is a protocol violation worth failing on.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame payload: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

/// Incremental frame decoder.
///
/// Only complete lines are ever parsed: bytes still buffered without a
/// terminating newline when the stream ends are dropped, not flushed.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    current_event: Option<String>,
    data_lines: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk of bytes, returning every event completed by it.
    ///
    /// Invalid UTF-8 is replaced, never fatal.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, DecodeError> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            // Blank line terminates the frame.
            if line.trim().is_empty() {
                if !self.data_lines.is_empty() {
                    let payload = self.data_lines.join("\n");
                    events.push(decode_event(&payload)?);
                }
                self.current_event = None;
                self.data_lines.clear();
                continue;
            }

            if let Some(rest) = line.strip_prefix("event:") {
                self.current_event = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("data:") {
                let rest = rest.strip_prefix(' ').unwrap_or(rest);
                self.data_lines.push(rest.to_string());
            } else if line.starts_with(':') {
                // Comment line.
            } else {
                self.data_lines.push(line.to_string());
            }
        }

        Ok(events)
    }

    /// Event name from the most recent `event:` line of the open frame.
    ///
    /// Dispatch keys off the payload's `type` field instead; the name is
    /// kept for observability.
    #[allow(dead_code)] // Observability accessor
    pub fn current_event_name(&self) -> Option<&str> {
        self.current_event.as_deref()
    }
}

/// Decodes one joined frame payload into a typed event.
fn decode_event(payload: &str) -> Result<StreamEvent, DecodeError> {
    let value: Value = serde_json::from_str(payload)?;
    match StreamEvent::deserialize(&value) {
        Ok(event) => Ok(event),
        Err(_) => {
            let event_type = value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            Ok(StreamEvent::Unknown {
                event_type,
                raw: value,
            })
        }
    }
}

/// Adapts a byte-chunk stream into a lazy, ordered event stream.
///
/// Transport read errors end the sequence at the last fully-parsed frame;
/// only malformed JSON surfaces as an error item.
pub fn event_stream<B, E>(bytes: B) -> impl Stream<Item = Result<StreamEvent, DecodeError>> + Send
where
    B: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct State<B> {
        bytes: B,
        decoder: FrameDecoder,
        pending: VecDeque<StreamEvent>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        for event in state.decoder.push_chunk(&chunk)? {
                            state.pending.push_back(event);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "response byte stream ended early");
                        state.done = true;
                    }
                    None => state.done = true,
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_partial_chunk_boundaries() {
        let mut decoder = FrameDecoder::new();
        let part1 = b"event: message\ndata: {\"type\":\"response.output_text.delta\",\"sequence_number\":1,\"item_id\":\"m1\",\"output_index\":0,\"content_index\":0,\"delta\":\"hel";
        let part2 = b"lo\"}\n\n";

        let events = decoder.push_chunk(part1).unwrap();
        assert!(events.is_empty());

        let events = decoder.push_chunk(part2).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::OutputTextDelta { delta, .. } if delta == "hello"
        ));
    }

    #[test]
    fn joins_multiple_data_lines_with_newline() {
        let mut decoder = FrameDecoder::new();
        // A JSON payload split across two data: lines must be rejoined
        // with a newline before parsing.
        let frame = b"data: {\"type\":\"response.output_item.done\",\n\
data: \"sequence_number\":4,\"output_index\":0,\"item\":{}}\n\n";
        let events = decoder.push_chunk(frame).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::OutputItemDone { .. }));
    }

    #[test]
    fn comment_and_event_only_frames_yield_nothing() {
        let mut decoder = FrameDecoder::new();
        let events = decoder
            .push_chunk(b": keep-alive\n\nevent: ping\n\n")
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(decoder.current_event_name(), None);
    }

    #[test]
    fn unknown_tag_degrades_to_unknown_event() {
        let mut decoder = FrameDecoder::new();
        let events = decoder
            .push_chunk(b"data: {\"type\":\"response.audio.delta\",\"sequence_number\":2}\n\n")
            .unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Unknown { event_type, raw } => {
                assert_eq!(event_type, "response.audio.delta");
                assert_eq!(raw["sequence_number"], 2);
            }
            other => panic!("expected unknown event, got {other:?}"),
        }
    }

    #[test]
    fn recognized_tag_with_bad_shape_degrades_to_unknown() {
        let mut decoder = FrameDecoder::new();
        // output_text.delta without its required fields is a shape
        // mismatch, not a protocol violation.
        let events = decoder
            .push_chunk(b"data: {\"type\":\"response.output_text.delta\"}\n\n")
            .unwrap();
        assert!(matches!(
            &events[0],
            StreamEvent::Unknown { event_type, .. } if event_type == "response.output_text.delta"
        ));
    }

    #[test]
    fn malformed_json_is_fatal() {
        let mut decoder = FrameDecoder::new();
        let result = decoder.push_chunk(b"data: {not json\n\n");
        assert!(matches!(result, Err(DecodeError::MalformedJson(_))));
    }

    #[test]
    fn trailing_bytes_without_newline_are_never_flushed() {
        let mut decoder = FrameDecoder::new();
        let events = decoder
            .push_chunk(b"data: {\"type\":\"response.created\"}")
            .unwrap();
        // No terminating newline: the line stays buffered and is dropped
        // if the stream ends here.
        assert!(events.is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let mut decoder = FrameDecoder::new();
        let mut frame = b"data: {\"type\":\"bogus.".to_vec();
        frame.push(0xFF);
        frame.extend_from_slice(b"\"}\n\n");
        let events = decoder.push_chunk(&frame).unwrap();
        assert!(matches!(events[0], StreamEvent::Unknown { .. }));
    }

    #[test]
    fn strips_single_leading_space_only() {
        let mut decoder = FrameDecoder::new();
        let events = decoder
            .push_chunk(b"data:  {\"type\":\"x\"}\n\n")
            .unwrap();
        // Two spaces after the colon: one is framing, one is payload.
        // A leading space before '{' still parses as JSON.
        assert!(matches!(events[0], StreamEvent::Unknown { .. }));
    }

    #[tokio::test]
    async fn event_stream_ends_gracefully_on_transport_error() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"type\":\"response.created\",\"sequence_number\":0,\"response\":{\"id\":\"r1\",\"status\":\"in_progress\"}}\n\n",
            )),
            Err("connection reset".to_string()),
        ];
        let events: Vec<_> = event_stream(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::Created { .. }
        ));
    }
}
