//! Property tests for the streaming protocol layer.

use super::aggregator::{DeltaSink, ResponseAggregator};
use super::decoder::{DecodeError, FrameDecoder};
use super::events::{Delta, DeltaKind, ResponseSnapshot, StreamEvent};
use async_trait::async_trait;
use futures::executor::block_on;
use futures::stream;
use proptest::prelude::*;
use serde_json::json;

#[derive(Default)]
struct CollectSink {
    deltas: Vec<Delta>,
}

#[async_trait]
impl DeltaSink for CollectSink {
    async fn emit(&mut self, delta: Delta) {
        self.deltas.push(delta);
    }
}

fn completed_event(seq: u64) -> StreamEvent {
    StreamEvent::Completed {
        sequence_number: seq,
        response: ResponseSnapshot {
            id: "resp".to_string(),
            status: "completed".to_string(),
            ..Default::default()
        },
    }
}

/// Splits an ASCII string at the given byte positions (modulo length).
fn split_at_positions(s: &str, cuts: &[usize]) -> Vec<String> {
    let mut positions: Vec<usize> = cuts.iter().map(|c| c % (s.len() + 1)).collect();
    positions.sort_unstable();

    let mut fragments = Vec::new();
    let mut last = 0;
    for cut in positions {
        if cut > last {
            fragments.push(s[last..cut].to_string());
            last = cut;
        }
    }
    if last < s.len() {
        fragments.push(s[last..].to_string());
    }
    fragments
}

proptest! {
    /// Any fragmentation of the same text aggregates to the same final
    /// text, and the streamed text deltas concatenate to it exactly.
    #[test]
    fn aggregated_text_is_fragmentation_invariant(
        text in "[ -~]{0,60}",
        cuts in proptest::collection::vec(any::<usize>(), 0..6),
    ) {
        let fragments = split_at_positions(&text, &cuts);

        let mut events = vec![StreamEvent::OutputItemAdded {
            sequence_number: 0,
            output_index: 0,
            item: json!({"type": "message", "id": "m1", "role": "assistant"}),
        }];
        for (i, fragment) in fragments.iter().enumerate() {
            events.push(StreamEvent::OutputTextDelta {
                sequence_number: i as u64 + 1,
                item_id: "m1".to_string(),
                output_index: 0,
                content_index: 0,
                delta: fragment.clone(),
            });
        }
        events.push(completed_event(fragments.len() as u64 + 1));

        let mut sink = CollectSink::default();
        let aggregate = block_on(
            ResponseAggregator::new()
                .run(stream::iter(events.into_iter().map(Ok::<_, DecodeError>)), &mut sink),
        )
        .unwrap();

        prop_assert_eq!(&aggregate.text, &text);
        let streamed: String = sink
            .deltas
            .iter()
            .filter(|d| d.kind == DeltaKind::Text)
            .filter_map(|d| d.text.as_deref())
            .collect();
        prop_assert_eq!(&streamed, &text);
    }

    /// The parsed arguments from the `.done` event agree with parsing the
    /// concatenation of the streamed fragments.
    #[test]
    fn function_arguments_done_agrees_with_fragments(
        keys in proptest::collection::vec("[a-z]{1,8}", 1..4),
        values in proptest::collection::vec(any::<i64>(), 4),
        cuts in proptest::collection::vec(any::<usize>(), 0..6),
    ) {
        let mut args = serde_json::Map::new();
        for (key, value) in keys.iter().zip(values.iter()) {
            args.insert(key.clone(), json!(value));
        }
        let raw = serde_json::Value::Object(args).to_string();
        let fragments = split_at_positions(&raw, &cuts);

        let mut events = vec![StreamEvent::OutputItemAdded {
            sequence_number: 0,
            output_index: 0,
            item: json!({"type": "function_call", "id": "fc1", "name": "t", "call_id": "c1"}),
        }];
        for (i, fragment) in fragments.iter().enumerate() {
            events.push(StreamEvent::FunctionCallArgumentsDelta {
                sequence_number: i as u64 + 1,
                item_id: "fc1".to_string(),
                output_index: 0,
                delta: fragment.clone(),
            });
        }
        events.push(StreamEvent::FunctionCallArgumentsDone {
            sequence_number: fragments.len() as u64 + 1,
            item_id: "fc1".to_string(),
            output_index: 0,
            arguments: raw.clone(),
        });
        events.push(completed_event(fragments.len() as u64 + 2));

        let mut sink = CollectSink::default();
        let aggregate = block_on(
            ResponseAggregator::new()
                .run(stream::iter(events.into_iter().map(Ok::<_, DecodeError>)), &mut sink),
        )
        .unwrap();

        let call = &aggregate.function_calls[0];
        let from_raw: serde_json::Value = serde_json::from_str(&raw).unwrap();
        prop_assert_eq!(&call.arguments, &from_raw);

        let streamed: String = sink
            .deltas
            .iter()
            .filter(|d| d.kind == DeltaKind::FunctionArguments)
            .filter_map(|d| d.text.as_deref())
            .collect();
        let from_fragments: serde_json::Value = serde_json::from_str(&streamed).unwrap();
        prop_assert_eq!(&call.arguments, &from_fragments);
    }

    /// Chunk boundaries never change what the frame decoder produces.
    #[test]
    fn decoder_is_chunking_invariant(
        fragment in "[a-z ]{0,20}",
        cuts in proptest::collection::vec(any::<usize>(), 0..5),
    ) {
        let payload = json!({
            "type": "response.output_text.delta",
            "sequence_number": 7,
            "item_id": "m1",
            "output_index": 0,
            "content_index": 0,
            "delta": fragment,
        })
        .to_string();
        let frame = format!("data: {payload}\n\n");

        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for chunk in split_at_positions(&frame, &cuts) {
            events.extend(decoder.push_chunk(chunk.as_bytes()).unwrap());
        }

        prop_assert_eq!(events.len(), 1);
        prop_assert_eq!(
            &events[0],
            &StreamEvent::OutputTextDelta {
                sequence_number: 7,
                item_id: "m1".to_string(),
                output_index: 0,
                content_index: 0,
                delta: fragment,
            }
        );
    }
}
