//! Response aggregator
//!
//! Consumes the decoded event sequence strictly in arrival order, maintains
//! per-item running state keyed by item id, forwards one normalized
//! [`Delta`] per qualifying event to a caller-supplied sink, and produces
//! the final [`AggregatedResponse`].

use super::decoder::DecodeError;
use super::events::{
    AggregatedResponse, CustomToolCall, Delta, DeltaKind, FunctionCall, StreamEvent,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Consumer-side sink for normalized deltas.
///
/// `emit` is awaited to completion before the next event is processed, so
/// a slow consumer throttles decode progress instead of piling up a queue.
#[async_trait]
pub trait DeltaSink: Send {
    async fn emit(&mut self, delta: Delta);
}

#[derive(Debug, Default)]
struct MessageState {
    // content_index -> fragments
    parts: BTreeMap<u64, Vec<String>>,
}

#[derive(Debug, Default)]
struct ReasoningState {
    // summary_index -> fragments
    summaries: BTreeMap<u64, Vec<String>>,
}

#[derive(Debug)]
struct FunctionCallState {
    name: String,
    call_id: String,
    chunks: Vec<String>,
}

#[derive(Debug)]
struct CustomToolCallState {
    name: String,
    call_id: String,
    chunks: Vec<String>,
}

/// Aggregates one turn's event stream.
///
/// The per-item accumulators are owned exclusively by this instance;
/// callers only ever observe the immutable [`Delta`] snapshots.
#[derive(Default)]
pub struct ResponseAggregator {
    aggregate: AggregatedResponse,
    messages: HashMap<String, MessageState>,
    reasoning: HashMap<String, ReasoningState>,
    function_calls: HashMap<String, FunctionCallState>,
    custom_calls: HashMap<String, CustomToolCallState>,
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drives the event stream to its terminal event (or clean end of
    /// stream) and returns the accumulated response.
    pub async fn run<S>(
        mut self,
        events: S,
        sink: &mut dyn DeltaSink,
    ) -> Result<AggregatedResponse, DecodeError>
    where
        S: Stream<Item = Result<StreamEvent, DecodeError>> + Send,
    {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            if self.handle_event(event?, sink).await {
                break;
            }
        }
        Ok(self.aggregate)
    }

    /// Applies one event. Returns true once the terminal event was seen.
    pub async fn handle_event(&mut self, event: StreamEvent, sink: &mut dyn DeltaSink) -> bool {
        match event {
            StreamEvent::Created { response, .. } => {
                self.aggregate.response_id = Some(response.id);
                self.aggregate.model = response.model;
                self.aggregate.status = Some(response.status.clone());
                sink.emit(status_delta(response.status)).await;
            }

            StreamEvent::InProgress { response, .. } => {
                self.aggregate.status = Some(response.status.clone());
                sink.emit(status_delta(response.status)).await;
            }

            StreamEvent::OutputItemAdded {
                output_index, item, ..
            } => {
                self.item_added(output_index, &item, sink).await;
            }

            StreamEvent::ContentPartAdded {
                item_id,
                content_index,
                ..
            } => {
                if let Some(state) = self.messages.get_mut(&item_id) {
                    state.parts.entry(content_index).or_default();
                }
            }

            StreamEvent::OutputTextDelta {
                item_id,
                output_index,
                content_index,
                delta,
                ..
            } => {
                if let Some(state) = self.messages.get_mut(&item_id) {
                    state
                        .parts
                        .entry(content_index)
                        .or_default()
                        .push(delta.clone());
                }
                self.aggregate.text.push_str(&delta);

                let mut out = Delta::new(DeltaKind::Text);
                out.output_index = Some(output_index);
                out.item_id = Some(item_id);
                out.content_index = Some(content_index);
                out.text = Some(delta);
                sink.emit(out).await;
            }

            StreamEvent::ReasoningSummaryTextDelta {
                item_id,
                output_index,
                summary_index,
                delta,
                ..
            } => {
                if let Some(state) = self.reasoning.get_mut(&item_id) {
                    state
                        .summaries
                        .entry(summary_index)
                        .or_default()
                        .push(delta.clone());
                }

                let mut out = Delta::new(DeltaKind::Reasoning);
                out.output_index = Some(output_index);
                out.item_id = Some(item_id);
                out.summary_index = Some(summary_index);
                out.text = Some(delta);
                sink.emit(out).await;
            }

            StreamEvent::ReasoningSummaryTextDone { text, .. } => {
                self.aggregate.reasoning_summaries.push(text);
            }

            StreamEvent::FunctionCallArgumentsDelta {
                item_id,
                output_index,
                delta,
                ..
            } => {
                self.function_arguments_delta(Some(item_id), Some(output_index), delta, sink)
                    .await;
            }

            StreamEvent::FunctionCallArgumentsDone {
                item_id,
                output_index,
                arguments,
                ..
            } => {
                self.function_arguments_done(Some(item_id), Some(output_index), arguments);
            }

            StreamEvent::CustomToolCallInputDelta {
                item_id,
                output_index,
                delta,
                ..
            } => {
                self.custom_input_delta(Some(item_id), Some(output_index), delta, sink)
                    .await;
            }

            StreamEvent::CustomToolCallInputDone {
                item_id,
                output_index,
                input,
                ..
            } => {
                self.custom_input_done(Some(item_id), Some(output_index), input);
            }

            StreamEvent::OutputItemDone {
                output_index, item, ..
            } => {
                let mut out = Delta::new(DeltaKind::ItemCompleted);
                out.output_index = Some(output_index);
                out.item_id = item
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                out.meta.insert("item".to_string(), item);
                sink.emit(out).await;
            }

            StreamEvent::Completed { response, .. } => {
                self.aggregate.response_id = Some(response.id.clone());
                self.aggregate.status = Some(response.status.clone());
                self.aggregate.model = response.model.clone();
                self.aggregate.usage = response.usage.clone();
                let status = response.status.clone();
                self.aggregate.snapshot = Some(response);
                sink.emit(status_delta(status)).await;
                return true;
            }

            // Done/part markers carry no state the aggregate needs.
            StreamEvent::OutputTextDone { .. }
            | StreamEvent::ContentPartDone { .. }
            | StreamEvent::ReasoningSummaryPartAdded { .. }
            | StreamEvent::ReasoningSummaryPartDone { .. } => {}

            StreamEvent::Unknown { event_type, raw } => {
                self.unknown_event(&event_type, raw, sink).await;
            }
        }

        false
    }

    async fn item_added(&mut self, output_index: u64, item: &Value, sink: &mut dyn DeltaSink) {
        let kind = item
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let item_id = item
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut out = Delta::new(DeltaKind::ItemStarted);
        out.output_index = Some(output_index);
        out.item_id = item_id.clone();
        out.meta
            .insert("type".to_string(), Value::String(kind.clone()));

        if let Some(id) = item_id {
            match kind.as_str() {
                "message" => {
                    self.messages.insert(id, MessageState::default());
                }
                "reasoning" => {
                    self.reasoning.insert(id, ReasoningState::default());
                }
                "function_call" => {
                    let name = item
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let call_id = item
                        .get("call_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    out.name = Some(name.clone());
                    out.call_id = Some(call_id.clone());
                    self.function_calls.insert(
                        id,
                        FunctionCallState {
                            name,
                            call_id,
                            chunks: Vec::new(),
                        },
                    );
                }
                "custom_tool_call" => {
                    let name = item
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let call_id = item
                        .get("call_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    out.name = Some(name.clone());
                    out.call_id = Some(call_id.clone());
                    self.custom_calls.insert(
                        id,
                        CustomToolCallState {
                            name,
                            call_id,
                            chunks: Vec::new(),
                        },
                    );
                }
                _ => {}
            }
        }

        sink.emit(out).await;
    }

    async fn function_arguments_delta(
        &mut self,
        item_id: Option<String>,
        output_index: Option<u64>,
        chunk: String,
        sink: &mut dyn DeltaSink,
    ) {
        if let Some(id) = &item_id {
            if let Some(state) = self.function_calls.get_mut(id) {
                state.chunks.push(chunk.clone());
            }
        }

        let mut out = Delta::new(DeltaKind::FunctionArguments);
        out.output_index = output_index;
        out.item_id = item_id;
        out.text = Some(chunk);
        sink.emit(out).await;
    }

    fn function_arguments_done(
        &mut self,
        item_id: Option<String>,
        output_index: Option<u64>,
        arguments: String,
    ) {
        let (name, call_id) = match item_id.as_ref().and_then(|id| self.function_calls.get(id)) {
            Some(state) => (Some(state.name.clone()), Some(state.call_id.clone())),
            None => (None, None),
        };

        // A raw string stands in when the arguments are not valid JSON;
        // the call record is still produced.
        let parsed = serde_json::from_str(&arguments)
            .unwrap_or_else(|_| Value::String(arguments.clone()));

        self.aggregate.function_calls.push(FunctionCall {
            item_id: item_id.unwrap_or_default(),
            output_index,
            name,
            call_id,
            arguments: parsed,
            arguments_raw: arguments,
        });
    }

    async fn custom_input_delta(
        &mut self,
        item_id: Option<String>,
        output_index: Option<u64>,
        chunk: String,
        sink: &mut dyn DeltaSink,
    ) {
        if let Some(id) = &item_id {
            if let Some(state) = self.custom_calls.get_mut(id) {
                state.chunks.push(chunk.clone());
            }
        }

        let mut out = Delta::new(DeltaKind::CustomInput);
        out.output_index = output_index;
        out.item_id = item_id;
        out.text = Some(chunk);
        sink.emit(out).await;
    }

    fn custom_input_done(
        &mut self,
        item_id: Option<String>,
        output_index: Option<u64>,
        input: String,
    ) {
        let (name, call_id) = match item_id.as_ref().and_then(|id| self.custom_calls.get(id)) {
            Some(state) => (Some(state.name.clone()), Some(state.call_id.clone())),
            None => (None, None),
        };

        self.aggregate.custom_tool_calls.push(CustomToolCall {
            item_id: item_id.unwrap_or_default(),
            output_index,
            name,
            call_id,
            input,
        });
    }

    /// Re-dispatches the fragment tags the typed schema may lag behind on;
    /// anything else is forwarded verbatim for observability.
    async fn unknown_event(&mut self, event_type: &str, raw: Value, sink: &mut dyn DeltaSink) {
        let item_id = raw
            .get("item_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let output_index = raw.get("output_index").and_then(Value::as_u64);

        match event_type {
            "response.function_call_arguments.delta" => {
                let chunk = raw
                    .get("delta")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.function_arguments_delta(item_id, output_index, chunk, sink)
                    .await;
            }
            "response.function_call_arguments.done" => {
                let arguments = raw
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.function_arguments_done(item_id, output_index, arguments);
            }
            "response.custom_tool_call_input.delta" => {
                let chunk = raw
                    .get("delta")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.custom_input_delta(item_id, output_index, chunk, sink)
                    .await;
            }
            "response.custom_tool_call_input.done" => {
                let input = raw
                    .get("input")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.custom_input_done(item_id, output_index, input);
            }
            _ => {
                let mut out = Delta::new(DeltaKind::Unknown);
                match raw {
                    Value::Object(map) => out.meta = map,
                    other => {
                        out.meta.insert("raw".to_string(), other);
                    }
                }
                sink.emit(out).await;
            }
        }
    }
}

fn status_delta(status: String) -> Delta {
    let mut delta = Delta::new(DeltaKind::ResponseStatus);
    delta.status = Some(status);
    delta
}

#[cfg(test)]
impl ResponseAggregator {
    /// Text accumulated so far for one message item, in content-part order.
    fn message_text(&self, item_id: &str) -> Option<String> {
        self.messages.get(item_id).map(|state| {
            state
                .parts
                .values()
                .flatten()
                .map(String::as_str)
                .collect::<String>()
        })
    }

    fn has_item_state(&self, item_id: &str) -> bool {
        self.messages.contains_key(item_id)
            || self.reasoning.contains_key(item_id)
            || self.function_calls.contains_key(item_id)
            || self.custom_calls.contains_key(item_id)
    }

    fn aggregate(&self) -> &AggregatedResponse {
        &self.aggregate
    }
}
