//! Wire event model and normalized output types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Typed view of the endpoint's full response object.
///
/// Only the fields the aggregator and turn loop consume are modeled;
/// everything else the endpoint sends is retained in `extra` so the
/// snapshot survives schema drift round-trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub output: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Token usage counters reported by the endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// One decoded stream event, tagged by the wire `type` discriminant.
///
/// Unrecognized tags (and recognized tags whose payload fails typed
/// decoding) are routed to `Unknown` rather than failing the stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "response.created")]
    Created {
        sequence_number: u64,
        response: ResponseSnapshot,
    },
    #[serde(rename = "response.in_progress")]
    InProgress {
        sequence_number: u64,
        response: ResponseSnapshot,
    },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        sequence_number: u64,
        output_index: u64,
        item: Value,
    },
    #[serde(rename = "response.reasoning_summary_part.added")]
    ReasoningSummaryPartAdded {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        summary_index: u64,
    },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        summary_index: u64,
        delta: String,
    },
    #[serde(rename = "response.reasoning_summary_text.done")]
    ReasoningSummaryTextDone {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        summary_index: u64,
        text: String,
    },
    #[serde(rename = "response.reasoning_summary_part.done")]
    ReasoningSummaryPartDone {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        summary_index: u64,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        sequence_number: u64,
        output_index: u64,
        item: Value,
    },
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        content_index: u64,
    },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        content_index: u64,
        delta: String,
    },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        content_index: u64,
        text: String,
    },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        content_index: u64,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        arguments: String,
    },
    #[serde(rename = "response.custom_tool_call_input.delta")]
    CustomToolCallInputDelta {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        delta: String,
    },
    #[serde(rename = "response.custom_tool_call_input.done")]
    CustomToolCallInputDone {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        input: String,
    },
    #[serde(rename = "response.completed")]
    Completed {
        sequence_number: u64,
        response: ResponseSnapshot,
    },
    /// Catch-all for wire additions the typed schema does not know yet.
    #[serde(skip)]
    Unknown { event_type: String, raw: Value },
}

impl StreamEvent {
    /// Sequence number carried by the event, if the wire provided one.
    #[allow(dead_code)] // Ordering assertions in tests
    pub fn sequence_number(&self) -> Option<u64> {
        match self {
            Self::Created {
                sequence_number, ..
            }
            | Self::InProgress {
                sequence_number, ..
            }
            | Self::OutputItemAdded {
                sequence_number, ..
            }
            | Self::ReasoningSummaryPartAdded {
                sequence_number, ..
            }
            | Self::ReasoningSummaryTextDelta {
                sequence_number, ..
            }
            | Self::ReasoningSummaryTextDone {
                sequence_number, ..
            }
            | Self::ReasoningSummaryPartDone {
                sequence_number, ..
            }
            | Self::OutputItemDone {
                sequence_number, ..
            }
            | Self::ContentPartAdded {
                sequence_number, ..
            }
            | Self::OutputTextDelta {
                sequence_number, ..
            }
            | Self::OutputTextDone {
                sequence_number, ..
            }
            | Self::ContentPartDone {
                sequence_number, ..
            }
            | Self::FunctionCallArgumentsDelta {
                sequence_number, ..
            }
            | Self::FunctionCallArgumentsDone {
                sequence_number, ..
            }
            | Self::CustomToolCallInputDelta {
                sequence_number, ..
            }
            | Self::CustomToolCallInputDone {
                sequence_number, ..
            }
            | Self::Completed {
                sequence_number, ..
            } => Some(*sequence_number),
            Self::Unknown { raw, .. } => raw.get("sequence_number").and_then(Value::as_u64),
        }
    }
}

/// Kind tag of a normalized delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeltaKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "reasoning")]
    Reasoning,
    #[serde(rename = "function.arguments")]
    FunctionArguments,
    #[serde(rename = "custom.input")]
    CustomInput,
    #[serde(rename = "item.started")]
    ItemStarted,
    #[serde(rename = "item.completed")]
    ItemCompleted,
    #[serde(rename = "response.status")]
    ResponseStatus,
    #[serde(rename = "unknown")]
    Unknown,
}

impl DeltaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Reasoning => "reasoning",
            Self::FunctionArguments => "function.arguments",
            Self::CustomInput => "custom.input",
            Self::ItemStarted => "item.started",
            Self::ItemCompleted => "item.completed",
            Self::ResponseStatus => "response.status",
            Self::Unknown => "unknown",
        }
    }
}

/// Normalized notification of one incremental change.
///
/// Exactly one delta is produced per qualifying wire event, in event order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delta {
    pub kind: DeltaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Delta {
    pub fn new(kind: DeltaKind) -> Self {
        Self {
            kind,
            output_index: None,
            item_id: None,
            content_index: None,
            summary_index: None,
            text: None,
            name: None,
            call_id: None,
            status: None,
            meta: Map::new(),
        }
    }
}

/// Completed function call reconstructed from the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    pub item_id: String,
    pub output_index: Option<u64>,
    pub name: Option<String>,
    pub call_id: Option<String>,
    /// Parsed argument object, or the raw string when parsing failed.
    pub arguments: Value,
    pub arguments_raw: String,
}

/// Completed custom tool call reconstructed from the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomToolCall {
    pub item_id: String,
    pub output_index: Option<u64>,
    pub name: Option<String>,
    pub call_id: Option<String>,
    pub input: String,
}

/// Terminal snapshot of one turn's stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedResponse {
    pub response_id: Option<String>,
    pub status: Option<String>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
    pub text: String,
    pub reasoning_summaries: Vec<String>,
    pub function_calls: Vec<FunctionCall>,
    pub custom_tool_calls: Vec<CustomToolCall>,
    pub snapshot: Option<ResponseSnapshot>,
}
