//! Conversation turn loop
//!
//! Owns the growing conversation item list for one session. Each
//! invocation appends the user prompt, then alternates model turns and
//! tool dispatch until a turn produces no further tool calls.

use crate::db::ConversationSettings;
use crate::llm::{LlmError, RequestBody, ResponsesTransport};
use crate::protocol::{event_stream, DecodeError, DeltaSink, ResponseAggregator};
use crate::tools::{ToolError, ToolPayload, ToolRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// Failure of one agent invocation.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The model requested a tool the registry does not know.
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("tool {name} failed: {source}")]
    Tool {
        name: String,
        #[source]
        source: ToolError,
    },
}

/// Result of one completed invocation.
#[derive(Debug)]
pub struct TurnSummary {
    pub total_tokens: Option<u64>,
    /// Every item appended during the invocation, the user item included.
    pub new_items: Vec<Value>,
}

/// Turn loop bound to one conversation's item list.
///
/// The item list is append-only and owned exclusively by this agent;
/// callers must not run two invocations for the same conversation
/// concurrently.
pub struct Agent {
    transport: Arc<dyn ResponsesTransport>,
    registry: Arc<ToolRegistry>,
    settings: ConversationSettings,
    items: Vec<Value>,
}

impl Agent {
    pub fn new(
        transport: Arc<dyn ResponsesTransport>,
        registry: Arc<ToolRegistry>,
        settings: ConversationSettings,
        items: Vec<Value>,
    ) -> Self {
        Self {
            transport,
            registry,
            settings,
            items,
        }
    }

    /// Conversation items accumulated so far, oldest first.
    #[allow(dead_code)] // Inspected by tests
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Runs turns until one yields neither function nor custom tool calls.
    ///
    /// HTTP and decode failures abort the invocation; retries are the
    /// caller's concern. Tool failures propagate uncaught.
    pub async fn invoke(
        &mut self,
        prompt: &str,
        sink: &mut dyn DeltaSink,
    ) -> Result<TurnSummary, AgentError> {
        let start_len = self.items.len();
        self.items.push(json!({"role": "user", "content": prompt}));

        loop {
            let body = RequestBody {
                input: self.items.clone(),
                model: self.settings.model.clone(),
                stream: true,
                reasoning: self.settings.reasoning.clone(),
                text: self.settings.text.clone(),
                tools: self.registry.schemas(),
            };

            tracing::info!(items = self.items.len(), model = %body.model, "Starting model turn");
            let bytes = self.transport.stream_turn(&body).await?;
            let aggregated = ResponseAggregator::new()
                .run(event_stream(bytes), sink)
                .await?;
            tracing::debug!(
                status = aggregated.status.as_deref().unwrap_or("<none>"),
                function_calls = aggregated.function_calls.len(),
                custom_tool_calls = aggregated.custom_tool_calls.len(),
                "Turn stream finished"
            );

            if let Some(snapshot) = &aggregated.snapshot {
                for item in &snapshot.output {
                    self.items.push(item.clone());
                }
            }

            if !aggregated.function_calls.is_empty() {
                for call in &aggregated.function_calls {
                    let name = call.name.clone().unwrap_or_default();
                    let tool = self
                        .registry
                        .get(&name)
                        .ok_or_else(|| AgentError::UnknownTool { name: name.clone() })?;
                    let output = tool
                        .invoke(ToolPayload::Args(call.arguments.clone()))
                        .await
                        .map_err(|source| AgentError::Tool {
                            name: name.clone(),
                            source,
                        })?;
                    self.items.push(json!({
                        "type": "function_call_output",
                        "call_id": call.call_id,
                        "output": output,
                    }));
                }
            } else if !aggregated.custom_tool_calls.is_empty() {
                for call in &aggregated.custom_tool_calls {
                    let name = call.name.clone().unwrap_or_default();
                    let tool = self
                        .registry
                        .get(&name)
                        .ok_or_else(|| AgentError::UnknownTool { name: name.clone() })?;
                    let output = tool
                        .invoke(ToolPayload::Raw(call.input.clone()))
                        .await
                        .map_err(|source| AgentError::Tool {
                            name: name.clone(),
                            source,
                        })?;
                    self.items.push(json!({
                        "type": "custom_tool_call_output",
                        "call_id": call.call_id,
                        "output": output,
                    }));
                }
            } else {
                let total_tokens = aggregated.usage.as_ref().and_then(|u| u.total_tokens);
                return Ok(TurnSummary {
                    total_tokens,
                    new_items: self.items[start_len..].to_vec(),
                });
            }
        }
    }
}
