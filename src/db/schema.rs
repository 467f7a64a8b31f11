//! Database schema and types

use crate::llm::{ReasoningConfig, TextConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// SQL schema for initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    title TEXT,
    settings TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    idx INTEGER NOT NULL,
    role TEXT,
    payload TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, idx);
"#;

fn default_model() -> String {
    "gpt-5".to_string()
}

/// Per-conversation model settings, persisted as JSON in the
/// conversations table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub text: TextConfig,
    /// Tools this conversation may expose to the model; `None` allows all
    #[serde(default)]
    pub tool_allowlist: Option<Vec<String>>,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            reasoning: ReasoningConfig::default(),
            text: TextConfig::default(),
            tool_allowlist: None,
        }
    }
}

/// Conversation listing row
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
}

/// Full conversation record
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settings: ConversationSettings,
    pub messages: Vec<StoredMessage>,
}

/// One persisted conversation item
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub idx: i64,
    pub role: String,
    pub payload: Value,
}

/// Role label recorded for an item payload.
///
/// Items carry either a `role` (user/assistant messages) or a `type`
/// (call and call-output records).
pub fn item_role(payload: &Value) -> String {
    payload
        .get("role")
        .and_then(Value::as_str)
        .or_else(|| payload.get("type").and_then(Value::as_str))
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_defaults_match_wire_defaults() {
        let settings = ConversationSettings::default();
        assert_eq!(settings.model, "gpt-5");
        assert_eq!(settings.reasoning.effort, "medium");
        assert_eq!(settings.reasoning.summary, "auto");
        assert_eq!(settings.text.verbosity, "high");
        assert_eq!(settings.tool_allowlist, None);
    }

    #[test]
    fn partial_settings_json_fills_defaults() {
        let settings: ConversationSettings =
            serde_json::from_str(r#"{"model": "gpt-5-mini"}"#).unwrap();
        assert_eq!(settings.model, "gpt-5-mini");
        assert_eq!(settings.reasoning.effort, "medium");
    }

    #[test]
    fn item_role_prefers_role_then_type() {
        assert_eq!(item_role(&json!({"role": "user", "content": "x"})), "user");
        assert_eq!(
            item_role(&json!({"type": "function_call_output"})),
            "function_call_output"
        );
        assert_eq!(item_role(&json!({"something": "else"})), "unknown");
    }
}
