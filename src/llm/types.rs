//! Request types for the model endpoint

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One streaming turn request
#[derive(Debug, Clone, Serialize)]
pub struct RequestBody {
    /// Full conversation item list, oldest first
    pub input: Vec<Value>,
    pub model: String,
    pub stream: bool,
    pub reasoning: ReasoningConfig,
    pub text: TextConfig,
    /// Wire schemas of the tools offered for this turn
    pub tools: Vec<Value>,
}

/// Reasoning configuration forwarded verbatim to the endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub effort: String,
    pub summary: String,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            effort: "medium".to_string(),
            summary: "auto".to_string(),
        }
    }
}

/// Output text configuration forwarded verbatim to the endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextConfig {
    pub verbosity: String,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            verbosity: "high".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_serializes_wire_shape() {
        let body = RequestBody {
            input: vec![json!({"role": "user", "content": "hi"})],
            model: "gpt-5".to_string(),
            stream: true,
            reasoning: ReasoningConfig::default(),
            text: TextConfig::default(),
            tools: vec![],
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["stream"], json!(true));
        assert_eq!(value["model"], json!("gpt-5"));
        assert_eq!(value["reasoning"]["effort"], json!("medium"));
        assert_eq!(value["reasoning"]["summary"], json!("auto"));
        assert_eq!(value["text"]["verbosity"], json!("high"));
        assert_eq!(value["input"][0]["role"], json!("user"));
    }
}
