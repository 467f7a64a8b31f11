//! Tool implementations and registry
//!
//! Tools come in two wire styles: function tools receive structured JSON
//! arguments, custom tools receive one opaque string payload.

mod read_file;
mod shell;

pub use read_file::ReadFileTool;
pub use shell::ShellTool;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Payload handed to a tool invocation.
#[derive(Debug, Clone)]
pub enum ToolPayload {
    /// Parsed JSON arguments (function-style tools)
    Args(Value),
    /// Raw input string (custom-style tools)
    Raw(String),
}

/// Failure raised by a tool callable.
///
/// The turn loop does not catch these; they propagate out of the
/// invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Failed(String),
}

/// Trait for tools the agent can dispatch to
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, as the model addresses it
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// Full wire schema advertised in the request's tool list
    fn schema(&self) -> Value;

    /// Execute the tool, returning the output string appended to the
    /// conversation
    async fn invoke(&self, payload: ToolPayload) -> Result<String, ToolError>;
}

/// Collection of tools available to a conversation
///
/// Tools are stateless singletons; an optional allowlist narrows what a
/// given conversation exposes to the model.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    allowlist: Option<Vec<String>>,
}

impl ToolRegistry {
    /// Create the standard tool registry
    pub fn standard() -> Self {
        Self {
            tools: vec![Arc::new(ShellTool), Arc::new(ReadFileTool)],
            allowlist: None,
        }
    }

    /// Create a registry from an explicit tool set
    #[allow(dead_code)] // Constructor used by agent tests
    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools,
            allowlist: None,
        }
    }

    /// Restrict the registry to the named tools. `None` allows all.
    pub fn with_allowlist(mut self, allowlist: Option<Vec<String>>) -> Self {
        self.allowlist = allowlist;
        self
    }

    fn allowed(&self, name: &str) -> bool {
        match &self.allowlist {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        }
    }

    /// Wire schemas of every allowed tool, for the outbound request
    pub fn schemas(&self) -> Vec<Value> {
        self.tools
            .iter()
            .filter(|t| self.allowed(t.name()))
            .map(|t| t.schema())
            .collect()
    }

    /// Resolve an allowed tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        if !self.allowed(name) {
            return None;
        }
        self.tools.iter().find(|t| t.name() == name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_advertises_both_styles() {
        let registry = ToolRegistry::standard();
        let schemas = registry.schemas();
        let types: Vec<&str> = schemas
            .iter()
            .filter_map(|s| s.get("type").and_then(Value::as_str))
            .collect();

        assert!(types.contains(&"custom"), "missing custom tool schema");
        assert!(types.contains(&"function"), "missing function tool schema");
        assert!(registry.get("shell").is_some());
        assert!(registry.get("read_file").is_some());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn allowlist_filters_schemas_and_lookup() {
        let registry =
            ToolRegistry::standard().with_allowlist(Some(vec!["read_file".to_string()]));

        let names: Vec<String> = registry
            .schemas()
            .iter()
            .filter_map(|s| s.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        assert_eq!(names, vec!["read_file".to_string()]);
        assert!(registry.get("shell").is_none());
        assert!(registry.get("read_file").is_some());
    }
}
