//! File read tool - function-style, structured arguments

use super::{Tool, ToolError, ToolPayload};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

const MAX_FILE_BYTES: u64 = 256 * 1024;

#[derive(Debug, Deserialize)]
struct ReadFileInput {
    path: String,
}

/// Function-style tool returning a file's contents as UTF-8 text.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> String {
        "Read a UTF-8 text file from the local filesystem and return its \
         contents."
            .to_string()
    }

    fn schema(&self) -> Value {
        json!({
            "type": "function",
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path of the file to read"
                    }
                },
                "required": ["path"],
                "additionalProperties": false
            },
            "strict": true
        })
    }

    async fn invoke(&self, payload: ToolPayload) -> Result<String, ToolError> {
        let args = match payload {
            ToolPayload::Args(value) => value,
            ToolPayload::Raw(_) => {
                return Err(ToolError::InvalidInput(
                    "read_file expects structured arguments".into(),
                ))
            }
        };

        let input: ReadFileInput = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        let metadata = tokio::fs::metadata(&input.path)
            .await
            .map_err(|e| ToolError::Failed(format!("{}: {e}", input.path)))?;
        if metadata.len() > MAX_FILE_BYTES {
            return Err(ToolError::Failed(format!(
                "{} is {} bytes, larger than the {MAX_FILE_BYTES} byte limit",
                input.path,
                metadata.len()
            )));
        }

        tokio::fs::read_to_string(&input.path)
            .await
            .map_err(|e| ToolError::Failed(format!("{}: {e}", input.path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "line one").unwrap();

        let output = ReadFileTool
            .invoke(ToolPayload::Args(
                json!({"path": file.path().to_str().unwrap()}),
            ))
            .await
            .unwrap();
        assert_eq!(output, "line one\n");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let result = ReadFileTool
            .invoke(ToolPayload::Args(json!({"path": "/no/such/file"})))
            .await;
        assert!(matches!(result, Err(ToolError::Failed(_))));
    }

    #[tokio::test]
    async fn raw_payload_is_rejected() {
        let result = ReadFileTool
            .invoke(ToolPayload::Raw("/etc/hosts".to_string()))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn bad_arguments_are_invalid_input() {
        let result = ReadFileTool
            .invoke(ToolPayload::Args(json!({"file": "x"})))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
    }
}
