//! Shell tool - executes a command line handed over as raw text

use super::{Tool, ToolError, ToolPayload};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_CAPTURE: usize = 64 * 1024; // per stream

/// Custom-style tool running its input via `sh -c`.
///
/// The result is a JSON object with `exit_code`, `stdout` and `stderr`, so
/// the model can inspect failures rather than just seeing opaque text.
pub struct ShellTool;

impl ShellTool {
    async fn execute(&self, command: &str) -> Result<String, ToolError> {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out command must not outlive its invocation.
            .kill_on_drop(true);

        let output = tokio::time::timeout(COMMAND_TIMEOUT, cmd.output())
            .await
            .map_err(|_| {
                ToolError::Failed(format!("command timed out after {COMMAND_TIMEOUT:?}"))
            })?
            .map_err(|e| ToolError::Failed(format!("failed to spawn process: {e}")))?;

        Ok(json!({
            "exit_code": output.status.code().unwrap_or(-1),
            "stdout": truncate(&String::from_utf8_lossy(&output.stdout)),
            "stderr": truncate(&String::from_utf8_lossy(&output.stderr)),
        })
        .to_string())
    }
}

fn truncate(output: &str) -> String {
    if output.len() <= MAX_CAPTURE {
        return output.to_string();
    }
    let mut end = MAX_CAPTURE;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[output truncated at {MAX_CAPTURE} bytes]", &output[..end])
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> String {
        "Execute a shell command via sh -c. Returns a JSON object with \
         exit_code, stdout and stderr. State (working directory, variables) \
         does not persist between calls."
            .to_string()
    }

    fn schema(&self) -> Value {
        json!({
            "type": "custom",
            "name": self.name(),
            "description": self.description(),
        })
    }

    async fn invoke(&self, payload: ToolPayload) -> Result<String, ToolError> {
        match payload {
            ToolPayload::Raw(command) => {
                if command.trim().is_empty() {
                    return Err(ToolError::InvalidInput("command cannot be empty".into()));
                }
                self.execute(&command).await
            }
            ToolPayload::Args(_) => Err(ToolError::InvalidInput(
                "shell expects a raw command string".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_command_and_reports_exit_code() {
        let output = ShellTool
            .invoke(ToolPayload::Raw("echo hello".to_string()))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["exit_code"], 0);
        assert!(parsed["stdout"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn failing_command_is_reported_not_raised() {
        let output = ShellTool
            .invoke(ToolPayload::Raw("exit 3".to_string()))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["exit_code"], 3);
    }

    #[tokio::test]
    async fn structured_args_are_rejected() {
        let result = ShellTool
            .invoke(ToolPayload::Args(json!({"command": "echo"})))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
    }

    #[test]
    fn truncation_appends_marker() {
        let long = "x".repeat(MAX_CAPTURE + 10);
        let truncated = truncate(&long);
        assert!(truncated.contains("truncated"));
        assert!(truncated.len() < long.len());
    }
}
