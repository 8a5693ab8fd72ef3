//! Shell tool: run a command via `sh -c` with a timeout, cwd in the workspace.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{Tool, ToolContext};

const DEFAULT_TIMEOUT_S: u64 = 60;

pub struct ShellTool {
    max_timeout_s: u64,
}

impl ShellTool {
    pub fn new(max_timeout_s: u64) -> Self {
        Self { max_timeout_s }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return its output"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 60)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> Result<String, String> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'command' argument".to_string())?;
        let timeout_s = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_S)
            .min(self.max_timeout_s);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&ctx.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = tokio::time::timeout(Duration::from_secs(timeout_s), cmd.output())
            .await
            .map_err(|_| format!("command timed out after {}s", timeout_s))?
            .map_err(|e| format!("failed to execute command: {}", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut result = stdout.trim_end().to_string();
        if !stderr.trim().is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(stderr.trim_end());
        }
        if !output.status.success() {
            return Err(format!("exit {}: {}", output.status, result));
        }
        if result.is_empty() {
            result = "(no output)".to_string();
        }
        Ok(result)
    }
}
