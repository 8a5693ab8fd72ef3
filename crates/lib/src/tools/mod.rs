//! Tool registry: named, schema-described capabilities the model may invoke.
//!
//! Tools return `Result<String, String>`; the agent loop renders errors as
//! `"(tool error) ..."` text fed back into the transcript, never as a crash.

mod cron;
mod fs;
mod memory;
mod message;
mod shell;
mod web;

pub use cron::CronTool;
pub use fs::FsTool;
pub use memory::MemoryTool;
pub use message::MessageTool;
pub use shell::ShellTool;
pub use web::WebTool;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::llm::ToolDefinition;

/// Per-turn context handed to every tool execution: where the current message
/// came from and where workspace-relative operations are rooted.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub channel: String,
    pub chat_id: String,
    pub workspace: PathBuf,
}

/// A callable capability. `parameters` is exposed verbatim to the model as a
/// JSON schema.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> serde_json::Value;
    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> Result<String, String>;
}

/// Registry of tools, constructed once at startup and passed into the agent
/// loop (no process-wide singleton).
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            log::warn!("tools: replacing existing registration for {}", name);
        } else {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Schemas for the provider tool list, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Dispatch by name. An unknown name is an execution error, not a crash;
    /// empty argument payloads still reach the tool, which validates them.
    pub async fn execute(
        &self,
        ctx: &ToolContext,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<String, String> {
        let tool = self
            .get(name)
            .ok_or_else(|| format!("unknown tool: {}", name))?;
        tool.execute(ctx, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the text argument"
        }
        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            _ctx: &ToolContext,
            args: &serde_json::Value,
        ) -> Result<String, String> {
            args.get("text")
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| "missing text argument".to_string())
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            channel: "test".to_string(),
            chat_id: "1".to_string(),
            workspace: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn dispatch_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let out = reg
            .execute(&ctx(), "echo", &serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(out, "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_not_a_panic() {
        let reg = ToolRegistry::new();
        let err = reg
            .execute(&ctx(), "nope", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.contains("unknown tool"));
    }

    #[tokio::test]
    async fn empty_arguments_reach_the_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let err = reg
            .execute(&ctx(), "echo", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.contains("missing text"));
    }

    #[test]
    fn definitions_preserve_registration_order() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let defs = reg.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }
}
