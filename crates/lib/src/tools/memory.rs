//! Memory tool: lets the model persist notes (append to today's note or
//! overwrite the long-term note).

use async_trait::async_trait;
use std::sync::Arc;

use super::{Tool, ToolContext};
use crate::memory::MemoryStore;

pub struct MemoryTool {
    store: Arc<MemoryStore>,
}

impl MemoryTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Save a note: append to today's notes, or overwrite long-term memory"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "target": {
                    "type": "string",
                    "enum": ["today", "long"],
                    "description": "today = append a note, long = overwrite long-term memory"
                },
                "content": {
                    "type": "string",
                    "description": "The note content"
                }
            },
            "required": ["target", "content"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, args: &serde_json::Value) -> Result<String, String> {
        let target = args
            .get("target")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'target' argument".to_string())?;
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'content' argument".to_string())?;
        match target {
            "today" => {
                self.store.append_today(content).await?;
                Ok("noted for today".to_string())
            }
            "long" => {
                self.store.write_long_term(content).await?;
                Ok("long-term memory updated".to_string())
            }
            other => Err(format!("unknown target: {}", other)),
        }
    }
}
