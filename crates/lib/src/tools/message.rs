//! Message tool: send a message to the current conversation mid-turn, so the
//! model can post progress updates before its final reply.

use async_trait::async_trait;

use super::{Tool, ToolContext};
use crate::hub::{OutboundMessage, OutboundSender};

pub struct MessageTool {
    outbound: OutboundSender,
}

impl MessageTool {
    pub fn new(outbound: OutboundSender) -> Self {
        Self { outbound }
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user in the current conversation immediately"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The message text to send"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> Result<String, String> {
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'content' argument".to_string())?;
        // Delivery is best-effort like any other outbound reply.
        self.outbound.try_send(OutboundMessage {
            channel: ctx.channel.clone(),
            chat_id: ctx.chat_id.clone(),
            content: content.to_string(),
        });
        Ok("message sent".to_string())
    }
}
