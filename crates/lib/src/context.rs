//! Context builder: assembles the ordered prompt for one turn.
//!
//! Pure beyond the bootstrap text captured at construction: identical inputs
//! produce an identical message list, so turns are testable byte for byte.

use std::path::Path;

use crate::llm::ChatMessage;
use crate::memory::MemoryItem;
use crate::session::SessionMessage;

const DEFAULT_IDENTITY: &str = "You are femtobot, a helpful personal assistant. \
Be concise, accurate, and friendly.";

pub struct ContextBuilder {
    /// Bootstrap instructions (SOUL.md + AGENTS.md), read once at startup.
    bootstrap: String,
}

impl ContextBuilder {
    /// Read workspace bootstrap files. Missing files fall back to a built-in
    /// identity so a bare workspace still works.
    pub fn new(workspace: &Path) -> Self {
        let mut bootstrap = String::new();
        for name in ["SOUL.md", "AGENTS.md"] {
            if let Ok(content) = std::fs::read_to_string(workspace.join(name)) {
                if !content.trim().is_empty() {
                    if !bootstrap.is_empty() {
                        bootstrap.push_str("\n\n");
                    }
                    bootstrap.push_str(content.trim());
                }
            }
        }
        if bootstrap.is_empty() {
            bootstrap = DEFAULT_IDENTITY.to_string();
        }
        Self { bootstrap }
    }

    /// Assemble the prompt: system message (bootstrap + memory context +
    /// ranked notes + conversation identity), then the session history in
    /// original order, then the new user message.
    pub fn build_messages(
        &self,
        history: &[SessionMessage],
        content: &str,
        channel: &str,
        chat_id: &str,
        memory_context: &str,
        memories: &[MemoryItem],
    ) -> Vec<ChatMessage> {
        let mut system = self.bootstrap.clone();
        if !memory_context.trim().is_empty() {
            system.push_str("\n\n");
            system.push_str(memory_context.trim());
        }
        if !memories.is_empty() {
            system.push_str("\n\n## Possibly relevant notes\n");
            for item in memories {
                system.push_str(&format!("- [{}] {}\n", item.kind, item.text));
            }
        }
        system.push_str(&format!(
            "\n\nCurrent conversation: channel={} chat={}",
            channel, chat_id
        ));

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        for m in history {
            messages.push(ChatMessage {
                role: m.role.clone(),
                content: m.content.clone(),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        messages.push(ChatMessage::user(content));
        messages
    }
}
