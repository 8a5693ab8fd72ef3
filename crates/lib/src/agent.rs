//! Agent loop: the single consumer of the hub's inbound queue. Each inbound
//! message becomes one outbound reply via a bounded provider/tool iteration.
//!
//! Per-turn flow: remember-shortcut check, session classification (system
//! channels are stateless), context assembly, then the turn state machine
//! below. All per-turn failures are contained here; the session is only
//! persisted after the reply is finalized, so an aborted or failed turn never
//! leaves a partial history behind.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::ContextBuilder;
use crate::hub::{InboundMessage, OutboundMessage, OutboundSender};
use crate::llm::{ChatMessage, ChatProvider, ProviderError, ProviderResponse};
use crate::memory::{LlmRanker, MemoryStore};
use crate::session::{Session, SessionStore};
use crate::tools::{ToolContext, ToolRegistry};

static REMEMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^remember(?:\s+to)?\s+(.+)$").expect("remember regex"));

const REMEMBER_ACK: &str = "OK, I've remembered that.";
const APOLOGY: &str = "Sorry, I encountered an error while processing your request.";
const NO_RESPONSE: &str = "I've completed processing but have no response to give.";

/// Number of recent daily-note days loaded as ranking candidates each turn.
const RECENT_DAYS: i64 = 3;

/// System-trigger channels (heartbeat, cron) are processed statelessly: no
/// session history is loaded and nothing is written back, so periodic
/// triggers cannot grow the stored history without bound.
pub fn is_system_channel(channel: &str) -> bool {
    matches!(channel, "heartbeat" | "cron")
}

/// Turn state machine: provider call, tool execution, or a terminal state.
enum TurnState {
    AwaitingProvider,
    ExecutingTools(ProviderResponse),
    Done(String),
    Failed,
}

pub struct AgentLoop {
    provider: Arc<dyn ChatProvider>,
    tools: Arc<ToolRegistry>,
    sessions: SessionStore,
    context: ContextBuilder,
    memory: Arc<MemoryStore>,
    ranker: LlmRanker,
    outbound: OutboundSender,
    workspace: PathBuf,
    model: String,
    max_iterations: usize,
    /// Ranked notes injected into each turn's context.
    top_memories: usize,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        tools: Arc<ToolRegistry>,
        sessions: SessionStore,
        context: ContextBuilder,
        memory: Arc<MemoryStore>,
        outbound: OutboundSender,
        workspace: PathBuf,
        model: Option<String>,
        max_iterations: usize,
    ) -> Self {
        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.default_model().to_string());
        let ranker = LlmRanker::new(provider.clone(), model.clone());
        Self {
            provider,
            tools,
            sessions,
            context,
            memory,
            ranker,
            outbound,
            workspace,
            model,
            max_iterations: max_iterations.max(1),
            top_memories: 5,
        }
    }

    /// Consume inbound messages until the queue closes or `cancel` fires.
    /// Messages are processed strictly serially, in arrival order.
    pub async fn run(&self, mut inbound: mpsc::Receiver<InboundMessage>, cancel: CancellationToken) {
        log::info!("agent loop started (model {})", self.model);
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("agent loop received shutdown signal");
                    return;
                }
                msg = inbound.recv() => match msg {
                    Some(m) => m,
                    None => {
                        log::info!("inbound queue closed, stopping agent loop");
                        return;
                    }
                },
            };
            log::info!("processing message from {}:{}", msg.channel, msg.sender_id);
            self.process_message(&msg, &cancel).await;
        }
    }

    async fn process_message(&self, msg: &InboundMessage, cancel: &CancellationToken) {
        // Explicit "remember ..." request: store the note and acknowledge
        // without touching the model at all.
        let trimmed = msg.content.trim();
        if let Some(caps) = REMEMBER_RE.captures(trimmed) {
            let note = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if let Err(e) = self.memory.append_today(note).await {
                log::warn!("appending to memory failed: {}", e);
            }
            self.persist_turn(msg, REMEMBER_ACK).await;
            self.emit(msg, REMEMBER_ACK.to_string());
            return;
        }

        let session = if is_system_channel(&msg.channel) {
            Session::ephemeral(msg.conversation_key())
        } else {
            self.sessions.get_or_create(&msg.conversation_key()).await
        };

        let memory_context = self.memory.memory_context().await;
        let recent = self.memory.recent(RECENT_DAYS).await;
        let memories = self
            .ranker
            .rank(&msg.content, recent, self.top_memories)
            .await;
        let messages = self.context.build_messages(
            &session.messages,
            &msg.content,
            &msg.channel,
            &msg.chat_id,
            &memory_context,
            &memories,
        );

        let tool_ctx = ToolContext {
            channel: msg.channel.clone(),
            chat_id: msg.chat_id.clone(),
            workspace: self.workspace.clone(),
        };
        let Some(reply) = self.run_iterations(messages, &tool_ctx, cancel).await else {
            log::info!("turn aborted by shutdown, session not persisted");
            return;
        };

        self.persist_turn(msg, &reply).await;
        self.emit(msg, reply);
    }

    /// Drive the turn state machine: at most `max_iterations` provider calls,
    /// each followed by sequential execution of any requested tool calls.
    /// Returns `None` when cancelled mid-turn.
    async fn run_iterations(
        &self,
        mut messages: Vec<ChatMessage>,
        tool_ctx: &ToolContext,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let tool_defs = self.tools.definitions();
        let mut iterations = 0;
        let mut last_tool_result: Option<String> = None;
        let mut state = TurnState::AwaitingProvider;

        let content = loop {
            state = match state {
                TurnState::AwaitingProvider => {
                    if iterations >= self.max_iterations {
                        log::debug!("max tool iterations reached");
                        break String::new();
                    }
                    iterations += 1;
                    let result = tokio::select! {
                        _ = cancel.cancelled() => return None,
                        r = self.provider.chat(&messages, &tool_defs, &self.model) => r,
                    };
                    match result {
                        Ok(resp) if resp.has_tool_calls() => TurnState::ExecutingTools(resp),
                        Ok(resp) => TurnState::Done(resp.content),
                        Err(e) => {
                            log::warn!("provider error: {}", e);
                            TurnState::Failed
                        }
                    }
                }
                TurnState::ExecutingTools(resp) => {
                    messages.push(ChatMessage::assistant(
                        resp.content.clone(),
                        resp.tool_calls.clone(),
                    ));
                    // Tools run sequentially, in the order the model asked.
                    for call in &resp.tool_calls {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        let result = match self
                            .tools
                            .execute(tool_ctx, &call.name, &call.arguments)
                            .await
                        {
                            Ok(out) => out,
                            Err(e) => {
                                log::warn!("tool {} failed: {}", call.name, e);
                                format!("(tool error) {}", e)
                            }
                        };
                        last_tool_result = Some(result.clone());
                        messages.push(ChatMessage::tool(call.id.clone(), result));
                    }
                    TurnState::AwaitingProvider
                }
                TurnState::Done(content) => break content,
                TurnState::Failed => break APOLOGY.to_string(),
            };
        };

        if content.is_empty() {
            return Some(last_tool_result.unwrap_or_else(|| NO_RESPONSE.to_string()));
        }
        Some(content)
    }

    /// One-shot query outside the hub: ephemeral session, same bounded
    /// iteration, but provider errors propagate to the caller instead of
    /// being rewritten into an apology.
    pub async fn process_direct(
        &self,
        content: &str,
        timeout: std::time::Duration,
    ) -> Result<String, ProviderError> {
        let memory_context = self.memory.memory_context().await;
        let recent = self.memory.recent(RECENT_DAYS).await;
        let memories = self.ranker.rank(content, recent, self.top_memories).await;
        let mut messages =
            self.context
                .build_messages(&[], content, "cli", "direct", &memory_context, &memories);
        let tool_ctx = ToolContext {
            channel: "cli".to_string(),
            chat_id: "direct".to_string(),
            workspace: self.workspace.clone(),
        };
        let tool_defs = self.tools.definitions();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_tool_result: Option<String> = None;

        for _ in 0..self.max_iterations {
            let resp = tokio::time::timeout_at(
                deadline,
                self.provider.chat(&messages, &tool_defs, &self.model),
            )
            .await
            .map_err(|_| ProviderError::Api(format!("timed out after {:?}", timeout)))??;
            if !resp.has_tool_calls() {
                if !resp.content.is_empty() {
                    return Ok(resp.content);
                }
                return Ok(last_tool_result.unwrap_or(resp.content));
            }
            messages.push(ChatMessage::assistant(
                resp.content.clone(),
                resp.tool_calls.clone(),
            ));
            for call in &resp.tool_calls {
                let result = match self
                    .tools
                    .execute(&tool_ctx, &call.name, &call.arguments)
                    .await
                {
                    Ok(out) => out,
                    Err(e) => format!("(tool error) {}", e),
                };
                last_tool_result = Some(result.clone());
                messages.push(ChatMessage::tool(call.id.clone(), result));
            }
        }
        Ok("Max iterations reached without final response".to_string())
    }

    /// Persist a turn for interactive channels; system triggers are stateless.
    async fn persist_turn(&self, msg: &InboundMessage, reply: &str) {
        if is_system_channel(&msg.channel) {
            return;
        }
        let mut session = self.sessions.get_or_create(&msg.conversation_key()).await;
        session.add_message("user", &msg.content);
        session.add_message("assistant", reply);
        if let Err(e) = self.sessions.save(&session).await {
            log::warn!("saving session {} failed: {}", session.key, e);
        }
    }

    /// Non-blocking emit; a full outbound queue drops the reply (logged).
    fn emit(&self, msg: &InboundMessage, content: String) {
        self.outbound.try_send(OutboundMessage {
            channel: msg.channel.clone(),
            chat_id: msg.chat_id.clone(),
            content,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_pattern_captures_the_note() {
        let caps = REMEMBER_RE.captures("Remember to buy milk").unwrap();
        assert_eq!(caps.get(1).unwrap().as_str(), "buy milk");
        let caps = REMEMBER_RE.captures("remember the passport is in the drawer").unwrap();
        assert_eq!(caps.get(1).unwrap().as_str(), "the passport is in the drawer");
        assert!(REMEMBER_RE.captures("do you remember me").is_none());
    }

    #[test]
    fn system_channels_are_heartbeat_and_cron() {
        assert!(is_system_channel("heartbeat"));
        assert!(is_system_channel("cron"));
        assert!(!is_system_channel("telegram"));
        assert!(!is_system_channel("cli"));
    }
}
