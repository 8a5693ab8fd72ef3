//! Integration tests for the agent loop: a scripted provider drives full
//! turns through the hub, and assertions check replies, provider call
//! counts, and on-disk session/memory state. No network, no real model.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lib::agent::AgentLoop;
use lib::context::ContextBuilder;
use lib::hub::{Hub, InboundMessage, OutboundMessage};
use lib::llm::{ChatMessage, ChatProvider, ProviderError, ProviderResponse, ToolCall, ToolDefinition};
use lib::memory::MemoryStore;
use lib::session::SessionStore;
use lib::tools::{Tool, ToolContext, ToolRegistry};

/// Provider that replays a fixed script of responses and records every call.
struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, String>>>,
    calls: AtomicUsize,
    transcripts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<ProviderResponse, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn transcript(&self, call: usize) -> Vec<ChatMessage> {
        self.transcripts.lock().unwrap()[call].clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
        _model: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transcripts.lock().unwrap().push(messages.to_vec());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(resp)) => Ok(resp),
            Some(Err(e)) => Err(ProviderError::Api(e)),
            None => Ok(ProviderResponse {
                content: "(script exhausted)".to_string(),
                tool_calls: Vec::new(),
            }),
        }
    }

    fn default_model(&self) -> &str {
        "scripted"
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "echo the arguments back"
    }
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }
    async fn execute(&self, _ctx: &ToolContext, args: &serde_json::Value) -> Result<String, String> {
        Ok(format!("echo: {}", args))
    }
}

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "fail"
    }
    fn description(&self) -> &str {
        "always fails"
    }
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }
    async fn execute(&self, _ctx: &ToolContext, _args: &serde_json::Value) -> Result<String, String> {
        Err("disk on fire".to_string())
    }
}

fn temp_workspace() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("femtobot-agent-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create workspace dir");
    dir
}

fn text(s: &str) -> Result<ProviderResponse, String> {
    Ok(ProviderResponse {
        content: s.to_string(),
        tool_calls: Vec::new(),
    })
}

fn tool_calls(calls: Vec<(&str, &str, serde_json::Value)>) -> Result<ProviderResponse, String> {
    Ok(ProviderResponse {
        content: String::new(),
        tool_calls: calls
            .into_iter()
            .map(|(id, name, arguments)| ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            })
            .collect(),
    })
}

fn build_agent(
    responses: Vec<Result<ProviderResponse, String>>,
    max_iterations: usize,
    hub: &Hub,
    workspace: &PathBuf,
) -> (AgentLoop, Arc<ScriptedProvider>) {
    let provider = Arc::new(ScriptedProvider::new(responses));
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(EchoTool));
    tools.register(Arc::new(FailingTool));
    let agent = AgentLoop::new(
        provider.clone(),
        Arc::new(tools),
        SessionStore::new(workspace),
        ContextBuilder::new(workspace),
        Arc::new(MemoryStore::new(workspace, 50)),
        hub.outbound_sender(),
        workspace.clone(),
        None,
        max_iterations,
    );
    (agent, provider)
}

struct Harness {
    workspace: PathBuf,
    inbound: mpsc::Sender<InboundMessage>,
    chat_rx: mpsc::Receiver<OutboundMessage>,
    heartbeat_rx: mpsc::Receiver<OutboundMessage>,
    provider: Arc<ScriptedProvider>,
    cancel: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Wire a hub, router, and agent loop against a scripted provider.
fn spawn_agent(responses: Vec<Result<ProviderResponse, String>>, max_iterations: usize) -> Harness {
    let workspace = temp_workspace();
    let hub = Hub::new(16);
    let chat_rx = hub.subscribe("chat");
    let heartbeat_rx = hub.subscribe("heartbeat");
    let (agent, provider) = build_agent(responses, max_iterations, &hub, &workspace);

    let cancel = CancellationToken::new();
    let inbound_rx = hub.take_inbound().expect("inbound receiver");
    hub.start_router(cancel.clone()).expect("start router");
    let inbound = hub.inbound_sender();
    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        agent.run(inbound_rx, run_cancel).await;
    });

    Harness {
        workspace,
        inbound,
        chat_rx,
        heartbeat_rx,
        provider,
        cancel,
    }
}

async fn recv_reply(rx: &mut mpsc::Receiver<OutboundMessage>) -> OutboundMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for reply")
        .expect("outbound channel closed")
}

#[tokio::test]
async fn remember_request_is_stored_without_a_model_call() {
    let mut h = spawn_agent(Vec::new(), 5);
    h.inbound
        .send(InboundMessage::new("chat", "u1", "42", "Remember to buy milk"))
        .await
        .unwrap();

    let reply = recv_reply(&mut h.chat_rx).await;
    assert_eq!(reply.content, "OK, I've remembered that.");
    assert_eq!(reply.channel, "chat");
    assert_eq!(reply.chat_id, "42");
    assert_eq!(h.provider.calls(), 0);

    let today = MemoryStore::new(&h.workspace, 50).read_today().await;
    assert!(today.contains("buy milk"), "today file: {:?}", today);
    assert!(!today.contains("Remember to"), "prefix must be stripped: {:?}", today);

    // The turn is persisted like any interactive exchange.
    let path = SessionStore::new(&h.workspace)
        .session_path("chat:42")
        .expect("persistent store has a path");
    let raw = std::fs::read_to_string(path).expect("session file written");
    assert!(raw.contains("Remember to buy milk"));
    assert!(raw.contains("OK, I've remembered that."));
}

#[tokio::test]
async fn turn_is_bounded_by_max_iterations() {
    let script = (0..10)
        .map(|i| tool_calls(vec![("c1", "echo", serde_json::json!({ "n": i }))]))
        .collect();
    let mut h = spawn_agent(script, 3);
    h.inbound
        .send(InboundMessage::new("chat", "u1", "1", "loop forever"))
        .await
        .unwrap();

    let reply = recv_reply(&mut h.chat_rx).await;
    assert_eq!(h.provider.calls(), 3);
    // The bound was hit with no final text, so the last tool result stands in.
    assert!(reply.content.starts_with("echo:"), "reply: {:?}", reply.content);
}

#[tokio::test]
async fn system_triggers_leave_no_session_state() {
    let mut h = spawn_agent(vec![text("All quiet.")], 5);
    h.inbound
        .send(InboundMessage::new(
            "heartbeat",
            "heartbeat",
            "heartbeat",
            "Anything on the checklist?",
        ))
        .await
        .unwrap();

    let reply = recv_reply(&mut h.heartbeat_rx).await;
    assert_eq!(reply.content, "All quiet.");
    assert_eq!(h.provider.calls(), 1);
    assert!(
        !h.workspace.join("sessions").exists(),
        "system turns must not create session files"
    );

    // The first transcript starts fresh, with no carried history.
    let transcript = h.provider.transcript(0);
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, "system");
    assert_eq!(transcript[1].role, "user");
}

#[tokio::test]
async fn tool_errors_are_contained_in_the_transcript() {
    let script = vec![
        tool_calls(vec![("c1", "fail", serde_json::json!({}))]),
        text("recovered"),
    ];
    let mut h = spawn_agent(script, 5);
    h.inbound
        .send(InboundMessage::new("chat", "u1", "7", "try something risky"))
        .await
        .unwrap();

    let reply = recv_reply(&mut h.chat_rx).await;
    assert_eq!(reply.content, "recovered");
    assert_eq!(h.provider.calls(), 2);

    let second = h.provider.transcript(1);
    let tool_msg = second.last().expect("transcript has messages");
    assert_eq!(tool_msg.role, "tool");
    assert!(
        tool_msg.content.starts_with("(tool error) "),
        "tool message: {:?}",
        tool_msg.content
    );
    assert!(tool_msg.content.contains("disk on fire"));
}

#[tokio::test]
async fn unknown_tool_is_an_error_result_not_a_crash() {
    let script = vec![
        tool_calls(vec![("c1", "no_such_tool", serde_json::json!({}))]),
        text("sorted it out"),
    ];
    let mut h = spawn_agent(script, 5);
    h.inbound
        .send(InboundMessage::new("chat", "u1", "7", "use a made-up tool"))
        .await
        .unwrap();

    let reply = recv_reply(&mut h.chat_rx).await;
    assert_eq!(reply.content, "sorted it out");
    let second = h.provider.transcript(1);
    let tool_msg = second.last().expect("transcript has messages");
    assert!(tool_msg.content.contains("unknown tool: no_such_tool"));
}

#[tokio::test]
async fn multi_step_tool_turn_runs_to_completion() {
    let script = vec![
        tool_calls(vec![("c1", "echo", serde_json::json!({"step": "a"}))]),
        tool_calls(vec![("c2", "echo", serde_json::json!({"step": "b"}))]),
        text("final answer"),
    ];
    let mut h = spawn_agent(script, 10);
    h.inbound
        .send(InboundMessage::new("chat", "u1", "9", "do two things"))
        .await
        .unwrap();

    let reply = recv_reply(&mut h.chat_rx).await;
    assert_eq!(reply.content, "final answer");
    assert_eq!(h.provider.calls(), 3);

    // Both tool results made it into the final transcript, in order.
    let third = h.provider.transcript(2);
    let tool_results: Vec<&str> = third
        .iter()
        .filter(|m| m.role == "tool")
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(tool_results.len(), 2);
    assert!(tool_results[0].contains("\"a\""));
    assert!(tool_results[1].contains("\"b\""));
}

#[tokio::test]
async fn provider_failure_becomes_an_apology() {
    let mut h = spawn_agent(vec![Err("upstream 500".to_string())], 5);
    h.inbound
        .send(InboundMessage::new("chat", "u1", "3", "hello"))
        .await
        .unwrap();

    let reply = recv_reply(&mut h.chat_rx).await;
    assert_eq!(
        reply.content,
        "Sorry, I encountered an error while processing your request."
    );
    assert_eq!(h.provider.calls(), 1);
}

#[tokio::test]
async fn sessions_accumulate_history_across_turns() {
    let mut h = spawn_agent(vec![text("first reply"), text("second reply")], 5);
    h.inbound
        .send(InboundMessage::new("chat", "u1", "5", "turn one"))
        .await
        .unwrap();
    assert_eq!(recv_reply(&mut h.chat_rx).await.content, "first reply");

    h.inbound
        .send(InboundMessage::new("chat", "u1", "5", "turn two"))
        .await
        .unwrap();
    assert_eq!(recv_reply(&mut h.chat_rx).await.content, "second reply");

    // The second call sees the first exchange as history.
    let second = h.provider.transcript(1);
    let roles: Vec<&str> = second.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    assert_eq!(second[1].content, "turn one");
    assert_eq!(second[2].content, "first reply");
    assert_eq!(second[3].content, "turn two");
}

#[tokio::test]
async fn conversations_on_different_chats_stay_isolated() {
    let mut h = spawn_agent(vec![text("for alice"), text("for bob")], 5);
    h.inbound
        .send(InboundMessage::new("chat", "alice", "100", "hi from alice"))
        .await
        .unwrap();
    assert_eq!(recv_reply(&mut h.chat_rx).await.content, "for alice");

    h.inbound
        .send(InboundMessage::new("chat", "bob", "200", "hi from bob"))
        .await
        .unwrap();
    assert_eq!(recv_reply(&mut h.chat_rx).await.content, "for bob");

    // Bob's transcript carries none of Alice's history.
    let second = h.provider.transcript(1);
    assert!(second.iter().all(|m| !m.content.contains("hi from alice")));
    let store = SessionStore::new(&h.workspace);
    assert!(store.session_path("chat:100").expect("path").exists());
    assert!(store.session_path("chat:200").expect("path").exists());
}

#[tokio::test]
async fn process_direct_propagates_provider_errors() {
    let workspace = temp_workspace();
    let hub = Hub::new(4);
    let (agent, provider) = build_agent(vec![Err("boom".to_string())], 5, &hub, &workspace);

    let err = agent
        .process_direct("hello", Duration::from_secs(5))
        .await
        .expect_err("provider error must propagate");
    assert!(err.to_string().contains("boom"));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn process_direct_returns_final_content() {
    let workspace = temp_workspace();
    let hub = Hub::new(4);
    let script = vec![
        tool_calls(vec![("c1", "echo", serde_json::json!({"x": 1}))]),
        text("done"),
    ];
    let (agent, provider) = build_agent(script, 5, &hub, &workspace);

    let reply = agent
        .process_direct("run the tool", Duration::from_secs(5))
        .await
        .expect("direct turn succeeds");
    assert_eq!(reply, "done");
    assert_eq!(provider.calls(), 2);
}
