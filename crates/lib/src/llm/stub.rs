//! Offline stub provider: used when no API key is configured so the gateway
//! and CLI still run end to end. Never calls out and never requests tools.

use async_trait::async_trait;

use super::{ChatMessage, ChatProvider, ProviderError, ProviderResponse, ToolDefinition};

pub struct StubProvider;

#[async_trait]
impl ChatProvider for StubProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
        _model: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("");
        Ok(ProviderResponse {
            content: format!(
                "(stub) No provider is configured. You said: {}",
                last_user
            ),
            tool_calls: Vec::new(),
        })
    }

    fn default_model(&self) -> &str {
        "stub-model"
    }
}
