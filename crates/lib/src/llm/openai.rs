//! OpenAI-compatible chat completions client (OpenRouter by default).
//! Non-streaming; tool calls are parsed from the first choice.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatProvider, ProviderError, ProviderResponse, ToolCall, ToolDefinition};

const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Per-request sampling settings, taken from `agents.defaults`.
#[derive(Debug, Clone, Copy)]
pub struct SamplingSettings {
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.7,
        }
    }
}

/// Client for any OpenAI-compatible /chat/completions endpoint.
#[derive(Clone)]
pub struct OpenAiProvider {
    api_key: String,
    api_base: String,
    default_model: String,
    sampling: SamplingSettings,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// `api_base` falls back to OpenRouter; `timeout_s` bounds each request.
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<String>,
        timeout_s: u64,
        sampling: SamplingSettings,
    ) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_s.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            api_key: api_key.into(),
            api_base,
            default_model: DEFAULT_MODEL.to_string(),
            sampling,
            client,
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        model: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = ChatRequest {
            model: model.to_string(),
            messages: messages.iter().map(WireMessage::from).collect(),
            max_tokens: self.sampling.max_tokens,
            temperature: self.sampling.temperature,
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.iter().map(WireTool::from).collect())
            },
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{} {}", status, body)));
        }
        let data: ChatResponse = res.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Api("no choices in response".to_string()))?;
        let content = choice.message.content.unwrap_or_default();
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: parse_arguments(&tc.function.arguments),
            })
            .collect();
        Ok(ProviderResponse { content, tool_calls })
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

/// Arguments arrive as a JSON-encoded string; some models send a bare object
/// or nothing at all. Always hand the tool an object so it can validate.
fn parse_arguments(raw: &serde_json::Value) -> serde_json::Value {
    match raw {
        serde_json::Value::String(s) if !s.trim().is_empty() => {
            serde_json::from_str(s).unwrap_or_else(|_| serde_json::json!({ "raw": s }))
        }
        serde_json::Value::Object(_) => raw.clone(),
        _ => serde_json::json!({}),
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(m: &ChatMessage) -> Self {
        Self {
            role: m.role.clone(),
            content: m.content.clone(),
            tool_calls: m.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: c.id.clone(),
                        typ: "function".to_string(),
                        function: WireFunctionCall {
                            name: c.name.clone(),
                            arguments: serde_json::Value::String(c.arguments.to_string()),
                        },
                    })
                    .collect()
            }),
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default)]
    typ: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    typ: String,
    function: WireFunctionDef,
}

#[derive(Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(d: &ToolDefinition) -> Self {
        Self {
            typ: "function".to_string(),
            function: WireFunctionDef {
                name: d.name.clone(),
                description: d.description.clone(),
                parameters: d.parameters.clone(),
            },
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_parsed_from_encoded_string() {
        let v = parse_arguments(&serde_json::json!("{\"path\": \"notes.md\"}"));
        assert_eq!(v["path"], "notes.md");
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        assert_eq!(parse_arguments(&serde_json::Value::Null), serde_json::json!({}));
        assert_eq!(
            parse_arguments(&serde_json::json!("")),
            serde_json::json!({})
        );
    }

    #[test]
    fn malformed_arguments_kept_as_raw() {
        let v = parse_arguments(&serde_json::json!("not json"));
        assert_eq!(v["raw"], "not json");
    }

    #[test]
    fn request_body_carries_sampling_settings() {
        let body = ChatRequest {
            model: "m".to_string(),
            messages: Vec::new(),
            max_tokens: 4096,
            temperature: 0.2,
            tools: None,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["max_tokens"], 4096);
        assert_eq!(v["temperature"], 0.2);
    }
}
