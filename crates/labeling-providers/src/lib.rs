//! Client for the LLM backing the agent nodes, treated as a remote
//! completions oracle rather than something this crate trains or
//! fine-tunes. A single Azure OpenAI-compatible chat-completions
//! deployment, configured from `labeling_core::Config`'s
//! `llm_endpoint`/`llm_api_key`/`llm_api_version`/`llm_deployment`.
//!
//! The request/response shapes and SSE parsing below are carried over
//! unchanged from the OpenAI-compatible chat/completions wire format the
//! rest of the retrieved corpus already speaks to — only the provider
//! fan-out (many providers, pick one at call time) is gone, replaced by
//! one fixed deployment.

use std::pin::Pin;
use std::str;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use labeling_core::Config;
use labeling_types::{ModelInfo, ProviderInfo, ToolCall, ToolSchema};

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded PNG attached as an image content part, when the
    /// caller wants the model to see a rendered plot.
    pub image_base64: Option<String>,
    /// Set on tool-result messages being replayed back to the model.
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            image_base64: None,
            tool_call_id: None,
        }
    }

    pub fn with_image(role: impl Into<String>, content: impl Into<String>, image_base64: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            image_base64: Some(image_base64.into()),
            tool_call_id: None,
        }
    }

    /// A text-only copy, for the C11 image-attachment retry.
    pub fn without_image(&self) -> Self {
        Self {
            role: self.role.clone(),
            content: self.content.clone(),
            image_base64: None,
            tool_call_id: self.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StreamChunk {
    TextDelta(String),
    ReasoningDelta(String),
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, args_delta: String },
    ToolCallEnd { id: String },
    Done {
        finish_reason: String,
        usage: Option<TokenUsage>,
    },
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A fully materialized (non-streamed) completion: text plus any tool
/// calls the model asked to make.
#[derive(Debug, Clone, Default)]
pub struct CompletionResult {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Spec §7 `LlmBadRequest`: the deployment rejected the request, most
    /// commonly an image attachment it doesn't support. The runner (C11)
    /// retries once with `ChatMessage::without_image`.
    #[error("provider rejected the request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn info(&self) -> ProviderInfo;

    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSchema>>,
    ) -> Result<CompletionResult, ProviderError>;

    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSchema>>,
        cancel: CancellationToken,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>, ProviderError>;
}

/// Thin registry wrapping the single configured deployment. Kept as a
/// registry (rather than a bare provider handle) so callers that ask for
/// "the default provider" don't need a special case once there's only one.
#[derive(Clone)]
pub struct ProviderRegistry {
    provider: std::sync::Arc<dyn Provider>,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            provider: std::sync::Arc::new(AzureOpenAiProvider::new(config)),
        }
    }

    /// Wraps an already-constructed provider, bypassing `from_config`'s
    /// Azure-specific wiring. Used by the runner's test harness to script
    /// canned completions without a network dependency.
    pub fn new(provider: std::sync::Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    pub fn default_provider(&self) -> std::sync::Arc<dyn Provider> {
        self.provider.clone()
    }

    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSchema>>,
    ) -> Result<CompletionResult, ProviderError> {
        self.provider.complete(messages, tools).await
    }
}

pub struct AzureOpenAiProvider {
    endpoint: String,
    api_key: String,
    api_version: String,
    deployment: String,
    client: Client,
}

impl AzureOpenAiProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: config.llm_endpoint.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            api_version: config.llm_api_version.clone(),
            deployment: config.llm_deployment.clone(),
            client: Client::new(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }

    fn wire_messages(&self, messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| {
                if let Some(image) = &m.image_base64 {
                    json!({
                        "role": m.role,
                        "content": [
                            {"type": "text", "text": m.content},
                            {"type": "image_url", "image_url": {"url": format!("data:image/png;base64,{image}")}},
                        ],
                    })
                } else {
                    json!({"role": m.role, "content": m.content})
                }
            })
            .collect()
    }

    fn wire_tools(tools: &Option<Vec<ToolSchema>>) -> Vec<serde_json::Value> {
        tools
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect()
    }
}

#[async_trait]
impl Provider for AzureOpenAiProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "azure".to_string(),
            name: "Azure OpenAI".to_string(),
            models: vec![ModelInfo {
                id: self.deployment.clone(),
                provider_id: "azure".to_string(),
                display_name: self.deployment.clone(),
                context_window: 128_000,
            }],
        }
    }

    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSchema>>,
    ) -> Result<CompletionResult, ProviderError> {
        let mut body = json!({
            "messages": self.wire_messages(&messages),
        });
        let wire_tools = Self::wire_tools(&tools);
        if !wire_tools.is_empty() {
            body["tools"] = serde_json::Value::Array(wire_tools);
            body["tool_choice"] = json!("auto");
        }

        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Other(e.into()))?;

        let status = response.status();
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(e.into()))?;

        if status.as_u16() == 400 {
            let detail = extract_error(&value).unwrap_or_else(|| "bad request".to_string());
            return Err(ProviderError::BadRequest(detail));
        }
        if !status.is_success() {
            let detail =
                extract_error(&value).unwrap_or_else(|| format!("request failed with status {status}"));
            return Err(ProviderError::Other(anyhow::anyhow!(detail)));
        }

        let text = extract_text(&value).unwrap_or_default();
        let tool_calls = extract_tool_calls(&value);
        let usage = extract_usage(&value);

        Ok(CompletionResult {
            text,
            tool_calls,
            usage,
        })
    }

    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSchema>>,
        cancel: CancellationToken,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>, ProviderError>
    {
        let mut body = json!({
            "messages": self.wire_messages(&messages),
            "stream": true,
        });
        let wire_tools = Self::wire_tools(&tools);
        if !wire_tools.is_empty() {
            body["tools"] = serde_json::Value::Array(wire_tools);
            body["tool_choice"] = json!("auto");
        }

        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Other(e.into()))?;

        let status = response.status();
        if status.as_u16() == 400 {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::BadRequest(text));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Other(anyhow::anyhow!(
                "stream request failed with status {status}: {text}"
            )));
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                if cancel.is_cancelled() {
                    yield StreamChunk::Done { finish_reason: "cancelled".to_string(), usage: None };
                    break;
                }

                let chunk = chunk.map_err(|e| ProviderError::Other(e.into()))?;
                buffer.push_str(str::from_utf8(&chunk).unwrap_or_default());

                while let Some(pos) = buffer.find("\n\n") {
                    let frame = buffer[..pos].to_string();
                    buffer = buffer[pos + 2..].to_string();
                    for line in frame.lines() {
                        let Some(payload) = line.strip_prefix("data: ") else { continue };
                        let payload = payload.trim();
                        if payload == "[DONE]" {
                            yield StreamChunk::Done { finish_reason: "stop".to_string(), usage: None };
                            continue;
                        }
                        let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else { continue };

                        if let Some(choice) = value.get("choices").and_then(|v| v.get(0)) {
                            if let Some(delta) = choice.get("delta") {
                                if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
                                    if !text.is_empty() {
                                        yield StreamChunk::TextDelta(text.to_string());
                                    }
                                }
                            }
                            if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
                                if !reason.is_empty() {
                                    yield StreamChunk::Done {
                                        finish_reason: reason.to_string(),
                                        usage: extract_usage(&value),
                                    };
                                }
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn extract_text(value: &serde_json::Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

fn extract_tool_calls(value: &serde_json::Value) -> Vec<ToolCall> {
    let Some(calls) = value
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("tool_calls"))
        .and_then(|v| v.as_array())
    else {
        return Vec::new();
    };

    calls
        .iter()
        .filter_map(|call| {
            let id = call.get("id")?.as_str()?.to_string();
            let function = call.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let arguments_str = function.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}");
            let arguments = serde_json::from_str(arguments_str).unwrap_or(serde_json::Value::Null);
            Some(ToolCall { id, name, arguments })
        })
        .collect()
}

fn extract_usage(value: &serde_json::Value) -> Option<TokenUsage> {
    let usage = value.get("usage")?;
    let prompt_tokens = usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
    let completion_tokens = usage.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
    let total_tokens = usage
        .get("total_tokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(prompt_tokens.saturating_add(completion_tokens));
    Some(TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens,
    })
}

fn extract_error(value: &serde_json::Value) -> Option<String> {
    value
        .get("error")
        .and_then(|v| v.get("message"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_usage_falling_back_to_sum() {
        let value = json!({"usage": {"prompt_tokens": 10, "completion_tokens": 5}});
        let usage = extract_usage(&value).unwrap();
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn extracts_tool_calls_with_parsed_arguments() {
        let value = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "plot_all", "arguments": "{\"y_zoomed\":true}"}
                    }]
                }
            }]
        });
        let calls = extract_tool_calls(&value);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "plot_all");
        assert_eq!(calls[0].arguments["y_zoomed"], true);
    }

    #[test]
    fn without_image_strips_attachment_but_keeps_text() {
        let msg = ChatMessage::with_image("user", "look at this", "base64data");
        let stripped = msg.without_image();
        assert!(stripped.image_base64.is_none());
        assert_eq!(stripped.content, "look at this");
    }
}
