//! OpenAI-compatible chat client
//!
//! Works against OpenAI, OpenRouter, Ollama, LM Studio and other servers
//! speaking the `/chat/completions` wire format. Streaming responses are
//! parsed as SSE; tool-call fragments are accumulated by index and emitted
//! as one [`StreamChunk::ToolCalls`] when the response finishes.

use super::{
    ChatMessage, Completion, GroundingSource, MessageRole, ModelProvider, StreamChunk,
    TokenUsage, ToolCallRequest,
};
use crate::catalog::ToolSpec;
use crate::error::{Result, SwarmError};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client as HttpClient, StatusCode,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for an OpenAI-compatible endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "llama3.1".to_string(),
            max_tokens: Some(4096),
            temperature: None,
        }
    }
}

/// OpenAI-compatible [`ModelProvider`]
pub struct OpenAiClient {
    config: ProviderConfig,
    http_client: HttpClient,
}

impl OpenAiClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(300))
            .user_agent("swarmgate/0.3")
            .build()
            .map_err(|e| SwarmError::Internal {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(OpenAiClient {
            config,
            http_client,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.config.api_key {
            let value = format!("Bearer {}", key.trim());
            headers.insert(
                AUTHORIZATION,
                value.parse().map_err(|_| SwarmError::InvalidConfig {
                    message: "API key contains characters invalid in an HTTP header".to_string(),
                })?,
            );
        }
        Ok(headers)
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        stream: bool,
    ) -> WireRequest {
        WireRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            max_completion_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream,
            tools: if tools.is_empty() {
                None
            } else {
                Some(
                    tools
                        .iter()
                        .map(|t| WireTool {
                            type_: "function".to_string(),
                            function: WireFunction {
                                name: t.name.clone(),
                                description: Some(t.description.clone()),
                                parameters: Some(t.parameters.clone()),
                            },
                        })
                        .collect(),
                )
            },
        }
    }

    fn status_error(status: StatusCode, body: &str) -> SwarmError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SwarmError::Unauthorized {
                message: "provider rejected the API key".to_string(),
            },
            StatusCode::TOO_MANY_REQUESTS => SwarmError::ProviderRateLimited { retry_after: None },
            _ => {
                let message = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.pointer("/error/message")
                            .and_then(|m| m.as_str())
                            .map(|m| m.to_string())
                    })
                    .unwrap_or_else(|| body.chars().take(200).collect());
                SwarmError::ProviderError {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiClient {
    async fn stream_turn(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let url = self.completions_url();
        let headers = self.build_headers()?;
        let body = self.request_body(messages, tools, true);
        let http_client = self.http_client.clone();

        let stream = async_stream::try_stream! {
            let response = http_client
                .post(&url)
                .headers(headers)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                Err(Self::status_error(status, &text))?;
                // `?` inside try_stream! yields the error without diverging,
                // so the branch has to end the generator itself
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            let mut partial_calls: Vec<PartialToolCall> = Vec::new();

            while let Some(chunk_res) = bytes.next().await {
                let chunk = chunk_res.map_err(|e| SwarmError::StreamDisconnected {
                    reason: e.to_string(),
                })?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].trim_end().to_string();
                    buffer = buffer[newline_pos + 1..].to_string();

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        if !partial_calls.is_empty() {
                            yield StreamChunk::ToolCalls(drain_tool_calls(&mut partial_calls));
                        }
                        yield StreamChunk::Done;
                        return;
                    }

                    let Ok(parsed) = serde_json::from_str::<WireStreamResponse>(data) else {
                        continue;
                    };

                    if let Some(choice) = parsed.choices.first() {
                        if let Some(text) = &choice.delta.content {
                            if !text.is_empty() {
                                yield StreamChunk::Text(text.clone());
                            }
                        }
                        if let Some(fragments) = &choice.delta.tool_calls {
                            for fragment in fragments {
                                accumulate_fragment(&mut partial_calls, fragment);
                            }
                        }
                        if choice.finish_reason.as_deref() == Some("tool_calls")
                            && !partial_calls.is_empty()
                        {
                            yield StreamChunk::ToolCalls(drain_tool_calls(&mut partial_calls));
                        }
                    }
                    if let Some(usage) = parsed.usage {
                        yield StreamChunk::Usage(TokenUsage {
                            prompt_tokens: usage.prompt_tokens,
                            completion_tokens: usage.completion_tokens,
                            total_tokens: usage.total_tokens,
                        });
                    }
                    if let Some(sources) = parsed.grounding {
                        yield StreamChunk::Grounding(sources);
                    }
                }
            }

            if !partial_calls.is_empty() {
                yield StreamChunk::ToolCalls(drain_tool_calls(&mut partial_calls));
            }
            yield StreamChunk::Done;
        };

        Ok(stream.boxed())
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let url = self.completions_url();
        let headers = self.build_headers()?;
        let body = self.request_body(messages, &[], false);

        let response = self
            .http_client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Self::status_error(status, &text));
        }

        let parsed: WireResponse = serde_json::from_str(&text).map_err(|e| {
            SwarmError::ProviderError {
                status: status.as_u16(),
                message: format!("unparseable response body: {}", e),
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(Completion {
            text: content,
            usage: parsed
                .usage
                .map(|u| TokenUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                })
                .unwrap_or_default(),
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

fn accumulate_fragment(calls: &mut Vec<PartialToolCall>, fragment: &WireToolCallFragment) {
    let index = fragment.index.unwrap_or(0);
    while calls.len() <= index {
        calls.push(PartialToolCall::default());
    }
    let slot = &mut calls[index];
    if let Some(id) = &fragment.id {
        slot.id = id.clone();
    }
    if let Some(function) = &fragment.function {
        if let Some(name) = &function.name {
            slot.name.push_str(name);
        }
        if let Some(args) = &function.arguments {
            slot.arguments.push_str(args);
        }
    }
}

fn drain_tool_calls(calls: &mut Vec<PartialToolCall>) -> Vec<ToolCallRequest> {
    std::mem::take(calls)
        .into_iter()
        .filter(|c| !c.name.is_empty())
        .enumerate()
        .map(|(i, c)| ToolCallRequest {
            id: if c.id.is_empty() {
                format!("call-{}", i)
            } else {
                c.id
            },
            name: c.name,
            arguments: if c.arguments.is_empty() {
                "{}".to_string()
            } else {
                c.arguments
            },
        })
        .collect()
}

// Wire types for the /chat/completions format

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        let role = match msg.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        WireMessage {
            role: role.to_string(),
            content: msg.content.clone(),
            name: msg.name.clone(),
            tool_call_id: msg.tool_call_id.clone(),
            tool_calls: msg.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: c.id.clone(),
                        type_: "function".to_string(),
                        function: WireToolCallFunction {
                            name: c.name.clone(),
                            arguments: c.arguments.clone(),
                        },
                    })
                    .collect()
            }),
        }
    }
}

#[derive(Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    type_: String,
    function: WireToolCallFunction,
}

#[derive(Serialize)]
struct WireToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    type_: String,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[derive(Deserialize)]
struct WireStreamResponse {
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    /// Non-standard field some proxies attach for web-grounded answers
    #[serde(default)]
    grounding: Option<Vec<GroundingSource>>,
}

#[derive(Deserialize)]
struct WireStreamChoice {
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallFragment>>,
}

#[derive(Deserialize)]
struct WireToolCallFragment {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionFragment>,
}

#[derive(Deserialize)]
struct WireFunctionFragment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
