//! Model provider abstraction
//!
//! Chat message types shared across the orchestrator, plus the
//! [`ModelProvider`] trait the turn loop drives. The only shipped provider is
//! the OpenAI-compatible client in [`client`]; the trait exists so tests can
//! substitute a scripted provider.

pub mod client;

pub use client::{OpenAiClient, ProviderConfig};

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: MessageRole::System,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: MessageRole::User,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: MessageRole::Assistant,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Assistant message carrying tool-call requests.
    pub fn assistant_tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        ChatMessage {
            role: MessageRole::Assistant,
            content: String::new(),
            name: None,
            tool_call_id: None,
            tool_calls: Some(calls),
        }
    }

    /// Tool result message answering a specific call id.
    pub fn tool_result(call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: MessageRole::Tool,
            content: content.into(),
            name: Some(name.into()),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
        }
    }
}

/// A model-requested tool invocation. `arguments` is the raw JSON string as
/// the provider sent it; parsing is deferred to the coordinator so a
/// malformed payload fails one call, not the whole stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn parsed_args(&self) -> serde_json::Value {
        serde_json::from_str(&self.arguments)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()))
    }
}

/// Token counts for one model call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A web source the provider grounded its answer on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Units of a streamed model response
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// Incremental visible text
    Text(String),
    /// Fully accumulated tool-call requests, emitted once per response
    ToolCalls(Vec<ToolCallRequest>),
    /// Token usage, typically the final data event
    Usage(TokenUsage),
    /// Grounding sources attached to the response
    Grounding(Vec<GroundingSource>),
    /// End of stream
    Done,
}

/// A non-streaming completion's outcome
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Streaming chat backend
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stream one assistant turn for the given history and tool surface.
    async fn stream_turn(
        &self,
        messages: &[ChatMessage],
        tools: &[crate::catalog::ToolSpec],
    ) -> Result<BoxStream<'static, Result<StreamChunk>>>;

    /// One-shot completion without tools; used for synthesis verdicts.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion>;

    fn model(&self) -> &str;
}

/// Behavioral profile selecting a system prompt and tool subset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub system_prompt: String,
    /// None means the full catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    /// Hard cap on model calls per turn
    #[serde(default = "default_max_model_calls")]
    pub max_model_calls: usize,
}

fn default_max_model_calls() -> usize {
    8
}

impl AgentProfile {
    pub fn standard() -> Self {
        AgentProfile {
            name: "standard".to_string(),
            system_prompt: "You are a capable assistant with access to tools. \
                Wrap private reasoning in <thought> tags. You may end a reply \
                with a <suggestions> block holding a JSON array of follow-ups."
                .to_string(),
            allowed_tools: None,
            max_model_calls: default_max_model_calls(),
        }
    }

    /// Restricted profile handed to delegated sub-agents.
    pub fn delegate() -> Self {
        AgentProfile {
            name: "delegate".to_string(),
            system_prompt: "You are a focused sub-agent. Complete the single \
                task you are given and reply with the result, nothing else."
                .to_string(),
            allowed_tools: Some(vec![
                "read_file".to_string(),
                "list_files".to_string(),
                "fetch_url".to_string(),
                "search_web".to_string(),
                "recall_memory".to_string(),
            ]),
            max_model_calls: 4,
        }
    }
}
