//! Scripted model provider for tests

use crate::catalog::ToolSpec;
use crate::error::Result;
use crate::llm::{ChatMessage, Completion, ModelProvider, StreamChunk, TokenUsage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Replays canned responses in order. An exhausted script streams a bare
/// `Done`; an exhausted completion queue answers `proceed`.
pub struct ScriptedProvider {
    streams: Mutex<VecDeque<Vec<StreamChunk>>>,
    completions: Mutex<VecDeque<String>>,
}

impl ScriptedProvider {
    pub fn new(streams: Vec<Vec<StreamChunk>>) -> Self {
        ScriptedProvider {
            streams: Mutex::new(streams.into()),
            completions: Mutex::new(VecDeque::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_completions(self, completions: Vec<String>) -> Self {
        *self.completions.lock() = completions.into();
        self
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn stream_turn(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let chunks = self
            .streams
            .lock()
            .pop_front()
            .unwrap_or_else(|| vec![StreamChunk::Done]);
        Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<Completion> {
        let text = self
            .completions
            .lock()
            .pop_front()
            .unwrap_or_else(|| r#"{"verdict": "proceed"}"#.to_string());
        Ok(Completion {
            text,
            usage: TokenUsage::default(),
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
