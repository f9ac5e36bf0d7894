//! Delegated sub-tasks
//!
//! `delegate_task` spins up a short-lived sub-loop with a fresh, single
//! message history and a restricted tool surface. The sub-loop shares the
//! parent session's gate, cache and ledger, but cannot raise consent; a
//! consent-requiring call fails inside the sub-loop instead. There is no
//! synthesis pass and no nested delegation.

use crate::error::{Result, SwarmError};
use crate::exec::{BatchOutcome, ToolCall, ToolCoordinator, ToolResult};
use crate::llm::{AgentProfile, ChatMessage, StreamChunk};
use crate::session::Session;
use futures_util::StreamExt;
use serde_json::json;
use tracing::debug;

/// What a completed delegation hands back to the parent loop
#[derive(Debug)]
pub struct DelegateOutcome {
    pub answer: String,
    /// Full sub-loop history, for the parent model to inspect
    pub transcript: Vec<ChatMessage>,
}

pub async fn run_delegate(
    coordinator: &ToolCoordinator,
    session: &mut Session,
    task: &str,
) -> Result<DelegateOutcome> {
    let profile = AgentProfile::delegate();
    let tools: Vec<_> = {
        let catalog = session.gate.catalog();
        let allowed = profile.allowed_tools.as_deref().unwrap_or_default();
        catalog
            .specs()
            .filter(|s| allowed.iter().any(|a| a == &s.name))
            .cloned()
            .collect()
    };

    let mut transcript = vec![ChatMessage::user(task)];
    debug!(task_len = task.len(), "delegation started");

    for _ in 0..profile.max_model_calls {
        if session.is_interrupted() {
            return Err(SwarmError::Interrupted);
        }

        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(ChatMessage::system(profile.system_prompt.clone()));
        messages.extend(transcript.iter().cloned());

        let mut stream = coordinator.provider().stream_turn(&messages, &tools).await?;
        let mut text = String::new();
        let mut requests = Vec::new();

        while let Some(chunk) = stream.next().await {
            if session.is_interrupted() {
                return Err(SwarmError::Interrupted);
            }
            match chunk? {
                StreamChunk::Text(t) => text.push_str(&t),
                StreamChunk::ToolCalls(calls) => requests = calls,
                StreamChunk::Usage(usage) => {
                    session.ledger.charge(
                        usage.prompt_tokens,
                        usage.completion_tokens,
                        Some("delegate"),
                    );
                }
                StreamChunk::Grounding(_) | StreamChunk::Done => {}
            }
        }

        if requests.is_empty() {
            transcript.push(ChatMessage::assistant(text.clone()));
            debug!(answer_len = text.len(), "delegation finished");
            return Ok(DelegateOutcome {
                answer: text,
                transcript,
            });
        }

        transcript.push(ChatMessage::assistant_tool_calls(requests.clone()));
        let calls: Vec<ToolCall> = requests.iter().map(ToolCall::from).collect();
        match coordinator.execute_batch(session, &calls, 1).await {
            BatchOutcome::Completed(results) => {
                push_results(&mut transcript, &results);
            }
            BatchOutcome::ConsentRequired(_) => {
                // Unreachable at depth 1; the coordinator converts consent
                // into error payloads there
                return Err(SwarmError::Internal {
                    message: "consent raised inside delegation".to_string(),
                });
            }
            BatchOutcome::Interrupted => return Err(SwarmError::Interrupted),
        }
    }

    Err(SwarmError::TurnLimitReached {
        max_calls: profile.max_model_calls,
    })
}

fn push_results(transcript: &mut Vec<ChatMessage>, results: &[ToolResult]) {
    for result in results {
        let content = if result.warnings.is_empty() {
            result.value.to_string()
        } else {
            json!({ "result": result.value, "warnings": result.warnings }).to_string()
        };
        transcript.push(ChatMessage::tool_result(
            &result.call_id,
            &result.tool,
            content,
        ));
    }
}
