//! The turn loop
//!
//! One user message drives an iterative state machine: stream a model
//! response, execute any requested tools, feed results back, and repeat
//! until the model answers in plain text. A synthesis pass then judges the
//! draft and may replace it in place; a hard cap on model calls bounds
//! every turn. Consent requests park the turn; `resume_after_consent`
//! picks it back up.

pub mod delegate;
pub mod parser;
#[cfg(test)]
pub mod testing;

use crate::catalog::ToolSpec;
use crate::error::{Result, SwarmError};
use crate::events::{SessionUpdate, TurnStage, UpdateSender};
use crate::exec::{BatchOutcome, ToolCall, ToolCoordinator, ToolResult};
use crate::llm::{ChatMessage, GroundingSource, MessageRole, StreamChunk, ToolCallRequest};
use crate::session::{PendingConsent, Session};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a turn ended
#[derive(Debug)]
pub enum TurnOutcome {
    Completed {
        reply: String,
        thought: Option<String>,
        suggestions: Vec<String>,
        grounding: Vec<GroundingSource>,
    },
    /// Parked; resume with [`TurnProcessor::resume_after_consent`]
    AwaitingConsent(PendingConsent),
    Interrupted,
}

/// Drives the per-turn state machine for one session at a time
pub struct TurnProcessor {
    coordinator: Arc<ToolCoordinator>,
}

struct StreamedTurn {
    text: String,
    requests: Vec<ToolCallRequest>,
    interrupted: bool,
}

#[derive(Debug, Deserialize)]
struct SynthesisVerdict {
    verdict: String,
    #[serde(default)]
    content: Option<String>,
}

/// What the synthesis verdict does to the draft
enum SynthesisAction {
    /// Replace the draft with a revised answer
    Refine(String),
    /// Replace the draft with a clarifying question; suggestions are dropped
    Clarify(String),
}

impl TurnProcessor {
    pub fn new(coordinator: Arc<ToolCoordinator>) -> Self {
        TurnProcessor { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<ToolCoordinator> {
        &self.coordinator
    }

    fn updates(&self) -> &UpdateSender {
        self.coordinator.updates()
    }

    /// Process one user message to completion, consent, or interruption.
    /// Never fails: a top-level error becomes a single assistant-visible
    /// error message so the conversation stays usable.
    pub async fn process_turn(&self, session: &mut Session, user_message: &str) -> TurnOutcome {
        session.begin_turn();
        session.history.push(ChatMessage::user(user_message));
        self.updates()
            .send(SessionUpdate::messages(session.history.clone()));

        let result = self.drive(session).await;
        self.finish(session, result)
    }

    /// Resume a turn parked on consent. Approval re-executes the parked
    /// plan and lets the loop continue; refusal tells the model so.
    pub async fn resume_after_consent(
        &self,
        session: &mut Session,
        approved: bool,
    ) -> TurnOutcome {
        match self.coordinator.resolve_consent(session, approved).await {
            Ok(BatchOutcome::Completed(results)) => {
                self.push_tool_results(session, &results);
                let result = self.drive(session).await;
                self.finish(session, result)
            }
            Ok(BatchOutcome::ConsentRequired(pending)) => {
                self.updates().send_stage(TurnStage::AwaitingConsent);
                TurnOutcome::AwaitingConsent(pending)
            }
            Ok(BatchOutcome::Interrupted) => {
                self.updates().send_stage(TurnStage::Interrupted);
                TurnOutcome::Interrupted
            }
            Err(e) => self.finish(session, Err(e)),
        }
    }

    /// Fold an error outcome into the conversation instead of surfacing it.
    fn finish(&self, session: &mut Session, result: Result<TurnOutcome>) -> TurnOutcome {
        match result {
            Ok(outcome) => outcome,
            Err(SwarmError::Interrupted) => {
                self.updates().send_stage(TurnStage::Interrupted);
                TurnOutcome::Interrupted
            }
            Err(e) => {
                warn!(error = %e, "turn failed");
                let reply = e.user_message();
                session.history.push(ChatMessage::assistant(reply.clone()));
                self.updates()
                    .send(SessionUpdate::messages(session.history.clone()));
                self.updates().send_stage(TurnStage::Done);
                TurnOutcome::Completed {
                    reply,
                    thought: None,
                    suggestions: Vec::new(),
                    grounding: Vec::new(),
                }
            }
        }
    }

    async fn drive(&self, session: &mut Session) -> Result<TurnOutcome> {
        let max_calls = session.profile.max_model_calls;
        let mut model_calls = 0usize;

        loop {
            if session.is_interrupted() {
                return Err(SwarmError::Interrupted);
            }
            if model_calls >= max_calls {
                // The cap ends the turn with whatever the model already
                // said, not an error
                warn!(max_calls, "model-call cap reached; finalizing turn");
                let reply = if session.turn_text.trim().is_empty() {
                    SwarmError::TurnLimitReached { max_calls }.user_message()
                } else {
                    session.turn_text.clone()
                };
                return Ok(self.finish_turn(session, reply, Vec::new()));
            }
            model_calls += 1;

            self.updates().send_stage(TurnStage::Streaming);
            let streamed = self.stream_once(session).await?;
            if streamed.interrupted {
                return Err(SwarmError::Interrupted);
            }

            // Peel private reasoning before the text goes anywhere; the
            // first thought of the turn travels as a side-channel update
            let (thought, text) = parser::parse_thought(&streamed.text);
            if let Some(thought) = thought {
                if session.turn_thought.is_none() {
                    session.turn_thought = Some(thought.clone());
                }
                self.updates().send(SessionUpdate {
                    thought: Some(thought),
                    ..Default::default()
                });
            }

            if !streamed.requests.is_empty() {
                // Commentary streamed ahead of the tool calls stays on the
                // message and counts toward the turn's accumulated text
                let mut message = ChatMessage::assistant_tool_calls(streamed.requests.clone());
                message.content = text.clone();
                session.history.push(message);
                if !text.trim().is_empty() {
                    if !session.turn_text.is_empty() {
                        session.turn_text.push('\n');
                    }
                    session.turn_text.push_str(text.trim());
                }
                self.updates().send_stage(TurnStage::ToolExecuting);

                let calls: Vec<ToolCall> =
                    streamed.requests.iter().map(ToolCall::from).collect();
                match self.coordinator.execute_batch(session, &calls, 0).await {
                    BatchOutcome::Completed(results) => {
                        self.push_tool_results(session, &results);
                        continue;
                    }
                    BatchOutcome::ConsentRequired(pending) => {
                        self.updates().send_stage(TurnStage::AwaitingConsent);
                        return Ok(TurnOutcome::AwaitingConsent(pending));
                    }
                    BatchOutcome::Interrupted => return Err(SwarmError::Interrupted),
                }
            }

            // Plain-text answer: pull the suggestions off the draft, then
            // let synthesis revise it in place
            let (mut suggestions, mut reply) = parser::parse_suggestions(&text);
            if !reply.trim().is_empty() {
                self.updates().send_stage(TurnStage::Synthesizing);
                match self.synthesis_action(session, &reply).await {
                    Some(SynthesisAction::Refine(content)) => reply = content,
                    Some(SynthesisAction::Clarify(content)) => {
                        reply = content;
                        suggestions.clear();
                    }
                    None => {}
                }
            }
            return Ok(self.finish_turn(session, reply, suggestions));
        }
    }

    fn finish_turn(
        &self,
        session: &mut Session,
        reply: String,
        suggestions: Vec<String>,
    ) -> TurnOutcome {
        session.history.push(ChatMessage::assistant(reply.clone()));
        self.updates().send(SessionUpdate {
            messages: Some(session.history.clone()),
            budget_totals: Some(session.ledger.totals()),
            stage: Some(TurnStage::Done),
            ..Default::default()
        });

        TurnOutcome::Completed {
            reply,
            thought: session.turn_thought.take(),
            suggestions,
            grounding: std::mem::take(&mut session.turn_grounding),
        }
    }

    async fn stream_once(&self, session: &mut Session) -> Result<StreamedTurn> {
        let mut messages = Vec::with_capacity(session.history.len() + 1);
        messages.push(ChatMessage::system(session.profile.system_prompt.clone()));
        messages.extend(session.history.iter().cloned());

        let tools = profile_tools(session);
        let mut stream = self
            .coordinator
            .provider()
            .stream_turn(&messages, &tools)
            .await?;

        let mut text = String::new();
        let mut requests = Vec::new();

        while let Some(chunk) = stream.next().await {
            if session.is_interrupted() {
                return Ok(StreamedTurn {
                    text,
                    requests,
                    interrupted: true,
                });
            }
            match chunk? {
                StreamChunk::Text(t) => text.push_str(&t),
                StreamChunk::ToolCalls(calls) => requests = calls,
                StreamChunk::Usage(usage) => {
                    session
                        .ledger
                        .charge(usage.prompt_tokens, usage.completion_tokens, Some("turn"));
                    self.updates().send(SessionUpdate {
                        budget_totals: Some(session.ledger.totals()),
                        ..Default::default()
                    });
                }
                StreamChunk::Grounding(sources) => session.turn_grounding.extend(sources),
                StreamChunk::Done => break,
            }
        }

        Ok(StreamedTurn {
            text,
            requests,
            interrupted: false,
        })
    }

    /// Ask the model to judge its own draft against the conversation so
    /// far. A `refine` or `clarify` verdict carries the full replacement
    /// text; every failure mode means "proceed" with the draft untouched.
    async fn synthesis_action(
        &self,
        session: &mut Session,
        draft: &str,
    ) -> Option<SynthesisAction> {
        let trace: String = session
            .history
            .iter()
            .map(|m| format!("{}: {}", role_label(m.role), m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "You are reviewing a draft reply before it is shown to the user.\n\
             Conversation so far:\n{}\n\n\
             Draft:\n{}\n\n\
             Answer with JSON only: {{\"verdict\": \"proceed\"|\"refine\"|\"clarify\", \
             \"content\": \"...\"}}. Use refine to rewrite a draft with a \
             concrete fixable problem; use clarify to replace it with a \
             question when the request is ambiguous. Either way `content` \
             is the complete replacement text.",
            trace, draft
        );
        let messages = vec![ChatMessage::user(prompt)];

        let completion = match self.coordinator.provider().complete(&messages).await {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "synthesis step failed; proceeding with draft");
                return None;
            }
        };
        session.ledger.charge(
            completion.usage.prompt_tokens,
            completion.usage.completion_tokens,
            Some("synthesis"),
        );

        let parsed: SynthesisVerdict = match serde_json::from_str(extract_json(&completion.text)) {
            Ok(v) => v,
            Err(_) => return None,
        };
        match (parsed.verdict.as_str(), parsed.content) {
            ("refine", Some(content)) => Some(SynthesisAction::Refine(content)),
            ("clarify", Some(content)) => Some(SynthesisAction::Clarify(content)),
            _ => None,
        }
    }

    fn push_tool_results(&self, session: &mut Session, results: &[ToolResult]) {
        for result in results {
            let content = if result.warnings.is_empty() {
                result.value.to_string()
            } else {
                json!({ "result": result.value, "warnings": result.warnings }).to_string()
            };
            session
                .history
                .push(ChatMessage::tool_result(&result.call_id, &result.tool, content));
        }
        self.updates()
            .send(SessionUpdate::messages(session.history.clone()));
    }
}

/// The tool surface visible to this session's profile.
fn profile_tools(session: &Session) -> Vec<ToolSpec> {
    let catalog = session.gate.catalog();
    match &session.profile.allowed_tools {
        None => catalog.specs().cloned().collect(),
        Some(allowed) => catalog
            .specs()
            .filter(|s| allowed.iter().any(|a| a == &s.name))
            .cloned()
            .collect(),
    }
}

fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

/// Trim surrounding prose or code fences off a JSON verdict.
fn extract_json(text: &str) -> &str {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &text[s..=e],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedProvider;
    use super::*;
    use crate::events::UpdateSender;
    use crate::llm::{AgentProfile, MessageRole, TokenUsage};
    use crate::policy::{GlobalPolicy, SafetyLevel};
    use crate::sandbox::LocalSandbox;

    fn open_policy() -> GlobalPolicy {
        GlobalPolicy {
            allow_safety_levels: vec![
                SafetyLevel::Safe,
                SafetyLevel::Sensitive,
                SafetyLevel::Admin,
            ],
            require_consent_for_sensitive: false,
            require_consent_for_admin: false,
            ..GlobalPolicy::default()
        }
    }

    fn processor(dir: &tempfile::TempDir, provider: ScriptedProvider) -> TurnProcessor {
        let sandbox = Arc::new(LocalSandbox::new(dir.path()).unwrap());
        let coordinator = Arc::new(ToolCoordinator::new(
            sandbox,
            Arc::new(provider),
            UpdateSender::sink(),
        ));
        TurnProcessor::new(coordinator)
    }

    fn tool_call(id: &str, name: &str, args: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args.to_string(),
        }
    }

    #[tokio::test]
    async fn test_plain_text_turn() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![vec![
            StreamChunk::Text("<thought>easy</thought>Hello there.".to_string()),
            StreamChunk::Usage(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            StreamChunk::Done,
        ]]);
        let processor = processor(&dir, provider);
        let mut session = Session::new("s", open_policy(), AgentProfile::standard());

        let outcome = processor.process_turn(&mut session, "hi").await;
        let TurnOutcome::Completed {
            reply, thought, ..
        } = outcome
        else {
            panic!("expected completion");
        };
        assert_eq!(reply, "Hello there.");
        assert_eq!(thought.as_deref(), Some("easy"));
        assert_eq!(session.ledger.totals().prompt_tokens, 10);
        // user + assistant
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_tool_call_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            vec![
                StreamChunk::ToolCalls(vec![tool_call(
                    "c1",
                    "commit_memory",
                    r#"{"text": "user likes rust"}"#,
                )]),
                StreamChunk::Done,
            ],
            vec![
                StreamChunk::Text("Noted.".to_string()),
                StreamChunk::Done,
            ],
        ]);
        let processor = processor(&dir, provider);
        let mut session = Session::new("s", open_policy(), AgentProfile::standard());

        let outcome = processor.process_turn(&mut session, "remember this").await;
        let TurnOutcome::Completed { reply, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(reply, "Noted.");
        assert_eq!(session.memory.len(), 1);
        // user, assistant(tool_calls), tool, assistant
        assert_eq!(session.history.len(), 4);
        assert_eq!(session.history[2].role, MessageRole::Tool);
    }

    #[tokio::test]
    async fn test_consent_parks_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            vec![
                StreamChunk::ToolCalls(vec![tool_call(
                    "c1",
                    "delete_path",
                    r#"{"path": "junk.txt"}"#,
                )]),
                StreamChunk::Done,
            ],
            vec![
                StreamChunk::Text("Deleted.".to_string()),
                StreamChunk::Done,
            ],
        ]);
        let processor = processor(&dir, provider);
        // Default policy requires consent for admin tools
        let mut session = Session::new("s", GlobalPolicy::default(), AgentProfile::standard());
        processor
            .coordinator()
            .sandbox()
            .write_file("junk.txt", "x")
            .await
            .unwrap();

        let outcome = processor.process_turn(&mut session, "clean up").await;
        let TurnOutcome::AwaitingConsent(pending) = outcome else {
            panic!("expected consent");
        };
        assert_eq!(pending.key.tool, "delete_path");

        let outcome = processor.resume_after_consent(&mut session, true).await;
        let TurnOutcome::Completed { reply, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(reply, "Deleted.");
        assert!(processor
            .coordinator()
            .sandbox()
            .read_file("junk.txt")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_consent_refusal_becomes_reply() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![vec![
            StreamChunk::ToolCalls(vec![tool_call(
                "c1",
                "delete_path",
                r#"{"path": "junk.txt"}"#,
            )]),
            StreamChunk::Done,
        ]]);
        let processor = processor(&dir, provider);
        let mut session = Session::new("s", GlobalPolicy::default(), AgentProfile::standard());

        processor.process_turn(&mut session, "clean up").await;
        let outcome = processor.resume_after_consent(&mut session, false).await;
        let TurnOutcome::Completed { reply, .. } = outcome else {
            panic!("expected completion");
        };
        assert!(reply.contains("declined"));
    }

    #[tokio::test]
    async fn test_model_call_cap_ends_turn() {
        let dir = tempfile::tempdir().unwrap();
        // Scripts the same tool call forever; the cap must break the loop
        let script: Vec<Vec<StreamChunk>> = (0..20)
            .map(|_| {
                vec![
                    StreamChunk::ToolCalls(vec![tool_call(
                        "c1",
                        "recall_memory",
                        r#"{"query": "anything at all"}"#,
                    )]),
                    StreamChunk::Done,
                ]
            })
            .collect();
        let processor = processor(&dir, ScriptedProvider::new(script));
        let mut profile = AgentProfile::standard();
        profile.max_model_calls = 3;
        let mut session = Session::new("s", open_policy(), profile);

        let outcome = processor.process_turn(&mut session, "loop").await;
        let TurnOutcome::Completed { reply, .. } = outcome else {
            panic!("expected completion");
        };
        assert!(reply.contains("limit"), "reply: {}", reply);
    }

    #[tokio::test]
    async fn test_cap_finalizes_with_accumulated_commentary() {
        let dir = tempfile::tempdir().unwrap();
        // Every lap streams commentary and then asks for another tool call
        let script: Vec<Vec<StreamChunk>> = (0..5)
            .map(|_| {
                vec![
                    StreamChunk::Text("Still digging.".to_string()),
                    StreamChunk::ToolCalls(vec![tool_call(
                        "c1",
                        "recall_memory",
                        r#"{"query": "anything at all"}"#,
                    )]),
                    StreamChunk::Done,
                ]
            })
            .collect();
        let processor = processor(&dir, ScriptedProvider::new(script));
        let mut profile = AgentProfile::standard();
        profile.max_model_calls = 2;
        let mut session = Session::new("s", open_policy(), profile);

        let outcome = processor.process_turn(&mut session, "loop").await;
        let TurnOutcome::Completed { reply, .. } = outcome else {
            panic!("expected completion");
        };
        assert!(reply.contains("Still digging."), "reply: {}", reply);
    }

    #[tokio::test]
    async fn test_tool_call_lap_keeps_commentary() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            vec![
                StreamChunk::Text("Let me check.".to_string()),
                StreamChunk::ToolCalls(vec![tool_call(
                    "c1",
                    "recall_memory",
                    r#"{"query": "anything at all"}"#,
                )]),
                StreamChunk::Done,
            ],
            vec![StreamChunk::Text("Done.".to_string()), StreamChunk::Done],
        ]);
        let processor = processor(&dir, provider);
        let mut session = Session::new("s", open_policy(), AgentProfile::standard());

        processor.process_turn(&mut session, "check it").await;
        let lap_message = &session.history[1];
        assert_eq!(lap_message.role, MessageRole::Assistant);
        assert!(lap_message.tool_calls.is_some());
        assert_eq!(lap_message.content, "Let me check.");
    }

    #[tokio::test]
    async fn test_thought_travels_as_side_channel_update() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![vec![
            StreamChunk::Text("<thought>hmm</thought>Answer.".to_string()),
            StreamChunk::Done,
        ]]);
        let sandbox = Arc::new(LocalSandbox::new(dir.path()).unwrap());
        let (updates, mut rx) = UpdateSender::channel();
        let coordinator = Arc::new(ToolCoordinator::new(sandbox, Arc::new(provider), updates));
        let processor = TurnProcessor::new(coordinator);
        let mut session = Session::new("s", open_policy(), AgentProfile::standard());

        let outcome = processor.process_turn(&mut session, "hi").await;
        let TurnOutcome::Completed { reply, thought, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(reply, "Answer.");
        assert_eq!(thought.as_deref(), Some("hmm"));

        let mut seen = false;
        while let Ok(update) = rx.try_recv() {
            if update.thought.as_deref() == Some("hmm") {
                seen = true;
            }
        }
        assert!(seen, "no thought update observed");
    }

    #[tokio::test]
    async fn test_grounding_survives_consent_park() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            vec![
                StreamChunk::Grounding(vec![crate::llm::GroundingSource {
                    url: "https://example.test/doc".to_string(),
                    title: None,
                }]),
                StreamChunk::ToolCalls(vec![tool_call(
                    "c1",
                    "delete_path",
                    r#"{"path": "junk.txt"}"#,
                )]),
                StreamChunk::Done,
            ],
            vec![StreamChunk::Text("Deleted.".to_string()), StreamChunk::Done],
        ]);
        let processor = processor(&dir, provider);
        let mut session = Session::new("s", GlobalPolicy::default(), AgentProfile::standard());
        processor
            .coordinator()
            .sandbox()
            .write_file("junk.txt", "x")
            .await
            .unwrap();

        let outcome = processor.process_turn(&mut session, "clean up").await;
        assert!(matches!(outcome, TurnOutcome::AwaitingConsent(_)));

        let outcome = processor.resume_after_consent(&mut session, true).await;
        let TurnOutcome::Completed { grounding, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(grounding.len(), 1);
        assert_eq!(grounding[0].url, "https://example.test/doc");
    }

    #[tokio::test]
    async fn test_refine_verdict_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![vec![
            StreamChunk::Text("Draft answer.".to_string()),
            StreamChunk::Done,
        ]])
        .with_completions(vec![
            r#"{"verdict": "refine", "content": "Polished answer."}"#.to_string(),
        ]);
        let processor = processor(&dir, provider);
        let mut session = Session::new("s", open_policy(), AgentProfile::standard());

        let outcome = processor.process_turn(&mut session, "question").await;
        let TurnOutcome::Completed { reply, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(reply, "Polished answer.");
        // The revision happens in place: one model stream, and the history
        // carries only the revised reply
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[1].content, "Polished answer.");
    }

    #[tokio::test]
    async fn test_clarify_verdict_replaces_reply_and_drops_suggestions() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![vec![
            StreamChunk::Text(
                "Draft answer.\n<suggestions>[\"Tell me more\"]</suggestions>".to_string(),
            ),
            StreamChunk::Done,
        ]])
        .with_completions(vec![
            r#"{"verdict": "clarify", "content": "Which file do you mean?"}"#.to_string(),
        ]);
        let processor = processor(&dir, provider);
        let mut session = Session::new("s", open_policy(), AgentProfile::standard());

        let outcome = processor.process_turn(&mut session, "open it").await;
        let TurnOutcome::Completed {
            reply, suggestions, ..
        } = outcome
        else {
            panic!("expected completion");
        };
        assert_eq!(reply, "Which file do you mean?");
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_verdict_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![vec![
            StreamChunk::Text("Answer.".to_string()),
            StreamChunk::Done,
        ]])
        .with_completions(vec!["sorry, no JSON here".to_string()]);
        let processor = processor(&dir, provider);
        let mut session = Session::new("s", open_policy(), AgentProfile::standard());

        let outcome = processor.process_turn(&mut session, "question").await;
        let TurnOutcome::Completed { reply, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(reply, "Answer.");
    }

    #[tokio::test]
    async fn test_interrupt_before_stream() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![vec![
            StreamChunk::Text("never seen".to_string()),
            StreamChunk::Done,
        ]]);
        let processor = processor(&dir, provider);
        let mut session = Session::new("s", open_policy(), AgentProfile::standard());

        // process_turn clears the flag, so set it through the shared handle
        // a consumer would hold, after the turn starts; here we emulate by
        // driving the inner loop directly.
        session.history.push(ChatMessage::user("hi"));
        session.request_interrupt();
        let result = processor.drive(&mut session).await;
        assert!(matches!(result, Err(SwarmError::Interrupted)));
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("no braces"), "no braces");
    }
}
