//! Tool execution coordination
//!
//! The coordinator runs a model-requested batch strictly in order: each call
//! is gated, then executed, then logged before the next begins. A denial
//! becomes an error payload the model sees, and the batch continues. A
//! consent requirement stops the batch at that call: everything before it
//! has already run and is parked for the resume, everything after it never
//! runs and must be re-requested.

pub mod runner;

use crate::error::{Result, SwarmError};
use crate::events::{SessionUpdate, UpdateSender};
use crate::llm::{ModelProvider, ToolCallRequest};
use crate::policy::GateDecision;
use crate::sandbox::SandboxService;
use crate::session::{PendingConsent, PlannedCall, Session};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// One gated, executable tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl From<&ToolCallRequest> for ToolCall {
    fn from(request: &ToolCallRequest) -> Self {
        ToolCall {
            id: request.id.clone(),
            name: request.name.clone(),
            args: request.parsed_args(),
        }
    }
}

/// Outcome of one executed (or refused) call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool: String,
    pub ok: bool,
    pub value: Value,
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Outcome of one batch
#[derive(Debug)]
pub enum BatchOutcome {
    Completed(Vec<ToolResult>),
    /// A call needs consent; execution stopped at that call
    ConsentRequired(PendingConsent),
    Interrupted,
}

/// Where a consent request stopped a batch: what already ran, the call
/// waiting on the grant, and the calls behind it that will not run
#[derive(Debug, Clone)]
pub struct ParkedBatch {
    pub completed: Vec<ToolResult>,
    pub call: ToolCall,
    pub skipped: Vec<ToolCall>,
}

/// Runs gated tool batches against the sandbox
pub struct ToolCoordinator {
    sandbox: Arc<dyn SandboxService>,
    provider: Arc<dyn ModelProvider>,
    updates: UpdateSender,
}

impl ToolCoordinator {
    pub fn new(
        sandbox: Arc<dyn SandboxService>,
        provider: Arc<dyn ModelProvider>,
        updates: UpdateSender,
    ) -> Self {
        ToolCoordinator {
            sandbox,
            provider,
            updates,
        }
    }

    /// Execute a batch sequentially. `depth` is zero for the main loop;
    /// inside a delegation sub-loop consent cannot be raised interactively,
    /// so a consent-requiring call fails as an error payload instead.
    pub async fn execute_batch(
        &self,
        session: &mut Session,
        calls: &[ToolCall],
        depth: usize,
    ) -> BatchOutcome {
        let mut results = Vec::with_capacity(calls.len());

        for (index, call) in calls.iter().enumerate() {
            if session.is_interrupted() {
                return BatchOutcome::Interrupted;
            }

            match self.run_gated(session, call, depth).await {
                Ok(result) => results.push(result),
                Err(decision) => {
                    let Some(key) = decision.consent_key.clone() else {
                        results.push(ToolResult {
                            call_id: call.id.clone(),
                            tool: call.name.clone(),
                            ok: false,
                            value: json!({ "error": "consent required but no consent key was issued" }),
                            from_cache: false,
                            warnings: decision.warnings,
                        });
                        continue;
                    };

                    let pending = PendingConsent {
                        key,
                        prompt: decision
                            .consent_prompt
                            .clone()
                            .unwrap_or_else(|| decision.reason.clone()),
                        plan: calls
                            .iter()
                            .map(|c| PlannedCall {
                                id: c.id.clone(),
                                tool: c.name.clone(),
                                args: c.args.clone(),
                            })
                            .collect(),
                    };
                    session.pending_consent = Some(pending.clone());
                    session.parked_batch = Some(ParkedBatch {
                        completed: results,
                        call: call.clone(),
                        skipped: calls[index + 1..].to_vec(),
                    });
                    self.updates.send(SessionUpdate {
                        pending_consent: Some(Some(pending.clone())),
                        ..Default::default()
                    });
                    return BatchOutcome::ConsentRequired(pending);
                }
            }
        }

        BatchOutcome::Completed(results)
    }

    /// Gate one call and, if allowed, execute and log it. The gating
    /// decision always lands in the gating log; every executed call lands
    /// in the network log with its measured duration. Returns the decision
    /// instead when the call needs top-level consent.
    async fn run_gated(
        &self,
        session: &mut Session,
        call: &ToolCall,
        depth: usize,
    ) -> std::result::Result<ToolResult, GateDecision> {
        let decision = session.gate.check(&call.name, &call.args);
        session.gating_log.push(decision.clone());
        self.updates.send(SessionUpdate {
            gating_log_append: vec![decision.clone()],
            ..Default::default()
        });

        if decision.requires_consent {
            if depth > 0 {
                warn!(tool = %call.name, "consent required inside delegation; failing the call");
                return Ok(ToolResult {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    ok: false,
                    value: json!({ "error": format!(
                        "tool {} requires consent, which cannot be granted inside a delegated task",
                        call.name
                    )}),
                    from_cache: false,
                    warnings: decision.warnings,
                });
            }
            return Err(decision);
        }

        if !decision.allowed {
            let mut payload = json!({ "error": decision.reason });
            if decision.retry_after_sec > 0.0 {
                payload["retry_after_sec"] = json!(decision.retry_after_sec);
            }
            return Ok(ToolResult {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                ok: false,
                value: payload,
                from_cache: false,
                warnings: decision.warnings,
            });
        }

        debug!(tool = %call.name, call_id = %call.id, "executing");
        let started = Instant::now();
        let result = self
            .run_one(session, call, &decision.patched_args, depth)
            .await;

        let url = decision
            .patched_args
            .get("url")
            .and_then(Value::as_str)
            .map(|u| u.to_string());
        let status = if result.ok {
            Ok(())
        } else {
            Err(result
                .value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("tool failed"))
        };
        let entry = session.log_network(
            &call.name,
            url,
            started.elapsed().as_millis() as u64,
            status,
        );
        self.updates.send(SessionUpdate {
            network_log_append: vec![entry],
            ..Default::default()
        });

        Ok(ToolResult {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            ok: result.ok,
            value: result.value,
            from_cache: result.from_cache,
            warnings: decision.warnings,
        })
    }

    /// Resolve a pending consent request. On approval the gate records the
    /// grant and the parked call runs; calls queued behind it are answered
    /// with an error payload so the model can re-request them. On refusal
    /// the park is dropped and the refusal surfaces to the user.
    pub async fn resolve_consent(
        &self,
        session: &mut Session,
        approved: bool,
    ) -> Result<BatchOutcome> {
        let pending = session
            .pending_consent
            .take()
            .ok_or_else(|| SwarmError::Internal {
                message: "no pending consent to resolve".to_string(),
            })?;
        let parked = session
            .parked_batch
            .take()
            .ok_or_else(|| SwarmError::Internal {
                message: "pending consent without a parked batch".to_string(),
            })?;
        self.updates.send(SessionUpdate {
            pending_consent: Some(None),
            ..Default::default()
        });

        if !approved {
            return Err(SwarmError::ApprovalDenied {
                action: pending.key.to_string(),
            });
        }

        session.gate.grant_consent(pending.key.clone());
        let mut results = parked.completed;
        match self.run_gated(session, &parked.call, 0).await {
            Ok(result) => results.push(result),
            // The grant did not cover the re-check; fail the call rather
            // than park again
            Err(decision) => results.push(ToolResult {
                call_id: parked.call.id.clone(),
                tool: parked.call.name.clone(),
                ok: false,
                value: json!({ "error": decision.reason }),
                from_cache: false,
                warnings: decision.warnings,
            }),
        }
        for call in &parked.skipped {
            results.push(ToolResult {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                ok: false,
                value: json!({
                    "error": "not executed: the batch stopped for a consent request; request this call again if still needed"
                }),
                from_cache: false,
                warnings: Vec::new(),
            });
        }
        Ok(BatchOutcome::Completed(results))
    }

    /// Apply or discard a parked code edit.
    pub async fn resolve_code_edit(
        &self,
        session: &mut Session,
        edit_id: &str,
        approved: bool,
    ) -> Result<Value> {
        let pending = session
            .pending_code_edit
            .take()
            .filter(|e| e.id == edit_id)
            .ok_or_else(|| SwarmError::Internal {
                message: format!("no pending code edit with id {}", edit_id),
            })?;
        self.updates.send(SessionUpdate {
            pending_code_edit: Some(None),
            ..Default::default()
        });

        if !approved {
            return Err(SwarmError::ApprovalDenied {
                action: format!("edit {}", pending.path),
            });
        }

        self.sandbox
            .write_file(&pending.path, &pending.new_content)
            .await?;
        Ok(json!({ "applied": true, "path": pending.path }))
    }

    pub fn sandbox(&self) -> &Arc<dyn SandboxService> {
        &self.sandbox
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    pub fn updates(&self) -> &UpdateSender {
        &self.updates
    }
}
