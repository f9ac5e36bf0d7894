//! Session update channel
//!
//! Turn processing reports progress by sending [`SessionUpdate`] patches
//! over an unbounded channel. Every field is optional; a consumer applies
//! only what is set. State flows one way: the orchestration task owns the
//! session and publishes, consumers only read.

use crate::engines::{BudgetTotals, MemoryEntry};
use crate::llm::ChatMessage;
use crate::policy::GateDecision;
use crate::sandbox::SandboxStatus;
use crate::session::{NetworkLogEntry, PendingCodeEdit, PendingConsent};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Current phase of the turn, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Streaming,
    ToolExecuting,
    Synthesizing,
    AwaitingConsent,
    Interrupted,
    Done,
}

/// One incremental patch to observed session state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<TurnStage>,
    /// Private reasoning peeled off a streamed response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gating_log_append: Vec<GateDecision>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_log_append: Vec<NetworkLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_snapshot: Option<Vec<MemoryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_totals: Option<BudgetTotals>,
    /// Set when the turn parked on a consent request; cleared with
    /// `Some(None)` once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_consent: Option<Option<PendingConsent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_code_edit: Option<Option<PendingCodeEdit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_status: Option<SandboxStatus>,
}

impl SessionUpdate {
    pub fn stage(stage: TurnStage) -> Self {
        SessionUpdate {
            stage: Some(stage),
            ..Default::default()
        }
    }

    pub fn messages(messages: Vec<ChatMessage>) -> Self {
        SessionUpdate {
            messages: Some(messages),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_none()
            && self.stage.is_none()
            && self.thought.is_none()
            && self.gating_log_append.is_empty()
            && self.network_log_append.is_empty()
            && self.memory_snapshot.is_none()
            && self.budget_totals.is_none()
            && self.pending_consent.is_none()
            && self.pending_code_edit.is_none()
            && self.sandbox_status.is_none()
    }
}

/// Sending half of the update channel. Sends never fail; a closed receiver
/// just means nobody is watching anymore.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::UnboundedSender<SessionUpdate>,
}

impl UpdateSender {
    pub fn channel() -> (UpdateSender, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (UpdateSender { tx }, rx)
    }

    /// A sender whose updates go nowhere; used by the delegation sub-loop
    /// and in tests.
    pub fn sink() -> UpdateSender {
        let (tx, _rx) = mpsc::unbounded_channel();
        UpdateSender { tx }
    }

    pub fn send(&self, update: SessionUpdate) {
        if update.is_empty() {
            return;
        }
        let _ = self.tx.send(update);
    }

    pub fn send_stage(&self, stage: TurnStage) {
        self.send(SessionUpdate::stage(stage));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_updates_arrive_in_order() {
        let (tx, mut rx) = UpdateSender::channel();
        tx.send_stage(TurnStage::Streaming);
        tx.send_stage(TurnStage::Done);

        assert_eq!(rx.recv().await.unwrap().stage, Some(TurnStage::Streaming));
        assert_eq!(rx.recv().await.unwrap().stage, Some(TurnStage::Done));
    }

    #[tokio::test]
    async fn test_empty_updates_are_dropped() {
        let (tx, mut rx) = UpdateSender::channel();
        tx.send(SessionUpdate::default());
        tx.send_stage(TurnStage::Done);
        assert_eq!(rx.recv().await.unwrap().stage, Some(TurnStage::Done));
    }

    #[test]
    fn test_send_after_receiver_drop_is_silent() {
        let (tx, rx) = UpdateSender::channel();
        drop(rx);
        tx.send_stage(TurnStage::Done);
    }
}
