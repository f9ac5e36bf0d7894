//! Session state and registry
//!
//! A [`Session`] owns every mutable engine for one conversation: the policy
//! gate, budget ledger, result cache, memory index, logs and pending
//! approvals. The [`SessionRegistry`] hands out `Arc<tokio::Mutex<Session>>`
//! handles; a turn locks its session for the duration of processing, so two
//! turns on the same session serialize while distinct sessions run freely.

use crate::catalog::ToolCatalog;
use crate::engines::{BudgetLedger, MemoryIndex, ResultCache, RoutingEngine};
use crate::error::{Result, SwarmError};
use crate::llm::{AgentProfile, ChatMessage};
use crate::policy::{default_rules_for_catalog, GateDecision, GlobalPolicy, PolicyGate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Record of one executed tool call: duration, status, and the URL touched
/// when the tool went over the network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkLogEntry {
    pub at: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub ok: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One call in a provisional execution plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedCall {
    pub id: String,
    pub tool: String,
    pub args: serde_json::Value,
}

/// A consent request parked mid-turn, with the batch it would unblock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConsent {
    pub key: crate::policy::ConsentKey,
    pub prompt: String,
    pub plan: Vec<PlannedCall>,
}

/// A code edit awaiting explicit approval before it touches disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCodeEdit {
    pub id: String,
    pub path: String,
    pub new_content: String,
    pub description: String,
}

/// All state owned by one conversation
pub struct Session {
    pub id: String,
    pub profile: AgentProfile,
    pub history: Vec<ChatMessage>,
    pub gate: PolicyGate,
    pub ledger: BudgetLedger,
    pub cache: ResultCache,
    pub memory: MemoryIndex,
    pub routing: RoutingEngine,
    pub gating_log: Vec<GateDecision>,
    pub network_log: Vec<NetworkLogEntry>,
    pub pending_consent: Option<PendingConsent>,
    pub pending_code_edit: Option<PendingCodeEdit>,
    /// Execution state of a batch parked on consent, taken on resume
    pub parked_batch: Option<crate::exec::ParkedBatch>,
    /// Scratch accumulated over one turn's model calls. Lives on the
    /// session so a consent park does not lose it.
    pub turn_thought: Option<String>,
    pub turn_text: String,
    pub turn_grounding: Vec<crate::llm::GroundingSource>,
    interrupt: Arc<AtomicBool>,
}

impl Session {
    pub fn new(id: impl Into<String>, policy: GlobalPolicy, profile: AgentProfile) -> Self {
        let catalog = ToolCatalog::builtin();
        let rules = default_rules_for_catalog(&catalog);
        let routing = RoutingEngine::new(&catalog);
        let gate = PolicyGate::new(catalog, policy, rules);

        Session {
            id: id.into(),
            profile,
            history: Vec::new(),
            gate,
            ledger: BudgetLedger::default(),
            cache: ResultCache::default(),
            memory: MemoryIndex::new(),
            routing,
            gating_log: Vec::new(),
            network_log: Vec::new(),
            pending_consent: None,
            pending_code_edit: None,
            parked_batch: None,
            turn_thought: None,
            turn_text: String::new(),
            turn_grounding: Vec::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Clear per-turn scratch at the start of a fresh turn.
    pub fn begin_turn(&mut self) {
        self.turn_thought = None;
        self.turn_text.clear();
        self.turn_grounding.clear();
        self.clear_interrupt();
    }

    /// Swap in configured pricing. Discards any accumulated charges, so
    /// only sensible before the first turn.
    pub fn configure_budget(&mut self, price_in_per_m: f64, price_out_per_m: f64) {
        self.ledger = BudgetLedger::new(price_in_per_m, price_out_per_m);
    }

    /// Swap in configured cache bounds. Discards cached entries.
    pub fn configure_cache(&mut self, max_entries: usize, ttl_sec: u64, error_ttl_sec: u64) {
        self.cache = ResultCache::new(max_entries, ttl_sec, error_ttl_sec);
    }

    /// Shared flag a turn polls between steps. Cloned out so callers can
    /// signal without holding the session lock.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn request_interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    pub fn clear_interrupt(&self) {
        self.interrupt.store(false, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Clear conversation and accounting state. Granted consents survive a
    /// reset; revoking them is a policy change, not a conversation event.
    pub fn reset(&mut self) {
        self.history.clear();
        self.ledger.reset();
        self.cache.reset();
        self.memory.clear();
        self.gating_log.clear();
        self.network_log.clear();
        self.pending_consent = None;
        self.pending_code_edit = None;
        self.parked_batch = None;
        self.begin_turn();
    }

    pub fn log_network(
        &mut self,
        tool: &str,
        url: Option<String>,
        duration_ms: u64,
        result: std::result::Result<(), &str>,
    ) -> NetworkLogEntry {
        let entry = NetworkLogEntry {
            at: chrono::Utc::now().to_rfc3339(),
            tool: tool.to_string(),
            url,
            ok: result.is_ok(),
            duration_ms,
            error: result.err().map(|e| e.to_string()),
        };
        self.network_log.push(entry.clone());
        entry
    }
}

pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// Owns every live session; all lookups go through here
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, policy: GlobalPolicy, profile: AgentProfile) -> (String, SessionHandle) {
        let id = format!("sess-{}", Uuid::new_v4());
        let handle: SessionHandle =
            Arc::new(tokio::sync::Mutex::new(Session::new(&id, policy, profile)));
        self.sessions.lock().insert(id.clone(), Arc::clone(&handle));
        (id, handle)
    }

    pub fn get(&self, session_id: &str) -> Result<SessionHandle> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SwarmError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().remove(session_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_session() -> (SessionRegistry, String, SessionHandle) {
        let registry = SessionRegistry::new();
        let (id, handle) = registry.create(GlobalPolicy::default(), AgentProfile::standard());
        (registry, id, handle)
    }

    #[tokio::test]
    async fn test_registry_create_and_get() {
        let (registry, id, handle) = registry_session();
        let fetched = registry.get(&id).unwrap();
        assert!(Arc::ptr_eq(&handle, &fetched));
        assert!(matches!(
            registry.get("sess-missing"),
            Err(SwarmError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_preserves_consent() {
        let (_registry, _id, handle) = registry_session();
        let mut session = handle.lock().await;

        session
            .gate
            .grant_consent(crate::policy::ConsentKey::new("delete_path", None));
        session.history.push(ChatMessage::user("hi"));
        session.ledger.charge(10, 5, None);
        session.reset();

        assert!(session.history.is_empty());
        assert_eq!(session.ledger.totals().prompt_tokens, 0);
        let decision = session.gate.check("delete_path", &serde_json::json!({"path": "x"}));
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_interrupt_flag_is_shared() {
        let (_registry, _id, handle) = registry_session();
        let flag = handle.lock().await.interrupt_flag();
        flag.store(true, Ordering::SeqCst);
        assert!(handle.lock().await.is_interrupted());
    }

    #[tokio::test]
    async fn test_distinct_sessions_do_not_share_state() {
        let registry = SessionRegistry::new();
        let (_, a) = registry.create(GlobalPolicy::default(), AgentProfile::standard());
        let (_, b) = registry.create(GlobalPolicy::default(), AgentProfile::standard());

        a.lock().await.memory.commit("only in session a");
        assert!(b.lock().await.memory.is_empty());
    }
}
