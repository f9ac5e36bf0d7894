//! Token/cost budget ledger
//!
//! Linear per-million-token pricing with distinct input and output rates.
//! Charges append an immutable record and bump the running totals; prior
//! records are never recomputed or rewritten.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One model call's charge, appended to history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRecord {
    pub at: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Running totals, monotonically increasing for the session's lifetime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Default)]
struct LedgerState {
    totals: BudgetTotals,
    history: Vec<ChargeRecord>,
}

/// Per-session budget ledger
#[derive(Debug)]
pub struct BudgetLedger {
    price_in_per_m: f64,
    price_out_per_m: f64,
    state: Mutex<LedgerState>,
}

impl Default for BudgetLedger {
    fn default() -> Self {
        // Per-million-token rates in USD
        BudgetLedger::new(0.35, 1.05)
    }
}

impl BudgetLedger {
    pub fn new(price_in_per_m: f64, price_out_per_m: f64) -> Self {
        BudgetLedger {
            price_in_per_m,
            price_out_per_m,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Estimated cost for a single call at the configured rates
    pub fn estimate_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1e6) * self.price_in_per_m
            + (completion_tokens as f64 / 1e6) * self.price_out_per_m
    }

    /// Append a charge record and update the running totals.
    pub fn charge(
        &self,
        prompt_tokens: u64,
        completion_tokens: u64,
        label: Option<&str>,
    ) -> ChargeRecord {
        let cost = self.estimate_cost(prompt_tokens, completion_tokens);
        let record = ChargeRecord {
            at: chrono::Utc::now().to_rfc3339(),
            prompt_tokens,
            completion_tokens,
            cost_usd: cost,
            label: label.map(|l| l.to_string()),
        };

        let mut state = self.state.lock();
        state.totals.prompt_tokens += prompt_tokens;
        state.totals.completion_tokens += completion_tokens;
        state.totals.cost_usd += cost;
        state.history.push(record.clone());
        record
    }

    pub fn totals(&self) -> BudgetTotals {
        self.state.lock().totals.clone()
    }

    pub fn history(&self) -> Vec<ChargeRecord> {
        self.state.lock().history.clone()
    }

    /// Clear totals and history; used on session reset, never mid-turn.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.totals = BudgetTotals::default();
        state.history.clear();
    }
}
