//! Policy types and the gate that enforces them
//!
//! `GlobalPolicy` holds process-wide defaults, `ToolRule` the per-tool
//! classification derived from the catalog, and `GateDecision` the immutable
//! outcome of one policy check. The gate itself lives in [`gate`].

pub mod consent;
pub mod gate;
pub mod rules;
pub mod wildcard;

pub use consent::{ConsentKey, ConsentStore};
pub use gate::PolicyGate;
pub use rules::default_rules_for_catalog;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Safety classification of a tool, driving consent requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    /// No side effects worth gating
    Safe,
    /// Touches the sandbox, network, or user data
    Sensitive,
    /// Destructive or administrative operations
    Admin,
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyLevel::Safe => write!(f, "safe"),
            SafetyLevel::Sensitive => write!(f, "sensitive"),
            SafetyLevel::Admin => write!(f, "admin"),
        }
    }
}

/// Process-wide policy defaults, immutable once the session is created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalPolicy {
    /// Safety levels that may run at all (others need consent)
    pub allow_safety_levels: Vec<SafetyLevel>,
    pub require_consent_for_sensitive: bool,
    pub require_consent_for_admin: bool,
    /// When present, only listed tools may run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_allowlist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_denylist: Option<Vec<String>>,
    pub network_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_allowlist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_denylist: Option<Vec<String>>,
    /// Silently reduce out-of-range arguments instead of only warning
    pub clamp_args: bool,
    /// Hard cap applied to any requested `timeout_sec`
    pub max_timeout_sec: u64,
    /// Whether granted consent is remembered for the session
    pub remember_consent: bool,
}

impl Default for GlobalPolicy {
    fn default() -> Self {
        GlobalPolicy {
            allow_safety_levels: vec![SafetyLevel::Safe, SafetyLevel::Sensitive],
            require_consent_for_sensitive: true,
            require_consent_for_admin: true,
            tool_allowlist: None,
            tool_denylist: None,
            network_enabled: true,
            domain_allowlist: None,
            domain_denylist: None,
            clamp_args: true,
            max_timeout_sec: 180,
            remember_consent: true,
        }
    }
}

/// Per-tool policy, derived once from the catalog at session start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRule {
    pub name: String,
    pub enabled: bool,
    pub safety: SafetyLevel,
    pub network: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm_limit: Option<u32>,
    #[serde(default)]
    pub cooldown_sec: f64,
    /// Argument name -> maximum accepted value
    #[serde(default)]
    pub arg_limits: HashMap<String, u64>,
}

impl ToolRule {
    /// A permissive rule for tools the derivation never classified
    pub fn permissive(name: &str) -> Self {
        ToolRule {
            name: name.to_string(),
            enabled: true,
            safety: SafetyLevel::Safe,
            network: false,
            allowed_domains: None,
            blocked_domains: None,
            rpm_limit: None,
            cooldown_sec: 0.0,
            arg_limits: HashMap::new(),
        }
    }
}

/// The immutable result of one policy check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub id: String,
    pub timestamp: String,
    pub tool_name: String,
    pub args: serde_json::Value,
    pub allowed: bool,
    pub requires_consent: bool,
    pub reason: String,
    pub warnings: Vec<String>,
    /// Args after clamping; what actually gets executed
    pub patched_args: serde_json::Value,
    pub retry_after_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_key: Option<ConsentKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_prompt: Option<String>,
}
