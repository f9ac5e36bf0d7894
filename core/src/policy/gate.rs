//! The policy gate
//!
//! `PolicyGate::check` composes the allow/deny lists, per-tool rules, safety
//! classification, consent requirements, domain policy and the rate limiter
//! into one `GateDecision`. Evaluation short-circuits on the first terminal
//! outcome; rate limiting runs last so clamp warnings survive a rate-limited
//! decision. The clock is injected so decisions are deterministic under test.

use super::consent::{ConsentKey, ConsentStore};
use super::wildcard;
use super::{GateDecision, GlobalPolicy, SafetyLevel, ToolRule};
use crate::catalog::ToolCatalog;
use crate::rate_limiter::RateLimiter;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

/// Clock used by the gate; seconds since the epoch
pub type ClockFn = Arc<dyn Fn() -> f64 + Send + Sync>;

fn system_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Argument names subject to per-tool clamping (besides `timeout_sec`)
const CLAMPABLE_ARGS: &[&str] = &["max_results", "max_items", "max_rows", "max_bytes", "max_chars"];

/// Decides, per requested tool invocation, allow / deny / pending consent
pub struct PolicyGate {
    catalog: ToolCatalog,
    policy: GlobalPolicy,
    rules: HashMap<String, ToolRule>,
    limiters: HashMap<String, RateLimiter>,
    consent: ConsentStore,
    now_fn: ClockFn,
}

impl PolicyGate {
    pub fn new(
        catalog: ToolCatalog,
        policy: GlobalPolicy,
        rules: HashMap<String, ToolRule>,
    ) -> Self {
        // Only tools with an RPM cap or cooldown get a limiter
        let limiters = rules
            .iter()
            .filter(|(_, r)| r.rpm_limit.is_some() || r.cooldown_sec > 0.0)
            .map(|(name, r)| {
                (
                    name.clone(),
                    RateLimiter::new(r.rpm_limit, r.cooldown_sec),
                )
            })
            .collect();

        PolicyGate {
            catalog,
            policy,
            rules,
            limiters,
            consent: ConsentStore::new(),
            now_fn: Arc::new(system_clock),
        }
    }

    /// Replace the clock; used by tests to freeze/advance time
    pub fn with_clock(mut self, now_fn: ClockFn) -> Self {
        self.now_fn = now_fn;
        self
    }

    pub fn policy(&self) -> &GlobalPolicy {
        &self.policy
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn rules(&self) -> &HashMap<String, ToolRule> {
        &self.rules
    }

    /// Record a consent grant; subsequent checks for that exact pair pass.
    pub fn grant_consent(&self, key: ConsentKey) {
        debug!(key = %key, "consent granted");
        self.consent.grant(key);
    }

    /// Run one policy check. Pure function of (policy, rules, consent state,
    /// limiter state, clock, args).
    pub fn check(&self, tool_name: &str, args: &Value) -> GateDecision {
        let mut decision = self.evaluate(tool_name, args);
        if decision.requires_consent || !decision.reason.is_empty() {
            return decision;
        }

        // Rate limiting, last so clamp warnings are already attached
        if let Some(limiter) = self.limiters.get(tool_name) {
            let (ok, retry) = limiter.allow(tool_name, (self.now_fn)());
            if !ok {
                decision.retry_after_sec = retry;
                decision.reason = "rate limited".to_string();
                debug!(tool = tool_name, retry_after_sec = retry, "rate limited");
                return decision;
            }
        }

        decision.allowed = true;
        decision.reason = "allowed by policy".to_string();
        decision
    }

    /// Probe whether a call would park on consent, without consuming a
    /// rate-limit slot.
    pub fn consent_requirement(&self, tool_name: &str, args: &Value) -> Option<GateDecision> {
        let decision = self.evaluate(tool_name, args);
        decision.requires_consent.then_some(decision)
    }

    /// Every step short of rate limiting, without consuming a limiter slot.
    /// A denial carries its reason; a fall-through leaves the reason empty.
    /// `check` is the authoritative verdict.
    pub fn evaluate(&self, tool_name: &str, args: &Value) -> GateDecision {
        let mut decision = self.base_decision(tool_name, args);

        // 1. Unknown tool
        if !self.catalog.contains(tool_name) {
            return deny(decision, format!("unknown tool: {}", tool_name));
        }

        // 2. Global allowlist / denylist
        if let Some(allow) = &self.policy.tool_allowlist {
            if !allow.iter().any(|t| t == tool_name) {
                return deny(decision, format!("tool not in allowlist: {}", tool_name));
            }
        }
        if let Some(denylist) = &self.policy.tool_denylist {
            if denylist.iter().any(|t| t == tool_name) {
                return deny(decision, format!("tool is denylisted: {}", tool_name));
            }
        }

        // 3. Disabled rule
        let fallback = ToolRule::permissive(tool_name);
        let rule = self.rules.get(tool_name).unwrap_or(&fallback);
        if !rule.enabled {
            return deny(decision, format!("tool disabled by policy: {}", tool_name));
        }

        let domains = extract_domains(args);

        // 4. Safety gate
        let tier_needs_consent = (rule.safety == SafetyLevel::Sensitive
            && self.policy.require_consent_for_sensitive)
            || (rule.safety == SafetyLevel::Admin && self.policy.require_consent_for_admin);

        if !self.policy.allow_safety_levels.contains(&rule.safety) || tier_needs_consent {
            let domain = domains.first().cloned();
            let already_granted =
                self.policy.remember_consent && self.consent.check(tool_name, domain.as_deref());
            if !already_granted {
                let key = ConsentKey::new(tool_name, domain.clone());
                let prompt = render_consent_prompt(
                    tool_name,
                    rule,
                    domain.as_deref(),
                    &format!("consent required for safety level: {}", rule.safety),
                );
                decision.reason = format!("consent required for safety level: {}", rule.safety);
                return require_consent(decision, key, prompt);
            }
        }

        // 5. Network policy
        if rule.network {
            if !self.policy.network_enabled {
                let already_granted =
                    self.policy.remember_consent && self.consent.check(tool_name, None);
                if !already_granted {
                    let key = ConsentKey::new(tool_name, None);
                    let prompt = render_consent_prompt(
                        tool_name,
                        rule,
                        None,
                        "network access disabled by policy",
                    );
                    decision.reason = "network access disabled by policy".to_string();
                    return require_consent(decision, key, prompt);
                }
            }
            for d in &domains {
                if let Some(blocked) = &rule.blocked_domains {
                    if wildcard::matches_any(d, blocked) {
                        return deny(decision, format!("domain blocked: {}", d));
                    }
                }
                if let Some(allowed) = &rule.allowed_domains {
                    if !wildcard::matches_any(d, allowed) {
                        return deny(decision, format!("domain not in tool allowlist: {}", d));
                    }
                }
                if let Some(denylist) = &self.policy.domain_denylist {
                    if wildcard::matches_any(d, denylist) {
                        return deny(decision, format!("domain blocked by policy: {}", d));
                    }
                }
                if let Some(allowlist) = &self.policy.domain_allowlist {
                    if !wildcard::matches_any(d, allowlist) {
                        let already_granted = self.policy.remember_consent
                            && self.consent.check(tool_name, Some(d));
                        if !already_granted {
                            let key = ConsentKey::new(tool_name, Some(d.clone()));
                            let prompt = render_consent_prompt(
                                tool_name,
                                rule,
                                Some(d),
                                "domain not in allowlist",
                            );
                            decision.reason = format!("domain {} not in allowlist", d);
                            return require_consent(decision, key, prompt);
                        }
                    }
                }
            }
        }

        // 6. Argument clamping
        let (patched, warnings) = self.clamp_args(tool_name, rule, args);
        decision.patched_args = patched;
        decision.warnings = warnings;
        decision
    }

    fn base_decision(&self, tool_name: &str, args: &Value) -> GateDecision {
        GateDecision {
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            tool_name: tool_name.to_string(),
            args: args.clone(),
            allowed: false,
            requires_consent: false,
            reason: String::new(),
            warnings: Vec::new(),
            patched_args: args.clone(),
            retry_after_sec: 0.0,
            consent_key: None,
            consent_prompt: None,
        }
    }

    /// Clamp `timeout_sec` (against both the per-tool limit and the global
    /// cap) and the known count/size arguments (per-tool limits only).
    /// Warnings are recorded whether or not clamping is enabled.
    fn clamp_args(&self, tool_name: &str, rule: &ToolRule, args: &Value) -> (Value, Vec<String>) {
        let mut patched = args.clone();
        let mut warnings = Vec::new();

        let Some(obj) = patched.as_object_mut() else {
            return (patched, warnings);
        };

        let mut clamp = |obj: &mut serde_json::Map<String, Value>, key: &str, hard_cap: Option<u64>| {
            let Some(v) = obj.get(key).and_then(Value::as_u64) else {
                return;
            };
            let mut cap = rule.arg_limits.get(key).copied().unwrap_or(v);
            if let Some(hard) = hard_cap {
                cap = cap.min(hard);
            }
            if v > cap {
                if self.policy.clamp_args {
                    obj.insert(key.to_string(), Value::from(cap));
                    warnings.push(format!("{}.{} clamped to {}", tool_name, key, cap));
                } else {
                    warnings.push(format!("{}.{} exceeds limit {}", tool_name, key, cap));
                }
            }
        };

        clamp(obj, "timeout_sec", Some(self.policy.max_timeout_sec));
        for key in CLAMPABLE_ARGS {
            clamp(obj, key, None);
        }

        (patched, warnings)
    }
}

fn deny(mut decision: GateDecision, reason: String) -> GateDecision {
    debug!(tool = %decision.tool_name, reason = %reason, "denied");
    decision.allowed = false;
    decision.reason = reason;
    decision
}

fn require_consent(mut decision: GateDecision, key: ConsentKey, prompt: String) -> GateDecision {
    decision.allowed = false;
    decision.requires_consent = true;
    decision.consent_key = Some(key);
    decision.consent_prompt = Some(prompt);
    decision
}

/// Extract hostnames from every HTTP(S) URL found in string and string-array
/// argument values, lowercased, in argument order.
fn extract_domains(args: &Value) -> Vec<String> {
    let mut domains = Vec::new();
    let mut push_url = |raw: &str| {
        if !raw.starts_with("http") {
            return;
        }
        if let Ok(url) = reqwest::Url::parse(raw) {
            if let Some(host) = url.host_str() {
                domains.push(host.to_lowercase());
            }
        }
    };

    if let Some(obj) = args.as_object() {
        for v in obj.values() {
            match v {
                Value::String(s) => push_url(s),
                Value::Array(items) => {
                    for item in items {
                        if let Value::String(s) = item {
                            push_url(s);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    domains
}

fn render_consent_prompt(
    tool_name: &str,
    rule: &ToolRule,
    domain: Option<&str>,
    reason: &str,
) -> String {
    let mut prompt = format!(
        "The agent wants to run the tool `{}` which is classified as **{}**.",
        tool_name, rule.safety
    );
    if rule.network {
        prompt.push_str(&format!(
            " It may access the network domain: **{}**.",
            domain.unwrap_or("*")
        ));
    }
    prompt.push_str(&format!("\nReason: {}.", reason));
    prompt
}
