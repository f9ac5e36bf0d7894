//! Default rule derivation from the tool catalog
//!
//! Heuristics: network-flavored names get a network flag and a default RPM
//! cap, destructive-sounding names are classified `admin`, sandbox-backed
//! tools default to `sensitive` with a moderate RPM cap.

use super::{SafetyLevel, ToolRule};
use crate::catalog::ToolCatalog;
use std::collections::HashMap;

const NETWORK_PREFIXES: &[&str] = &["http_", "fetch_", "crawl_"];
const DESTRUCTIVE_MARKERS: &[&str] = &["delete", "remove", "move_", "drop_"];

fn is_network_tool(name: &str) -> bool {
    name == "search_web" || NETWORK_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn is_destructive(name: &str) -> bool {
    DESTRUCTIVE_MARKERS.iter().any(|m| name.contains(m))
}

/// Derive the per-tool rule table from the catalog.
pub fn default_rules_for_catalog(catalog: &ToolCatalog) -> HashMap<String, ToolRule> {
    let mut rules = HashMap::new();

    for spec in catalog.specs() {
        let name = spec.name.as_str();
        let mut rule = ToolRule::permissive(name);

        if is_network_tool(name) {
            rule.network = true;
            rule.rpm_limit = Some(60);
            rule.arg_limits.insert("timeout_sec".to_string(), 30);
            rule.arg_limits.insert("max_results".to_string(), 25);
        }

        if spec.sandboxed {
            rule.safety = SafetyLevel::Sensitive;
            rule.rpm_limit = Some(rule.rpm_limit.unwrap_or(30).min(30));
            rule.arg_limits.insert("timeout_sec".to_string(), 120);
        }

        if is_destructive(name) {
            rule.safety = SafetyLevel::Admin;
        }

        rules.insert(name.to_string(), rule);
    }

    rules
}
