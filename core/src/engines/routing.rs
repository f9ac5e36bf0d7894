//! Advisory routing heuristics
//!
//! Maps raw user text to candidate tool proposals for display purposes only.
//! This engine is never consulted by the policy gate; it must not influence
//! an allow/deny decision.

use crate::catalog::ToolCatalog;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

lazy_static! {
    static ref URL_RE: Regex = Regex::new(r"(?i)https?://[^\s)>\]]+").expect("valid url regex");
}

/// One advisory tool proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteProposal {
    pub tool: String,
    pub args: serde_json::Value,
    /// In [0, 1]
    pub confidence: f64,
    pub reason: String,
}

/// Stateless text-to-tool router
#[derive(Debug)]
pub struct RoutingEngine {
    has_fetch: bool,
    has_search: bool,
}

impl RoutingEngine {
    pub fn new(catalog: &ToolCatalog) -> Self {
        RoutingEngine {
            has_fetch: catalog.contains("fetch_url"),
            has_search: catalog.contains("search_web"),
        }
    }

    /// Propose tool calls for a raw user message, best first.
    pub fn route(&self, message: &str) -> Vec<RouteProposal> {
        let msg = message.trim();
        let mut proposals = Vec::new();

        if self.has_fetch {
            for url in URL_RE.find_iter(msg) {
                proposals.push(RouteProposal {
                    tool: "fetch_url".to_string(),
                    args: json!({ "url": url.as_str() }),
                    confidence: 0.85,
                    reason: "found URL; fetch content".to_string(),
                });
            }
        }

        if proposals.is_empty() && self.has_search && !msg.is_empty() {
            proposals.push(RouteProposal {
                tool: "search_web".to_string(),
                args: json!({ "query": msg }),
                confidence: 0.45,
                reason: "fallback web search".to_string(),
            });
        }

        proposals.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        proposals
    }
}
