//! Consent keys and the per-session consent store
//!
//! A `ConsentKey` identifies one (tool, domain) pair, domain `None` meaning
//! "any". The wire form is the JSON encoding of the struct itself so the key
//! the gate emits round-trips exactly through `grant_consent`. Grants are
//! monotonic: only added, never revoked within a session.

use crate::error::{Result, SwarmError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A (tool, domain) consent pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsentKey {
    pub tool: String,
    #[serde(default)]
    pub domain: Option<String>,
}

impl ConsentKey {
    pub fn new(tool: impl Into<String>, domain: Option<String>) -> Self {
        ConsentKey {
            tool: tool.into(),
            domain: domain.map(|d| d.to_lowercase()),
        }
    }

    /// Canonical wire encoding (stable field order via the struct itself)
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a wire-format key produced by [`ConsentKey::encode`]
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| SwarmError::InvalidConsentKey {
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Display for ConsentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.domain {
            Some(d) => write!(f, "{}@{}", self.tool, d),
            None => write!(f, "{}@*", self.tool),
        }
    }
}

/// Remembered consent grants for one session
#[derive(Debug, Default)]
pub struct ConsentStore {
    granted: Mutex<HashSet<ConsentKey>>,
}

impl ConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a grant. Idempotent.
    pub fn grant(&self, key: ConsentKey) {
        self.granted.lock().insert(key);
    }

    /// Check whether this exact (tool, domain) pair was granted.
    /// A wildcard grant (domain None) also covers any domain for that tool.
    pub fn check(&self, tool: &str, domain: Option<&str>) -> bool {
        let granted = self.granted.lock();
        if granted.contains(&ConsentKey::new(tool, domain.map(|d| d.to_string()))) {
            return true;
        }
        domain.is_some() && granted.contains(&ConsentKey::new(tool, None))
    }

    pub fn len(&self) -> usize {
        self.granted.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.granted.lock().is_empty()
    }
}
