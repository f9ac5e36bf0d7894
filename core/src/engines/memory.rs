//! Keyword-overlap memory index
//!
//! A deliberately naive store for committed facts: queries rank entries by
//! the fraction of query keywords they share, descending. Words of three
//! characters or fewer are ignored.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A committed fact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub timestamp: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    id: String,
    timestamp: String,
    text: String,
    keywords: HashSet<String>,
}

/// Per-session fact store
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: Mutex<Vec<StoredEntry>>,
}

fn extract_keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(|w| w.to_string())
        .collect()
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a fact; returns its (id, timestamp).
    pub fn commit(&self, text: &str) -> (String, String) {
        let id = format!("mem-{}", Uuid::new_v4());
        let timestamp = chrono::Utc::now().to_rfc3339();
        self.entries.lock().push(StoredEntry {
            id: id.clone(),
            timestamp: timestamp.clone(),
            text: text.to_string(),
            keywords: extract_keywords(text),
        });
        (id, timestamp)
    }

    /// Rank entries by keyword overlap with the query, descending.
    pub fn query(&self, query: &str, max_results: usize) -> Vec<MemoryEntry> {
        let query_keywords = extract_keywords(query);
        if query_keywords.is_empty() {
            return Vec::new();
        }

        let entries = self.entries.lock();
        let mut scored: Vec<MemoryEntry> = entries
            .iter()
            .filter_map(|e| {
                let matching = e.keywords.intersection(&query_keywords).count();
                if matching == 0 {
                    return None;
                }
                Some(MemoryEntry {
                    id: e.id.clone(),
                    timestamp: e.timestamp.clone(),
                    text: e.text.clone(),
                    score: Some(matching as f64 / query_keywords.len() as f64),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(max_results);
        scored
    }

    /// All committed facts, newest first.
    pub fn entries(&self) -> Vec<MemoryEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .map(|e| MemoryEntry {
                id: e.id.clone(),
                timestamp: e.timestamp.clone(),
                text: e.text.clone(),
                score: None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
