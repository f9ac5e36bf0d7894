//! Bounded, TTL'd cache of tool outputs
//!
//! Keys are a stable serialization of (tool name, args) with object keys
//! sorted recursively, so argument ordering never causes a spurious miss.
//! Eviction at capacity is insertion-order (oldest inserted first), not true
//! LRU; `get` refreshes an entry's position, which approximates LRU well
//! enough for this cache's size. Error payloads are cached under a separate,
//! shorter TTL so a persistently failing call doesn't hot-loop but transient
//! failures are not suppressed for the full value TTL.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Instant;

/// Cache observability counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// Result of a [`ResultCache::cached_call`]
#[derive(Debug, Clone)]
pub struct CachedOutcome {
    pub value: Value,
    pub from_cache: bool,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    inserted_at: Instant,
    value: Value,
    is_error: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    // Vec keeps insertion order for eviction; linear scans are fine at this
    // capacity (default 256).
    entries: Vec<(String, CacheEntry)>,
    stats: CacheStats,
}

/// Per-session result cache
#[derive(Debug)]
pub struct ResultCache {
    max_entries: usize,
    ttl_sec: u64,
    error_ttl_sec: u64,
    state: Mutex<CacheState>,
}

impl Default for ResultCache {
    fn default() -> Self {
        ResultCache::new(256, 3600, 60)
    }
}

impl ResultCache {
    pub fn new(max_entries: usize, ttl_sec: u64, error_ttl_sec: u64) -> Self {
        ResultCache {
            max_entries,
            ttl_sec,
            error_ttl_sec,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Stable cache key: object keys sorted recursively before stringifying.
    pub fn make_key(name: &str, args: &Value) -> String {
        format!("{{\"args\":{},\"name\":{}}}", stable_json(args), stable_json(&Value::from(name)))
    }

    /// Fetch a cached value; stale entries are evicted and report a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.state.lock();
        let Some(pos) = state.entries.iter().position(|(k, _)| k == key) else {
            state.stats.misses += 1;
            return None;
        };

        let (_, entry) = &state.entries[pos];
        let ttl = if entry.is_error { self.error_ttl_sec } else { self.ttl_sec };
        if entry.inserted_at.elapsed().as_secs() >= ttl {
            state.entries.remove(pos);
            state.stats.misses += 1;
            state.stats.entries = state.entries.len();
            return None;
        }

        // Refresh recency
        let item = state.entries.remove(pos);
        let value = item.1.value.clone();
        state.entries.push(item);
        state.stats.hits += 1;
        Some(value)
    }

    /// Insert a value, evicting the oldest-inserted entries past capacity.
    pub fn set(&self, key: &str, value: Value) {
        self.insert(key, value, false);
    }

    fn insert(&self, key: &str, value: Value, is_error: bool) {
        let mut state = self.state.lock();
        if let Some(pos) = state.entries.iter().position(|(k, _)| k == key) {
            state.entries.remove(pos);
        }
        state.entries.push((
            key.to_string(),
            CacheEntry {
                inserted_at: Instant::now(),
                value,
                is_error,
            },
        ));
        state.stats.sets += 1;
        while state.entries.len() > self.max_entries {
            state.entries.remove(0);
            state.stats.evictions += 1;
        }
        state.stats.entries = state.entries.len();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.entries = state.entries.len();
        stats
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.stats = CacheStats::default();
    }

    /// Wrap an asynchronous producer: hits skip the producer entirely;
    /// misses run it and cache the result. Producer errors are cached too
    /// (under the error TTL) so a persistently failing call is not retried
    /// on every turn.
    pub async fn cached_call<F, Fut>(&self, name: &str, args: &Value, producer: F) -> CachedOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        let key = Self::make_key(name, args);
        if let Some(value) = self.get(&key) {
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .map(|e| e.to_string());
            return CachedOutcome {
                ok: error.is_none(),
                from_cache: true,
                value,
                error,
            };
        }

        match producer().await {
            Ok(value) => {
                self.set(&key, value.clone());
                CachedOutcome {
                    value,
                    from_cache: false,
                    ok: true,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                let payload = serde_json::json!({ "error": message });
                self.insert(&key, payload.clone(), true);
                CachedOutcome {
                    value: payload,
                    from_cache: false,
                    ok: false,
                    error: Some(message),
                }
            }
        }
    }
}

/// Serialize with object keys sorted recursively.
fn stable_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, String> =
                map.iter().map(|(k, v)| (k, stable_json(v))).collect();
            let pairs: Vec<String> = sorted
                .iter()
                .map(|(k, v)| format!("{}:{}", Value::from(k.as_str()), v))
                .collect();
            format!("{{{}}}", pairs.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(stable_json).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_key_is_stable_under_reordering() {
        let a = json!({ "x": 1, "y": { "b": 2, "a": 3 } });
        let b = json!({ "y": { "a": 3, "b": 2 }, "x": 1 });
        assert_eq!(ResultCache::make_key("t", &a), ResultCache::make_key("t", &b));
        assert_ne!(
            ResultCache::make_key("t", &a),
            ResultCache::make_key("u", &a)
        );
    }

    #[test]
    fn test_set_get_and_stats() {
        let cache = ResultCache::default();
        let key = ResultCache::make_key("t", &json!({"a": 1}));
        assert!(cache.get(&key).is_none());
        cache.set(&key, json!({"ok": true}));
        assert_eq!(cache.get(&key), Some(json!({"ok": true})));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_capacity_eviction_is_oldest_first() {
        let cache = ResultCache::new(2, 3600, 60);
        cache.set("k1", json!(1));
        cache.set("k2", json!(2));
        cache.set("k3", json!(3));

        assert!(cache.get("k1").is_none());
        assert_eq!(cache.get("k2"), Some(json!(2)));
        assert_eq!(cache.get("k3"), Some(json!(3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_zero_ttl_treats_entries_as_stale() {
        let cache = ResultCache::new(16, 0, 0);
        cache.set("k", json!(1));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_cached_call_runs_producer_once() {
        let cache = ResultCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let args = json!({"a": 1});

        for expected_from_cache in [false, true] {
            let calls = Arc::clone(&calls);
            let outcome = cache
                .cached_call("t", &args, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"n": 42}))
                })
                .await;
            assert!(outcome.ok);
            assert_eq!(outcome.from_cache, expected_from_cache);
            assert_eq!(outcome.value, json!({"n": 42}));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_call_caches_errors() {
        let cache = ResultCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let args = json!({"a": 1});

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let outcome = cache
                .cached_call("t", &args, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("boom")
                })
                .await;
            assert!(!outcome.ok);
            assert_eq!(outcome.error.as_deref(), Some("boom"));
            assert_eq!(outcome.value, json!({"error": "boom"}));
        }
        // The second call was served from the error entry
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_entries_expire_independently() {
        // error_ttl 0: the error entry is stale immediately, so the producer
        // runs again on the next call
        let cache = ResultCache::new(16, 3600, 0);
        let calls = Arc::new(AtomicU32::new(0));
        let args = json!({});

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let outcome = cache
                .cached_call("t", &args, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("transient")
                })
                .await;
            assert!(!outcome.from_cache);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
