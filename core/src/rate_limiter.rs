//! Per-tool rate limiting
//!
//! A sliding 60-second request window plus an independent cooldown timer,
//! keyed per tool. Window entries are pruned lazily on each check. Tools with
//! neither an RPM cap nor a cooldown get no limiter at all.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Length of the sliding window in seconds
const WINDOW_SEC: f64 = 60.0;

#[derive(Debug, Default)]
struct KeyState {
    /// Call timestamps within the trailing window
    history: Vec<f64>,
    /// Last successful call, for cooldown; `None` before the first call
    last_time: Option<f64>,
}

/// Sliding-window + cooldown admission control
#[derive(Debug)]
pub struct RateLimiter {
    rpm: Option<u32>,
    cooldown_sec: f64,
    state: Mutex<HashMap<String, KeyState>>,
}

impl RateLimiter {
    pub fn new(rpm: Option<u32>, cooldown_sec: f64) -> Self {
        RateLimiter {
            rpm,
            cooldown_sec,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Whether this limiter imposes any constraint at all
    pub fn is_bounded(&self) -> bool {
        self.rpm.is_some() || self.cooldown_sec > 0.0
    }

    /// Check admission for `key` at time `now` (seconds).
    ///
    /// Returns `(true, 0.0)` and records the call on success, or
    /// `(false, retry_after_sec)` when the cooldown is still active or the
    /// window is at capacity.
    pub fn allow(&self, key: &str, now: f64) -> (bool, f64) {
        if !self.is_bounded() {
            return (true, 0.0);
        }

        let mut state = self.state.lock();
        let entry = state.entry(key.to_string()).or_default();

        // Prune entries older than the window
        let cut = now - WINDOW_SEC;
        entry.history.retain(|&t| t >= cut);

        // Cooldown first
        if let Some(last) = entry.last_time {
            if self.cooldown_sec > 0.0 && (now - last) < self.cooldown_sec {
                let retry = self.cooldown_sec - (now - last);
                return (false, retry.max(0.0));
            }
        }

        // Then the RPM cap; retry when the oldest call expires from the window
        if let Some(rpm) = self.rpm {
            if entry.history.len() >= rpm as usize {
                let retry = WINDOW_SEC - (now - entry.history[0]);
                return (false, retry.max(0.0));
            }
        }

        entry.history.push(now);
        entry.last_time = Some(now);
        (true, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_limiter_always_allows() {
        let limiter = RateLimiter::new(None, 0.0);
        assert!(!limiter.is_bounded());
        for i in 0..100 {
            let (ok, retry) = limiter.allow("t", i as f64 * 0.01);
            assert!(ok);
            assert_eq!(retry, 0.0);
        }
    }

    #[test]
    fn test_rpm_window() {
        let limiter = RateLimiter::new(Some(3), 0.0);
        assert!(limiter.allow("t", 0.0).0);
        assert!(limiter.allow("t", 1.0).0);
        assert!(limiter.allow("t", 2.0).0);

        let (ok, retry) = limiter.allow("t", 3.0);
        assert!(!ok);
        assert!(retry > 0.0);
        // Oldest call at t=0 expires at t=60
        assert!((retry - 57.0).abs() < 1e-9);

        // After the window slides past the oldest entries, calls succeed again
        let (ok, _) = limiter.allow("t", 61.5);
        assert!(ok);
    }

    #[test]
    fn test_cooldown() {
        let limiter = RateLimiter::new(None, 5.0);
        assert!(limiter.allow("t", 10.0).0);

        let (ok, retry) = limiter.allow("t", 11.0);
        assert!(!ok);
        assert!((retry - 4.0).abs() < 1e-9);

        assert!(limiter.allow("t", 15.0).0);
    }

    #[test]
    fn test_first_call_at_time_zero_passes_cooldown() {
        let limiter = RateLimiter::new(None, 5.0);
        assert!(limiter.allow("t", 0.0).0);
    }

    #[test]
    fn test_cooldown_checked_before_rpm() {
        let limiter = RateLimiter::new(Some(10), 5.0);
        assert!(limiter.allow("t", 0.0).0);
        // Window has room, but the cooldown rejects first
        let (ok, retry) = limiter.allow("t", 1.0);
        assert!(!ok);
        assert!((retry - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(Some(1), 0.0);
        assert!(limiter.allow("a", 0.0).0);
        assert!(limiter.allow("b", 0.0).0);
        assert!(!limiter.allow("a", 1.0).0);
    }
}
