//! Reconcile throttle
//!
//! Remembers when each composition was last published so poll-driven
//! reconciles only rebuild once the poll interval has passed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct ReconcileThrottle {
    last_publish: Mutex<HashMap<String, Instant>>,
}

impl ReconcileThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a publish was recorded for `key` no longer than `poll_interval` ago
    pub fn is_fresh(&self, key: &str, poll_interval: Duration) -> bool {
        self.is_fresh_at(key, poll_interval, Instant::now())
    }

    pub fn is_fresh_at(&self, key: &str, poll_interval: Duration, now: Instant) -> bool {
        let last_publish = self.lock();
        match last_publish.get(key) {
            Some(last) => now.saturating_duration_since(*last) <= poll_interval,
            None => false,
        }
    }

    /// Record a successful publish for `key`
    pub fn mark_fresh(&self, key: &str, now: Instant) {
        self.lock().insert(key.to_string(), now);
    }

    /// Drop the record for `key`, returning whether one existed
    pub fn forget(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.last_publish
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_is_never_fresh() {
        let throttle = ReconcileThrottle::new();
        assert!(!throttle.is_fresh("ns/name", Duration::from_secs(3600)));
    }

    #[test]
    fn test_fresh_within_interval() {
        let throttle = ReconcileThrottle::new();
        let start = Instant::now();
        throttle.mark_fresh("ns/name", start);

        let interval = Duration::from_secs(60);
        assert!(throttle.is_fresh_at("ns/name", interval, start));
        assert!(throttle.is_fresh_at("ns/name", interval, start + interval));
        assert!(!throttle.is_fresh_at(
            "ns/name",
            interval,
            start + interval + Duration::from_millis(1)
        ));
    }

    #[test]
    fn test_keys_are_independent() {
        let throttle = ReconcileThrottle::new();
        throttle.mark_fresh("a/one", Instant::now());
        assert!(throttle.is_fresh("a/one", Duration::from_secs(60)));
        assert!(!throttle.is_fresh("a/two", Duration::from_secs(60)));
    }

    #[test]
    fn test_forget() {
        let throttle = ReconcileThrottle::new();
        throttle.mark_fresh("a/one", Instant::now());
        assert_eq!(throttle.len(), 1);
        assert!(throttle.forget("a/one"));
        assert!(!throttle.forget("a/one"));
        assert!(throttle.is_empty());
        assert!(!throttle.is_fresh("a/one", Duration::from_secs(60)));
    }
}
