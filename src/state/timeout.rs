//! Generic keyed expiry tracker.
//!
//! Used to answer "did I already tell this sender about that away message
//! recently" style questions: a key is remembered for a TTL, and re-checking
//! it within the window reports it as already seen.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Keyed expiry table.
#[derive(Debug)]
pub struct TimeoutTable<K> {
    entries: Mutex<HashMap<K, Instant>>,
}

impl<K: Eq + Hash + Clone> TimeoutTable<K> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Remember a key for `ttl`.
    ///
    /// Returns true when the key was not present (or had expired), meaning
    /// the caller should act, and false when it is still within its window.
    pub fn remember(&self, key: K, ttl: Duration) -> bool {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get(&key) {
            Some(expiry) if *expiry > now => false,
            _ => {
                entries.insert(key, now + ttl);
                true
            }
        }
    }

    /// Drop a key before its window ends.
    pub fn forget(&self, key: &K) {
        self.entries.lock().remove(key);
    }

    /// Remove expired entries. Called from the periodic sweep to bound
    /// memory.
    pub fn purge(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, expiry| *expiry > now);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for TimeoutTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_remember_fires_repeat_does_not() {
        let table = TimeoutTable::new();
        assert!(table.remember("key", Duration::from_secs(60)));
        assert!(!table.remember("key", Duration::from_secs(60)));
    }

    #[test]
    fn test_expired_key_fires_again() {
        let table = TimeoutTable::new();
        assert!(table.remember("key", Duration::ZERO));
        // TTL of zero expires immediately.
        assert!(table.remember("key", Duration::from_secs(60)));
    }

    #[test]
    fn test_forget_clears_window() {
        let table = TimeoutTable::new();
        table.remember("key", Duration::from_secs(60));
        table.forget(&"key");
        assert!(table.remember("key", Duration::from_secs(60)));
    }

    #[test]
    fn test_purge_drops_expired_only() {
        let table = TimeoutTable::new();
        table.remember("old", Duration::ZERO);
        table.remember("fresh", Duration::from_secs(60));
        table.purge();
        assert_eq!(table.len(), 1);
    }
}
