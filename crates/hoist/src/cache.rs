use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A time-bounded cache owned by the client session.
///
/// Keys must include whatever configuration affects the cached value's
/// correctness; the account cache keys by the active token, so switching
/// credentials naturally misses instead of serving a stale identity.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: K, value: V) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, (Instant::now(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entries_hit() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.put("token-a".to_string(), 1);
        assert_eq!(cache.get(&"token-a".to_string()), Some(1));
        assert_eq!(cache.get(&"token-b".to_string()), None);
    }

    #[test]
    fn expired_entries_miss_and_are_evicted() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.put("token-a".to_string(), 1);
        assert_eq!(cache.get(&"token-a".to_string()), None);
        assert_eq!(cache.get(&"token-a".to_string()), None);
    }

    #[test]
    fn different_keys_are_independent() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.put("old-token".to_string(), "petra");
        cache.put("new-token".to_string(), "quinn");
        assert_eq!(cache.get(&"old-token".to_string()), Some("petra"));
        assert_eq!(cache.get(&"new-token".to_string()), Some("quinn"));
    }
}
