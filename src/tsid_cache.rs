//! TSID Cache (spec §4.2).
//!
//! A bounded LRU from canonical series fingerprint to `tsid`, guarded by a
//! single mutex — the critical section is a byte-slice compare plus a map
//! operation, never SQL. Grounded on `original_source/store/batch/lru_cache.go`
//! (`sync.Mutex` + `simplelru.LRU`).

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

/// ≥100k entries per spec §4.2.
pub const DEFAULT_CAPACITY: usize = 131_072;

pub struct TsidCache {
    inner: Mutex<LruCache<Vec<u8>, i64>>,
}

impl TsidCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity > 0");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    #[must_use]
    pub fn get(&self, fingerprint: &[u8]) -> Option<i64> {
        self.inner
            .lock()
            .expect("tsid cache mutex poisoned")
            .get(fingerprint)
            .copied()
    }

    pub fn put(&self, fingerprint: Vec<u8>, tsid: i64) {
        self.inner
            .lock()
            .expect("tsid cache mutex poisoned")
            .put(fingerprint, tsid);
    }
}

impl Default for TsidCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_fingerprint() {
        let cache = TsidCache::with_capacity(4);
        assert!(cache.get(b"metric$a$b").is_none());
        cache.put(b"metric$a$b".to_vec(), 42);
        assert_eq!(cache.get(b"metric$a$b"), Some(42));
    }

    #[test]
    fn evicts_least_recently_used_past_capacity() {
        let cache = TsidCache::with_capacity(2);
        cache.put(b"a".to_vec(), 1);
        cache.put(b"b".to_vec(), 2);
        cache.put(b"c".to_vec(), 3);
        assert!(cache.get(b"a").is_none());
        assert_eq!(cache.get(b"b"), Some(2));
        assert_eq!(cache.get(b"c"), Some(3));
    }
}
