//! Bounded LRU cache (C3).
//!
//! Grounded on the teacher's `enterprise::cache::tier::LruCache`, but that type's
//! access-order `Vec<K>` makes every touch O(n); we use the `lru` crate instead
//! (already in the teacher's own dependency table, "Additional utilities: lru =
//! 0.12") to get the O(1) amortized eviction the spec requires, wrapped in
//! `parking_lot::Mutex` since C3 is accessed from synchronous detector/transform
//! code rather than the teacher's async tier cache.

use std::hash::Hash;

use lru::LruCache as RawLru;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// A synchronous, capacity-bounded LRU cache.
///
/// Used for two independent instances in the engine: a transform-result cache
/// (`(op_id, pending_id) -> ElementOperation`) and a per-user recent-operation
/// cache (`user_id -> VecDeque<OperationId>`), both capacity-bounded per spec §4.3.
pub struct BoundedCache<K, V> {
    inner: Mutex<RawLru<K, V>>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// Build a cache holding at most `capacity` entries. `capacity` of 0 is
    /// coerced to 1, since `lru::LruCache` requires a nonzero bound.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(RawLru::new(capacity)),
        }
    }

    /// Look up `key`, promoting it to most-recently-used on hit.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    /// Insert or overwrite `key`, evicting the least-recently-used entry if the
    /// cache is at capacity.
    pub fn put(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    /// Remove `key`, returning its value if present.
    pub fn pop(&self, key: &K) -> Option<V> {
        self.inner.lock().pop(key)
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, for housekeeper-driven hard resets.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
