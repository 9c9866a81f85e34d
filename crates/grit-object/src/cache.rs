//! Byte-budget LRU cache for decoded objects.
//!
//! The cache is bounded by the total byte size of the objects it holds, not
//! by entry count. Eviction is least-recently-used; a `get` refreshes
//! recency. Inserting a value larger than the whole budget clears the cache
//! and drops the value. Re-inserting an existing key is an update: the
//! accounted total is adjusted by the size difference.

use grit_hash::ObjectId;
use lru::LruCache;

/// Default capacity: 96 MiB of decoded objects.
pub const DEFAULT_CACHE_BYTES: usize = 96 * 1024 * 1024;

/// LRU cache of decoded objects, bounded in bytes.
pub struct ObjectCache<V> {
    cache: LruCache<ObjectId, (V, usize)>,
    capacity: usize,
    used: usize,
}

impl<V> ObjectCache<V> {
    /// Create with the given capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::unbounded(),
            capacity,
            used: 0,
        }
    }

    /// Create with the default 96 MiB budget.
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CACHE_BYTES)
    }

    /// Get a cached value, refreshing its recency.
    pub fn get(&mut self, oid: &ObjectId) -> Option<&V> {
        self.cache.get(oid).map(|(v, _)| v)
    }

    /// Insert or update a value accounted at `size` bytes.
    pub fn put(&mut self, oid: ObjectId, value: V, size: usize) {
        if size > self.capacity {
            self.clear();
            return;
        }

        if let Some((_, old_size)) = self.cache.pop(&oid) {
            self.used -= old_size;
        }

        while self.used + size > self.capacity {
            match self.cache.pop_lru() {
                Some((_, (_, evicted_size))) => self.used -= evicted_size,
                None => break,
            }
        }

        self.used += size;
        self.cache.put(oid, (value, size));
    }

    /// Is the OID present? Does not refresh recency.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.cache.contains(oid)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.used = 0;
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Accounted bytes currently held.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// The byte budget.
    pub fn capacity_bytes(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[0] = n;
        ObjectId::from(bytes)
    }

    #[test]
    fn put_and_get() {
        let mut cache = ObjectCache::new(100);
        cache.put(oid(1), "a", 10);
        assert_eq!(cache.get(&oid(1)), Some(&"a"));
        assert_eq!(cache.used_bytes(), 10);
    }

    #[test]
    fn miss_returns_none() {
        let mut cache: ObjectCache<&str> = ObjectCache::new(100);
        assert_eq!(cache.get(&oid(1)), None);
    }

    #[test]
    fn eviction_is_by_bytes_not_count() {
        let mut cache = ObjectCache::new(100);
        cache.put(oid(1), "a", 40);
        cache.put(oid(2), "b", 40);
        // 40 + 40 + 40 > 100: the least-recent entry goes.
        cache.put(oid(3), "c", 40);
        assert!(cache.get(&oid(1)).is_none());
        assert!(cache.get(&oid(2)).is_some());
        assert!(cache.get(&oid(3)).is_some());
        assert!(cache.used_bytes() <= 100);
    }

    #[test]
    fn get_refreshes_recency() {
        let mut cache = ObjectCache::new(100);
        cache.put(oid(1), "a", 40);
        cache.put(oid(2), "b", 40);
        cache.get(&oid(1));
        cache.put(oid(3), "c", 40);
        // oid(2) was least-recent after the get of oid(1).
        assert!(cache.get(&oid(1)).is_some());
        assert!(cache.get(&oid(2)).is_none());
    }

    #[test]
    fn oversized_insert_clears_and_drops() {
        let mut cache = ObjectCache::new(100);
        cache.put(oid(1), "a", 40);
        cache.put(oid(2), "whale", 101);
        assert!(cache.is_empty());
        assert_eq!(cache.used_bytes(), 0);
        assert!(cache.get(&oid(2)).is_none());
    }

    #[test]
    fn reinsert_adjusts_accounting() {
        let mut cache = ObjectCache::new(100);
        cache.put(oid(1), "a", 40);
        cache.put(oid(1), "a2", 10);
        // Accounting matches a world where oid(1) was always 10 bytes.
        assert_eq!(cache.used_bytes(), 10);
        cache.put(oid(1), "a3", 60);
        assert_eq!(cache.used_bytes(), 60);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn used_never_exceeds_capacity() {
        let mut cache = ObjectCache::new(64);
        for i in 0..64u8 {
            cache.put(oid(i), i, (i as usize % 17) + 1);
            assert!(cache.used_bytes() <= 64);
        }
    }

    #[test]
    fn exact_fit_keeps_both() {
        let mut cache = ObjectCache::new(80);
        cache.put(oid(1), "a", 40);
        cache.put(oid(2), "b", 40);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.used_bytes(), 80);
    }
}
