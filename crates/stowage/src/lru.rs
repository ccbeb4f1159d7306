// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt, hash::Hash, num::NonZeroUsize};

use parking_lot::Mutex;
use stowage_spi::{Cache, CacheId, ReadWriteLock};

use crate::DEFAULT_CAPACITY;

/// Bounds a cache by evicting the least recently used key.
///
/// Recency is tracked here, in a key-only list, and updated on every `put` and every `get`,
/// hit or miss. When a `put` of a new key would exceed the capacity, the eldest key is
/// removed from the inner cache.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use stowage::{Cache, CacheId, LruCache, PerpetualCache};
///
/// let inner = PerpetualCache::new(CacheId::new("lru")?);
/// let cache = LruCache::with_capacity(inner, NonZeroUsize::new(2).unwrap());
///
/// cache.put("a", 1);
/// cache.put("b", 2);
/// cache.get(&"a");
/// cache.put("c", 3);
///
/// assert_eq!(cache.get(&"b"), None);
/// assert_eq!(cache.get(&"a"), Some(1));
/// # Ok::<(), stowage::InvalidCacheId>(())
/// ```
pub struct LruCache<K, C> {
    inner: C,
    keys: Mutex<lru::LruCache<K, ()>>,
}

impl<K, C> fmt::Debug for LruCache<K, C>
where
    K: Eq + Hash,
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.keys.lock();
        f.debug_struct("LruCache")
            .field("inner", &self.inner)
            .field("capacity", &keys.cap())
            .field("tracked", &keys.len())
            .finish()
    }
}

impl<K, C> LruCache<K, C>
where
    K: Eq + Hash,
{
    /// Wraps `inner` with the default capacity of 1024 keys.
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self::with_capacity(inner, NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }

    /// Wraps `inner`, keeping at most `capacity` keys.
    #[must_use]
    pub fn with_capacity(inner: C, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            keys: Mutex::new(lru::LruCache::new(capacity)),
        }
    }

    /// Returns the maximum number of keys kept.
    #[must_use]
    pub fn capacity(&self) -> NonZeroUsize {
        self.keys.lock().cap()
    }

    /// Returns a reference to the wrapped cache.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Changes the capacity, evicting the eldest keys if the cache is now over it.
    pub fn set_capacity<V>(&self, capacity: NonZeroUsize)
    where
        C: Cache<K, V>,
    {
        let mut keys = self.keys.lock();
        while keys.len() > capacity.get() {
            if let Some((key, ())) = keys.pop_lru() {
                self.inner.remove(&key);
            }
        }
        keys.resize(capacity);
    }
}

impl<K, V, C> Cache<K, V> for LruCache<K, C>
where
    K: Clone + Eq + Hash + Send,
    C: Cache<K, V>,
{
    fn id(&self) -> &CacheId {
        self.inner.id()
    }

    fn put(&self, key: K, value: V) {
        // The key list stays locked until the inner cache agrees with it.
        let mut keys = self.keys.lock();
        let eldest = keys
            .push(key.clone(), ())
            .and_then(|(previous, ())| (previous != key).then_some(previous));

        self.inner.put(key, value);

        if let Some(eldest) = eldest {
            tracing::trace!(cache.id = %self.inner.id(), "evicting least recently used entry");
            self.inner.remove(&eldest);
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.keys.lock().promote(key);
        self.inner.get(key)
    }

    fn remove(&self, key: &K) -> Option<V> {
        let mut keys = self.keys.lock();
        keys.pop(key);
        self.inner.remove(key)
    }

    fn clear(&self) {
        let mut keys = self.keys.lock();
        keys.clear();
        self.inner.clear();
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn lock(&self) -> Option<&ReadWriteLock> {
        self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use stowage_spi::testing::{CacheOp, MockCache};

    use super::*;

    fn lru(capacity: usize) -> (LruCache<u32, MockCache<u32, u32>>, MockCache<u32, u32>) {
        let mock = MockCache::new("lru");
        let cache = LruCache::with_capacity(mock.clone(), NonZeroUsize::new(capacity).unwrap());
        (cache, mock)
    }

    #[test]
    fn evicts_least_recently_used() {
        let (cache, mock) = lru(2);
        cache.put(1, 10);
        cache.put(2, 20);
        cache.put(3, 30);

        assert!(!mock.contains_key(&1));
        assert!(mock.contains_key(&2));
        assert!(mock.contains_key(&3));
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn get_refreshes_recency_even_on_miss() {
        let (cache, mock) = lru(2);
        cache.put(1, 10);
        cache.put(2, 20);
        mock.remove(&1);

        // 1 is no longer stored but is still tracked and gets promoted.
        assert_eq!(cache.get(&1), None);
        cache.put(3, 30);

        assert!(!mock.contains_key(&2));
        assert!(mock.contains_key(&3));
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let (cache, mock) = lru(2);
        cache.put(1, 10);
        cache.put(2, 20);
        mock.clear_operations();

        cache.put(2, 21);

        assert_eq!(mock.operations(), vec![CacheOp::Put { key: 2, value: 21 }]);
        assert_eq!(mock.entry_count(), 2);
    }

    #[test]
    fn remove_forgets_tracked_key() {
        let (cache, mock) = lru(2);
        cache.put(1, 10);
        cache.put(2, 20);
        cache.remove(&1);
        cache.put(3, 30);

        assert!(mock.contains_key(&2));
        assert!(mock.contains_key(&3));
    }

    #[test]
    fn shrinking_capacity_evicts_eldest() {
        let (cache, mock) = lru(4);
        for i in 0..4 {
            cache.put(i, i);
        }

        cache.set_capacity::<u32>(NonZeroUsize::new(2).unwrap());

        assert_eq!(cache.capacity().get(), 2);
        assert_eq!(mock.entry_count(), 2);
        assert!(mock.contains_key(&2));
        assert!(mock.contains_key(&3));
    }

    #[test]
    fn concurrent_puts_keep_tracked_keys_stored() {
        let (cache, mock) = lru(2);
        let barrier = std::sync::Barrier::new(4);

        std::thread::scope(|scope| {
            for worker in 0..4_u32 {
                let cache = &cache;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    for round in 0..500 {
                        let key = (worker + round) % 3;
                        cache.put(key, round);
                    }
                });
            }
        });

        let tracked: Vec<u32> = cache.keys.lock().iter().map(|(key, _)| *key).collect();
        assert_eq!(tracked.len(), 2);
        for key in tracked {
            assert!(mock.contains_key(&key), "key {key} is tracked but not stored");
        }
        assert_eq!(mock.entry_count(), 2);
    }

    #[test]
    fn default_capacity_is_1024() {
        let cache: LruCache<u32, MockCache<u32, u32>> = LruCache::new(MockCache::new("default"));
        assert_eq!(cache.capacity().get(), DEFAULT_CAPACITY);
        assert_eq!(Cache::<u32, u32>::id(&cache).as_str(), "default");
    }
}
