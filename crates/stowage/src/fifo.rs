// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    collections::{HashSet, VecDeque},
    hash::Hash,
    num::NonZeroUsize,
};

use parking_lot::Mutex;
use stowage_spi::{Cache, CacheId, ReadWriteLock};

use crate::DEFAULT_CAPACITY;

#[derive(Debug)]
struct Insertions<K> {
    order: VecDeque<K>,
    members: HashSet<K>,
}

/// Bounds a cache by evicting the oldest inserted key.
///
/// Only the first `put` of a key counts as its insertion. Reads and replacements do not
/// change the order.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use stowage::{Cache, CacheId, FifoCache, PerpetualCache};
///
/// let inner = PerpetualCache::new(CacheId::new("fifo")?);
/// let cache = FifoCache::with_capacity(inner, NonZeroUsize::new(2).unwrap());
///
/// cache.put("a", 1);
/// cache.put("b", 2);
/// cache.get(&"a");
/// cache.put("c", 3);
///
/// assert_eq!(cache.get(&"a"), None);
/// # Ok::<(), stowage::InvalidCacheId>(())
/// ```
#[derive(Debug)]
pub struct FifoCache<K, C> {
    inner: C,
    capacity: NonZeroUsize,
    keys: Mutex<Insertions<K>>,
}

impl<K, C> FifoCache<K, C> {
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
            capacity,
            keys: Mutex::new(Insertions {
                order: VecDeque::new(),
                members: HashSet::new(),
            }),
        }
    }

    /// Returns the maximum number of keys kept.
    #[must_use]
    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }
}

impl<K, V, C> Cache<K, V> for FifoCache<K, C>
where
    K: Clone + Eq + Hash + Send,
    C: Cache<K, V>,
{
    fn id(&self) -> &CacheId {
        self.inner.id()
    }

    fn put(&self, key: K, value: V) {
        // The insertion order stays locked until the inner cache agrees with it.
        let mut keys = self.keys.lock();
        if keys.members.insert(key.clone()) {
            keys.order.push_back(key.clone());
        }
        let oldest = if keys.order.len() > self.capacity.get() {
            let oldest = keys.order.pop_front();
            if let Some(oldest) = &oldest {
                keys.members.remove(oldest);
            }
            oldest
        } else {
            None
        };

        self.inner.put(key, value);

        if let Some(oldest) = oldest {
            tracing::trace!(cache.id = %self.inner.id(), "evicting oldest entry");
            self.inner.remove(&oldest);
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    fn remove(&self, key: &K) -> Option<V> {
        let mut keys = self.keys.lock();
        if keys.members.remove(key) {
            keys.order.retain(|k| k != key);
        }
        self.inner.remove(key)
    }

    fn clear(&self) {
        let mut keys = self.keys.lock();
        keys.order.clear();
        keys.members.clear();
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
    use stowage_spi::testing::MockCache;

    use super::*;

    fn fifo(capacity: usize) -> (FifoCache<u32, MockCache<u32, u32>>, MockCache<u32, u32>) {
        let mock = MockCache::new("fifo");
        let cache = FifoCache::with_capacity(mock.clone(), NonZeroUsize::new(capacity).unwrap());
        (cache, mock)
    }

    #[test]
    fn evicts_in_insertion_order_regardless_of_reads() {
        let (cache, mock) = fifo(2);
        cache.put(1, 10);
        cache.put(2, 20);
        assert_eq!(cache.get(&1), Some(10));

        cache.put(3, 30);

        assert!(!mock.contains_key(&1));
        assert!(mock.contains_key(&2));
        assert!(mock.contains_key(&3));
    }

    #[test]
    fn replacing_keeps_original_position() {
        let (cache, mock) = fifo(2);
        cache.put(1, 10);
        cache.put(2, 20);
        cache.put(1, 11);
        cache.put(3, 30);

        assert!(!mock.contains_key(&1));
        assert_eq!(mock.entry_count(), 2);
    }

    #[test]
    fn removed_key_frees_a_slot() {
        let (cache, mock) = fifo(2);
        cache.put(1, 10);
        cache.put(2, 20);
        cache.remove(&1);
        cache.put(3, 30);

        assert!(mock.contains_key(&2));
        assert!(mock.contains_key(&3));
    }

    #[test]
    fn concurrent_puts_keep_tracked_keys_stored() {
        let (cache, mock) = fifo(2);
        let barrier = std::sync::Barrier::new(4);

        std::thread::scope(|scope| {
            for worker in 0..4_u32 {
                let cache = &cache;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    for round in 0..500 {
                        cache.put((worker + round) % 3, round);
                    }
                });
            }
        });

        let keys = cache.keys.lock();
        assert_eq!(keys.order.len(), 2);
        for key in &keys.order {
            assert!(mock.contains_key(key), "key {key} is tracked but not stored");
        }
        assert_eq!(mock.entry_count(), 2);
    }

    #[test]
    fn clear_resets_order() {
        let (cache, mock) = fifo(1);
        cache.put(1, 10);
        cache.clear();
        cache.put(2, 20);

        assert_eq!(mock.entry_count(), 1);
        assert_eq!(cache.capacity().get(), 1);
    }
}
