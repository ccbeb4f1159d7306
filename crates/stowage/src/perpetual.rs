// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{collections::HashMap, hash::Hash};

use parking_lot::Mutex;
use stowage_spi::{Cache, CacheId, ReadWriteLock};

/// An unbounded in-memory store with no eviction.
///
/// This is the innermost layer of most cache chains. It keeps every entry until it is
/// removed or the whole store is cleared. Values are cloned out on [`get`](Cache::get),
/// so callers never observe mutations made through another caller's copy.
///
/// The store exposes a coarse [`ReadWriteLock`]. [`clear`](Cache::clear) takes the write
/// half, and [`snapshot`](Self::snapshot) takes the read half, so a snapshot never observes
/// a half-cleared store.
///
/// # Examples
///
/// ```
/// use stowage::{Cache, CacheId, PerpetualCache};
///
/// let cache = PerpetualCache::new(CacheId::new("users")?);
/// cache.put(1_u32, "alice".to_string());
///
/// assert_eq!(cache.get(&1), Some("alice".to_string()));
/// assert_eq!(cache.size(), 1);
/// # Ok::<(), stowage::InvalidCacheId>(())
/// ```
#[derive(Debug)]
pub struct PerpetualCache<K, V> {
    id: CacheId,
    entries: Mutex<HashMap<K, V>>,
    lock: ReadWriteLock,
}

impl<K, V> PerpetualCache<K, V> {
    /// Creates an empty store with the given identity.
    #[must_use]
    pub fn new(id: CacheId) -> Self {
        Self {
            id,
            entries: Mutex::new(HashMap::new()),
            lock: ReadWriteLock::new(()),
        }
    }
}

impl<K, V> PerpetualCache<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Returns a copy of every entry, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let _read = self.lock.read();
        self.entries.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<K, V> Cache<K, V> for PerpetualCache<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn id(&self) -> &CacheId {
        &self.id
    }

    fn put(&self, key: K, value: V) {
        self.entries.lock().insert(key, value);
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().remove(key)
    }

    fn clear(&self) {
        let _write = self.lock.write();
        self.entries.lock().clear();
    }

    fn size(&self) -> usize {
        self.entries.lock().len()
    }

    fn lock(&self) -> Option<&ReadWriteLock> {
        Some(&self.lock)
    }
}
