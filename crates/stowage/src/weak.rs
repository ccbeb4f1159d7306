// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    collections::{HashMap, VecDeque},
    hash::Hash,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use stowage_spi::{Cache, CacheId, ReadWriteLock};

/// Default number of values a [`WeakCache`] keeps strongly reachable.
pub const DEFAULT_HARD_LINKS: usize = 256;

/// Lets cached values be reclaimed once nothing else holds them.
///
/// The inner cache stores [`Weak`] handles. To keep recently used values from disappearing
/// the moment the caller drops them, the `hard_links` most recently stored or read values are
/// also kept strongly reachable here. Once a value is neither hard-linked nor held by any
/// caller it is freed, and its entry is purged from the inner cache on a later `put` or
/// `size`, or on the next `get` of that key.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Weak};
///
/// use stowage::{Cache, CacheId, PerpetualCache, WeakCache};
///
/// let inner = PerpetualCache::<&str, Weak<String>>::new(CacheId::new("weak")?);
/// let cache = WeakCache::new(inner, 1);
///
/// cache.put("a", Arc::new("first".to_string()));
/// cache.put("b", Arc::new("second".to_string()));
///
/// // Only the last stored value is still hard-linked.
/// assert_eq!(cache.get(&"a"), None);
/// assert_eq!(cache.get(&"b").as_deref().map(String::as_str), Some("second"));
/// # Ok::<(), stowage::InvalidCacheId>(())
/// ```
#[derive(Debug)]
pub struct WeakCache<K, T, C> {
    inner: C,
    hard_link_limit: usize,
    hard_links: Mutex<VecDeque<Arc<T>>>,
    tracked: Mutex<HashMap<K, Weak<T>>>,
}

impl<K, T, C> WeakCache<K, T, C> {
    /// Wraps `inner`, keeping up to `hard_links` values strongly reachable.
    #[must_use]
    pub fn new(inner: C, hard_links: usize) -> Self {
        Self {
            inner,
            hard_link_limit: hard_links,
            hard_links: Mutex::new(VecDeque::with_capacity(hard_links)),
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of values kept strongly reachable.
    #[must_use]
    pub fn hard_links(&self) -> usize {
        self.hard_link_limit
    }

    fn hold(&self, value: &Arc<T>) {
        if self.hard_link_limit == 0 {
            return;
        }
        let mut hard_links = self.hard_links.lock();
        hard_links.push_front(Arc::clone(value));
        hard_links.truncate(self.hard_link_limit);
    }
}

impl<K, T, C> WeakCache<K, T, C>
where
    K: Clone + Eq + Hash,
    C: Cache<K, Weak<T>>,
{
    /// Removes inner entries whose value has been freed.
    fn purge_reclaimed(&self) {
        let reclaimed: Vec<K> = {
            let mut tracked = self.tracked.lock();
            let mut reclaimed = Vec::new();
            tracked.retain(|key, value| {
                let alive = value.strong_count() > 0;
                if !alive {
                    reclaimed.push(key.clone());
                }
                alive
            });
            reclaimed
        };

        if !reclaimed.is_empty() {
            tracing::trace!(cache.id = %self.inner.id(), cache.keys = reclaimed.len(), "purging reclaimed values");
        }
        for key in reclaimed {
            // The key may have been stored again with a live value since.
            if self.inner.get(&key).is_some_and(|current| current.strong_count() == 0) {
                self.inner.remove(&key);
            }
        }
    }
}

impl<K, T, C> Cache<K, Arc<T>> for WeakCache<K, T, C>
where
    K: Clone + Eq + Hash + Send,
    T: Send + Sync,
    C: Cache<K, Weak<T>>,
{
    fn id(&self) -> &CacheId {
        self.inner.id()
    }

    fn put(&self, key: K, value: Arc<T>) {
        self.purge_reclaimed();
        let handle = Arc::downgrade(&value);
        self.tracked.lock().insert(key.clone(), Weak::clone(&handle));
        self.hold(&value);
        self.inner.put(key, handle);
    }

    fn get(&self, key: &K) -> Option<Arc<T>> {
        let handle = self.inner.get(key)?;
        if let Some(value) = handle.upgrade() {
            self.hold(&value);
            Some(value)
        } else {
            self.tracked.lock().remove(key);
            self.inner.remove(key);
            None
        }
    }

    fn remove(&self, key: &K) -> Option<Arc<T>> {
        self.tracked.lock().remove(key);
        self.inner.remove(key).and_then(|handle| handle.upgrade())
    }

    fn clear(&self) {
        self.hard_links.lock().clear();
        self.tracked.lock().clear();
        self.inner.clear();
    }

    fn size(&self) -> usize {
        self.purge_reclaimed();
        self.inner.size()
    }

    fn lock(&self) -> Option<&ReadWriteLock> {
        self.inner.lock()
    }
}
