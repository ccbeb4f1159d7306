// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for cache stores and cache decorators.

use std::sync::Arc;

use crate::CacheId;

/// Coarse read/write lock a cache may expose for whole-cache synchronization.
///
/// This is unrelated to the per-key locking done by a blocking cache. Holding the read half
/// keeps a cooperating store from being cleared underneath a snapshot.
pub type ReadWriteLock = parking_lot::RwLock<()>;

/// Trait for cache stores and cache decorators.
///
/// One instance is created per namespace and shared by all callers of that namespace, so
/// every method takes `&self` and implementations synchronize internally.
///
/// Decorators implement this trait by wrapping exactly one inner cache. They must delegate
/// [`id`](Cache::id) and forward [`remove`](Cache::remove) so that a removal issued on the
/// outermost layer reaches the innermost store.
///
/// All operations are total: a missing key is reported as `None`, never as an error.
pub trait Cache<K, V>: Send + Sync {
    /// Returns the identity assigned to this cache at construction.
    fn id(&self) -> &CacheId;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: K, value: V);

    /// Returns the value stored under `key`, or `None` if there is none.
    fn get(&self, key: &K) -> Option<V>;

    /// Removes the value stored under `key`, if any.
    ///
    /// The returned value is advisory. Layers are free to return `None` even when something
    /// was removed, and nothing in the cache machinery depends on it. The significant side
    /// effect is that a blocking layer releases any lock held for `key`.
    fn remove(&self, key: &K) -> Option<V>;

    /// Removes every entry.
    fn clear(&self);

    /// Returns the number of stored entries.
    ///
    /// Advisory only. Decorators that drop entries lazily may over-report.
    fn size(&self) -> usize;

    /// Returns `true` if [`size`](Cache::size) reports no entries.
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the coarse read/write lock of this cache, if it has one.
    ///
    /// The default implementation has none.
    fn lock(&self) -> Option<&ReadWriteLock> {
        None
    }
}

impl<K, V, C> Cache<K, V> for Box<C>
where
    C: Cache<K, V> + ?Sized,
{
    fn id(&self) -> &CacheId {
        (**self).id()
    }

    fn put(&self, key: K, value: V) {
        (**self).put(key, value);
    }

    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn remove(&self, key: &K) -> Option<V> {
        (**self).remove(key)
    }

    fn clear(&self) {
        (**self).clear();
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn lock(&self) -> Option<&ReadWriteLock> {
        (**self).lock()
    }
}

impl<K, V, C> Cache<K, V> for Arc<C>
where
    C: Cache<K, V> + ?Sized,
{
    fn id(&self) -> &CacheId {
        (**self).id()
    }

    fn put(&self, key: K, value: V) {
        (**self).put(key, value);
    }

    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn remove(&self, key: &K) -> Option<V> {
        (**self).remove(key)
    }

    fn clear(&self) {
        (**self).clear();
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn lock(&self) -> Option<&ReadWriteLock> {
        (**self).lock()
    }
}
