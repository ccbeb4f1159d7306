// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Ties cache entries created during a unit of work to its outcome.
//!
//! Reads and writes made while a [`Transaction`] is open go through a
//! [`TransactionalCache`], which remembers every key that missed or was written. Writes
//! reach the shared cache at once. On rollback every remembered key is removed again,
//! which also releases any caller a blocking layer made wait for those keys. On commit the
//! written keys are kept and any key that missed but was never written is released.
//!
//! [`CachingTransaction`] drives this from the transaction itself, so that committing,
//! rolling back or closing it does the right thing for every cache it touched.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    hash::Hash,
    mem,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use stowage_spi::{Cache, CacheId, ReadWriteLock, Transaction, TransactionError};

#[derive(Debug)]
struct Pending<K> {
    missed: HashSet<K>,
    written: HashSet<K>,
}

impl<K> Default for Pending<K> {
    fn default() -> Self {
        Self {
            missed: HashSet::new(),
            written: HashSet::new(),
        }
    }
}

/// A per-transaction view of a shared cache that can undo its own writes.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use stowage::{Cache, CacheId, PerpetualCache, TransactionalCache};
///
/// let shared: Arc<dyn Cache<&str, i32>> = Arc::new(PerpetualCache::new(CacheId::new("tx")?));
/// let view = TransactionalCache::new(Arc::clone(&shared));
///
/// view.put("a", 1);
/// assert_eq!(shared.get(&"a"), Some(1));
///
/// view.rollback();
/// assert_eq!(shared.get(&"a"), None);
/// # Ok::<(), stowage::InvalidCacheId>(())
/// ```
pub struct TransactionalCache<K, V> {
    delegate: Arc<dyn Cache<K, V>>,
    pending: Mutex<Pending<K>>,
}

impl<K, V> fmt::Debug for TransactionalCache<K, V>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalCache")
            .field("id", self.delegate.id())
            .field("pending", &self.pending)
            .finish()
    }
}

impl<K, V> TransactionalCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates a view of `delegate` with nothing pending.
    #[must_use]
    pub fn new(delegate: Arc<dyn Cache<K, V>>) -> Self {
        Self {
            delegate,
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Returns the shared cache behind this view.
    #[must_use]
    pub fn delegate(&self) -> &Arc<dyn Cache<K, V>> {
        &self.delegate
    }

    /// Returns the number of distinct keys this view would touch on rollback.
    #[must_use]
    pub fn pending_keys(&self) -> usize {
        let pending = self.pending.lock();
        pending.missed.union(&pending.written).count()
    }

    /// Keeps every write and releases keys that missed but were never written.
    pub fn commit(&self) {
        let Pending { missed, written } = mem::take(&mut *self.pending.lock());
        let unfilled: Vec<&K> = missed.difference(&written).collect();
        if !unfilled.is_empty() {
            tracing::debug!(cache.id = %self.delegate.id(), cache.keys = unfilled.len(), "releasing unfilled keys on commit");
        }
        for key in unfilled {
            self.delegate.remove(key);
        }
    }

    /// Removes every key that missed or was written through this view.
    pub fn rollback(&self) {
        let Pending { missed, written } = mem::take(&mut *self.pending.lock());
        let touched: HashSet<&K> = missed.iter().chain(written.iter()).collect();
        if !touched.is_empty() {
            tracing::debug!(cache.id = %self.delegate.id(), cache.keys = touched.len(), "rolling back speculative entries");
        }
        for key in touched {
            self.delegate.remove(key);
        }
    }
}

impl<K, V> Cache<K, V> for TransactionalCache<K, V>
where
    K: Clone + Eq + Hash + Send,
{
    fn id(&self) -> &CacheId {
        self.delegate.id()
    }

    fn put(&self, key: K, value: V) {
        self.pending.lock().written.insert(key.clone());
        self.delegate.put(key, value);
    }

    fn get(&self, key: &K) -> Option<V> {
        let value = self.delegate.get(key);
        if value.is_none() {
            self.pending.lock().missed.insert(key.clone());
        }
        value
    }

    fn remove(&self, key: &K) -> Option<V> {
        {
            let mut pending = self.pending.lock();
            pending.missed.remove(key);
            pending.written.remove(key);
        }
        self.delegate.remove(key)
    }

    fn clear(&self) {
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn lock(&self) -> Option<&ReadWriteLock> {
        self.delegate.lock()
    }
}

/// Keeps one [`TransactionalCache`] per shared cache touched by a unit of work.
///
/// Views are keyed by [`CacheId`], so the same shared cache reached through different
/// handles maps to one view.
pub struct TransactionalCacheManager<K, V> {
    caches: HashMap<CacheId, TransactionalCache<K, V>>,
}

impl<K, V> fmt::Debug for TransactionalCacheManager<K, V>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalCacheManager").field("caches", &self.caches).finish()
    }
}

impl<K, V> Default for TransactionalCacheManager<K, V> {
    fn default() -> Self {
        Self { caches: HashMap::new() }
    }
}

impl<K, V> TransactionalCacheManager<K, V>
where
    K: Clone + Eq + Hash + Send,
{
    /// Creates a manager with no views.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the view of `cache`, creating it on first use.
    pub fn transactional_cache(&mut self, cache: &Arc<dyn Cache<K, V>>) -> &TransactionalCache<K, V> {
        self.caches
            .entry(cache.id().clone())
            .or_insert_with(|| TransactionalCache::new(Arc::clone(cache)))
    }

    /// Reads `key` from `cache` through its view.
    pub fn get(&mut self, cache: &Arc<dyn Cache<K, V>>, key: &K) -> Option<V> {
        self.transactional_cache(cache).get(key)
    }

    /// Writes `key` to `cache` through its view.
    pub fn put(&mut self, cache: &Arc<dyn Cache<K, V>>, key: K, value: V) {
        self.transactional_cache(cache).put(key, value);
    }

    /// Removes `key` from `cache` through its view.
    pub fn remove(&mut self, cache: &Arc<dyn Cache<K, V>>, key: &K) -> Option<V> {
        self.transactional_cache(cache).remove(key)
    }

    /// Clears `cache` through its view.
    pub fn clear(&mut self, cache: &Arc<dyn Cache<K, V>>) {
        self.transactional_cache(cache).clear();
    }

    /// Commits every view.
    pub fn commit(&mut self) {
        for cache in self.caches.values() {
            cache.commit();
        }
    }

    /// Rolls back every view.
    pub fn rollback(&mut self) {
        for cache in self.caches.values() {
            cache.rollback();
        }
    }

    /// Returns the number of caches touched so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Returns `true` if no cache has been touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

/// A [`Transaction`] that settles its caches together with the underlying resource.
///
/// - `commit` commits the resource first, and commits the caches only if that succeeded.
/// - `rollback` always rolls back the caches, even when the resource fails to roll back,
///   and then reports the resource's error.
/// - `close` rolls back whatever the caches still hold pending, then closes the resource.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use stowage::{Cache, CacheId, CachingTransaction, PerpetualCache, Transaction};
/// use stowage_spi::testing::MockTransaction;
///
/// let shared: Arc<dyn Cache<u32, String>> = Arc::new(PerpetualCache::new(CacheId::new("users")?));
/// let mut tx = CachingTransaction::new(MockTransaction::new());
///
/// tx.caches().put(&shared, 7, "alice".to_string());
/// tx.rollback()?;
///
/// assert_eq!(shared.get(&7), None);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct CachingTransaction<T, K, V> {
    transaction: T,
    caches: TransactionalCacheManager<K, V>,
}

impl<T, K, V> fmt::Debug for CachingTransaction<T, K, V>
where
    T: fmt::Debug,
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingTransaction")
            .field("transaction", &self.transaction)
            .field("caches", &self.caches)
            .finish()
    }
}

impl<T, K, V> CachingTransaction<T, K, V> {
    /// Wraps `transaction` with an empty set of caches.
    #[must_use]
    pub fn new(transaction: T) -> Self {
        Self {
            transaction,
            caches: TransactionalCacheManager::default(),
        }
    }

    /// Returns the caches of this unit of work.
    pub fn caches(&mut self) -> &mut TransactionalCacheManager<K, V> {
        &mut self.caches
    }

    /// Returns the wrapped transaction.
    #[must_use]
    pub fn transaction(&self) -> &T {
        &self.transaction
    }
}

impl<T, K, V> Transaction for CachingTransaction<T, K, V>
where
    T: Transaction,
    K: Clone + Eq + Hash + Send,
{
    type Connection = T::Connection;

    fn connection(&mut self) -> Result<&mut Self::Connection, TransactionError> {
        self.transaction.connection()
    }

    fn commit(&mut self) -> Result<(), TransactionError> {
        self.transaction
            .commit()
            .inspect_err(|e| tracing::error!(error = %e, "commit failed, cache entries left pending"))?;
        self.caches.commit();
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), TransactionError> {
        let result = self.transaction.rollback();
        self.caches.rollback();
        if let Err(e) = &result {
            tracing::error!(error = %e, "rollback failed, cache entries removed anyway");
        }
        result
    }

    fn close(&mut self) -> Result<(), TransactionError> {
        self.caches.rollback();
        self.transaction.close()
    }

    fn timeout(&self) -> Result<Option<Duration>, TransactionError> {
        self.transaction.timeout()
    }
}
