// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key blocking so that a missing key is populated exactly once.

use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    marker::PhantomData,
    sync::Arc,
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use stowage_spi::{Cache, CacheId, ReadWriteLock};

/// A one-shot latch owned by the thread that populates a key.
struct Latch {
    owner: ThreadId,
    released: Mutex<bool>,
    signal: Condvar,
}

impl Latch {
    fn new(owner: ThreadId) -> Self {
        Self {
            owner,
            released: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn release(&self) {
        *self.released.lock() = true;
        self.signal.notify_all();
    }

    /// Blocks until released. Returns `false` if `deadline` passed first.
    fn wait(&self, deadline: Option<Instant>) -> bool {
        let mut released = self.released.lock();
        match deadline {
            None => {
                while !*released {
                    self.signal.wait(&mut released);
                }
                true
            }
            Some(deadline) => {
                while !*released {
                    if self.signal.wait_until(&mut released, deadline).timed_out() {
                        return *released;
                    }
                }
                true
            }
        }
    }
}

enum Acquired {
    /// The calling thread now holds the latch.
    New,
    /// The calling thread already held the latch.
    Reentered,
    /// Another thread still holds the latch.
    TimedOut,
}

/// Lets exactly one caller populate a missing key while every other caller for that key waits.
///
/// A `get` that misses leaves the calling thread holding the latch for that key. Every other
/// thread that calls `get` for the same key blocks until the holder calls `put` or `remove`
/// for it; they then read again. A `get` that hits releases the latch at once.
///
/// `put` and `remove` release the latch for their key whichever thread holds it, and do
/// nothing to the latch if none is held. The holder may call `get` again for the same key
/// without blocking on itself.
///
/// The raw protocol leaves the caller responsible for eventually calling `put` or `remove`
/// after a miss. [`entry`](Self::entry) and [`get_or_populate`](Self::get_or_populate) tie
/// that responsibility to a guard, so that an early return or a panic still releases the
/// key.
///
/// # Timeouts
///
/// Without a timeout, waiters block until the holder releases the key. With one, a waiter
/// that is not released in time gives up, logs a warning, and sees a miss without becoming
/// the holder. Such a caller may still `put` its own result, which also releases the
/// original holder's waiters.
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, thread};
///
/// use stowage::{BlockingCache, Cache, CacheId, PerpetualCache};
///
/// let cache = Arc::new(BlockingCache::new(PerpetualCache::new(CacheId::new("blocking")?)));
///
/// // The first reader misses and is now responsible for the key.
/// assert_eq!(cache.get(&"Q#42"), None);
///
/// let reader = {
///     let cache = Arc::clone(&cache);
///     thread::spawn(move || cache.get(&"Q#42"))
/// };
///
/// // The second reader waits until the value is stored.
/// cache.put("Q#42", "RESULT");
/// assert_eq!(reader.join().unwrap(), Some("RESULT"));
/// # Ok::<(), stowage::InvalidCacheId>(())
/// ```
pub struct BlockingCache<K, C> {
    inner: C,
    locks: Mutex<HashMap<K, Arc<Latch>>>,
    timeout: Option<Duration>,
}

impl<K, C> fmt::Debug for BlockingCache<K, C>
where
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingCache")
            .field("inner", &self.inner)
            .field("locked_keys", &self.locks.lock().len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<K, C> BlockingCache<K, C> {
    /// Wraps `inner`. Waiters block until released, however long that takes.
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            locks: Mutex::new(HashMap::new()),
            timeout: None,
        }
    }

    /// Wraps `inner`. Waiters give up after `timeout`.
    #[must_use]
    pub fn with_timeout(inner: C, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::new(inner)
        }
    }

    /// Returns the wait timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the number of keys currently held by a populator.
    #[must_use]
    pub fn locked_keys(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns a reference to the wrapped cache.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<K, C> BlockingCache<K, C>
where
    K: Clone + Eq + Hash,
{
    fn acquire(&self, key: &K) -> Acquired {
        let current = thread::current().id();
        // One deadline for the whole acquisition, however many holders come and go.
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let latch = {
                let mut locks = self.locks.lock();
                match locks.get(key) {
                    None => {
                        locks.insert(key.clone(), Arc::new(Latch::new(current)));
                        tracing::trace!("key acquired for population");
                        return Acquired::New;
                    }
                    Some(latch) if latch.owner == current => return Acquired::Reentered,
                    Some(latch) => Arc::clone(latch),
                }
            };

            tracing::trace!("waiting for key to be populated");
            if !latch.wait(deadline) {
                return Acquired::TimedOut;
            }
        }
    }

    /// Releases the latch for `key`. Returns `false` if none was held.
    fn release(&self, key: &K) -> bool {
        let latch = self.locks.lock().remove(key);
        latch.is_some_and(|latch| {
            latch.release();
            true
        })
    }

    /// Reads `key`, reporting whether the calling thread is left holding its latch.
    fn read<V>(&self, key: &K) -> (Option<V>, bool)
    where
        C: Cache<K, V>,
    {
        match self.acquire(key) {
            Acquired::TimedOut => {
                tracing::warn!(
                    cache.id = %self.inner.id(),
                    cache.timeout_ms = self.timeout.map_or(0, |t| t.as_millis()),
                    "timed out waiting for another caller to populate the key"
                );
                (None, false)
            }
            Acquired::New | Acquired::Reentered => {
                let held = Held { cache: self, key: Some(key) };
                let value = self.inner.get(key);
                if value.is_none() {
                    held.keep();
                    return (None, true);
                }
                (value, false)
            }
        }
    }

    /// Looks `key` up, returning the value or a guard responsible for populating it.
    ///
    /// # Examples
    ///
    /// ```
    /// use stowage::{BlockingCache, CacheId, Lookup, PerpetualCache};
    ///
    /// let cache = BlockingCache::new(PerpetualCache::new(CacheId::new("entry")?));
    ///
    /// match cache.entry(&"k") {
    ///     Lookup::Hit(_) => unreachable!(),
    ///     Lookup::Miss(guard) => guard.fill(1),
    /// }
    ///
    /// assert!(matches!(cache.entry(&"k"), Lookup::Hit(1)));
    /// # Ok::<(), stowage::InvalidCacheId>(())
    /// ```
    pub fn entry<V>(&self, key: &K) -> Lookup<'_, K, V, C>
    where
        C: Cache<K, V>,
    {
        match self.read(key) {
            (Some(value), _) => Lookup::Hit(value),
            (None, populator) => Lookup::Miss(PopulateGuard {
                cache: self,
                key: Some(key.clone()),
                populator,
                _value: PhantomData,
            }),
        }
    }

    /// Returns the value for `key`, calling `resolve` to produce and store it on a miss.
    ///
    /// While `resolve` runs, other callers of `get` or `get_or_populate` for the same key
    /// wait. If `resolve` fails or panics, the key is removed and the waiters are released
    /// to retry.
    ///
    /// # Errors
    ///
    /// Returns whatever `resolve` returns.
    pub fn get_or_populate<V, E>(&self, key: &K, resolve: impl FnOnce() -> Result<V, E>) -> Result<V, E>
    where
        K: Send,
        V: Clone,
        C: Cache<K, V>,
    {
        match self.entry(key) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Miss(guard) => {
                let value = resolve()?;
                guard.fill(value.clone());
                Ok(value)
            }
        }
    }
}

impl<K, V, C> Cache<K, V> for BlockingCache<K, C>
where
    K: Clone + Eq + Hash + Send,
    C: Cache<K, V>,
{
    fn id(&self) -> &CacheId {
        self.inner.id()
    }

    fn put(&self, key: K, value: V) {
        let released = key.clone();
        let _held = Held {
            cache: self,
            key: Some(&released),
        };
        self.inner.put(key, value);
    }

    fn get(&self, key: &K) -> Option<V> {
        self.read(key).0
    }

    fn remove(&self, key: &K) -> Option<V> {
        let _held = Held { cache: self, key: Some(key) };
        self.inner.remove(key)
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn lock(&self) -> Option<&ReadWriteLock> {
        self.inner.lock()
    }
}

/// Releases the latch for a key when dropped, unless kept.
struct Held<'a, K, C>
where
    K: Clone + Eq + Hash,
{
    cache: &'a BlockingCache<K, C>,
    key: Option<&'a K>,
}

impl<K, C> Held<'_, K, C>
where
    K: Clone + Eq + Hash,
{
    /// Leaves the latch held past the end of this guard.
    fn keep(mut self) {
        self.key = None;
    }
}

impl<K, C> Drop for Held<'_, K, C>
where
    K: Clone + Eq + Hash,
{
    fn drop(&mut self) {
        if let Some(key) = self.key {
            self.cache.release(key);
        }
    }
}

/// The outcome of [`BlockingCache::entry`].
#[derive(Debug)]
pub enum Lookup<'a, K, V, C>
where
    K: Clone + Eq + Hash,
    C: Cache<K, V>,
{
    /// The value was cached.
    Hit(V),
    /// The value was not cached.
    Miss(PopulateGuard<'a, K, V, C>),
}

/// The obligation to populate a missing key.
///
/// Call [`fill`](Self::fill) with the resolved value. Dropping the guard without filling it
/// removes the key, which releases every caller waiting for it.
pub struct PopulateGuard<'a, K, V, C>
where
    K: Clone + Eq + Hash,
    C: Cache<K, V>,
{
    cache: &'a BlockingCache<K, C>,
    key: Option<K>,
    populator: bool,
    _value: PhantomData<fn(V)>,
}

impl<K, V, C> PopulateGuard<'_, K, V, C>
where
    K: Clone + Eq + Hash + Send,
    C: Cache<K, V>,
{
    /// Returns `true` if the calling thread holds the key's latch.
    ///
    /// This is `false` only after a wait timed out. Filling such a guard still stores the
    /// value, and dropping it unfilled leaves the other holder undisturbed.
    #[must_use]
    pub fn is_populator(&self) -> bool {
        self.populator
    }

    /// Returns the key this guard is responsible for.
    #[must_use]
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    /// Stores `value` and releases every caller waiting for the key.
    pub fn fill(mut self, value: V) {
        if let Some(key) = self.key.take() {
            self.cache.put(key, value);
        }
    }
}

impl<K, V, C> Drop for PopulateGuard<'_, K, V, C>
where
    K: Clone + Eq + Hash,
    C: Cache<K, V>,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take()
            && self.populator
        {
            tracing::debug!(cache.id = %self.cache.inner.id(), "population abandoned, releasing key");
            let _held = Held {
                cache: self.cache,
                key: Some(&key),
            };
            self.cache.inner.remove(&key);
        }
    }
}

impl<K, V, C> fmt::Debug for PopulateGuard<'_, K, V, C>
where
    K: Clone + Eq + Hash + fmt::Debug,
    C: Cache<K, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopulateGuard")
            .field("key", &self.key)
            .field("populator", &self.populator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Barrier,
        atomic::{AtomicBool, Ordering},
        mpsc,
    };

    use stowage_spi::testing::{CacheOp, MockCache};
    use testing_aids::{LogCapture, execute_or_abandon};

    use super::*;

    type Blocking = BlockingCache<String, MockCache<String, String>>;

    fn blocking() -> (Arc<Blocking>, MockCache<String, String>) {
        let mock = MockCache::new("blocking");
        (Arc::new(BlockingCache::new(mock.clone())), mock)
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn hit_releases_latch() {
        let (cache, mock) = blocking();
        mock.put(key("k"), key("v"));

        assert_eq!(cache.get(&key("k")), Some(key("v")));
        assert_eq!(cache.locked_keys(), 0);
    }

    #[test]
    fn miss_keeps_latch_until_put() {
        let (cache, _) = blocking();

        assert_eq!(cache.get(&key("k")), None);
        assert_eq!(cache.locked_keys(), 1);

        cache.put(key("k"), key("v"));
        assert_eq!(cache.locked_keys(), 0);
    }

    #[test]
    fn holder_may_read_again_without_blocking() {
        let (cache, _) = blocking();

        assert_eq!(cache.get(&key("k")), None);
        assert_eq!(cache.get(&key("k")), None);
        assert_eq!(cache.locked_keys(), 1);

        cache.remove(&key("k"));
        assert_eq!(cache.locked_keys(), 0);
    }

    #[test]
    fn releasing_an_unheld_key_is_a_no_op() {
        let (cache, mock) = blocking();

        assert_eq!(cache.remove(&key("never")), None);
        cache.put(key("other"), key("v"));

        assert_eq!(cache.locked_keys(), 0);
        assert_eq!(mock.entry_count(), 1);
    }

    #[test]
    fn remove_forwards_to_inner_cache() {
        let (cache, mock) = blocking();
        cache.put(key("k"), key("v"));
        mock.clear_operations();

        cache.remove(&key("k"));
        assert_eq!(mock.operations(), vec![CacheOp::Remove(key("k"))]);
    }

    #[test]
    fn waiter_sees_value_stored_by_holder() {
        let (cache, _) = blocking();
        let result = execute_or_abandon(move || {
            assert_eq!(cache.get(&key("k")), None);

            let (started_tx, started_rx) = mpsc::channel();
            let waiter = {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    started_tx.send(()).unwrap();
                    cache.get(&key("k"))
                })
            };

            started_rx.recv().unwrap();
            thread::sleep(Duration::from_millis(20));
            cache.put(key("k"), key("v"));
            waiter.join().unwrap()
        });

        assert_eq!(result, Some(Some(key("v"))));
    }

    #[test]
    fn timed_out_waiter_sees_miss_without_holding() {
        let mock = MockCache::<String, String>::new("timeout");
        let cache = Arc::new(BlockingCache::with_timeout(mock, Duration::from_millis(30)));
        assert_eq!(cache.get(&key("k")), None);

        let waiter = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || match cache.entry::<String>(&key("k")) {
                Lookup::Hit(_) => panic!("nothing was stored"),
                Lookup::Miss(guard) => guard.is_populator(),
            })
        };

        assert!(!waiter.join().unwrap());
        assert_eq!(cache.locked_keys(), 1);
        assert_eq!(cache.timeout(), Some(Duration::from_millis(30)));

        cache.put(key("k"), key("v"));
        assert_eq!(cache.locked_keys(), 0);
    }

    #[test]
    fn timeout_covers_the_whole_wait_across_holders() {
        let cache = Arc::new(BlockingCache::with_timeout(
            MockCache::<String, String>::new("deadline"),
            Duration::from_millis(100),
        ));
        let result = execute_or_abandon(move || {
            let done = Arc::new(AtomicBool::new(false));
            let (held_tx, held_rx) = mpsc::channel();

            // Keeps handing the key to a fresh holder without ever storing a value.
            let relay = {
                let cache = Arc::clone(&cache);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    assert_eq!(cache.get(&key("k")), None);
                    held_tx.send(()).unwrap();
                    while !done.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(30));
                        cache.remove(&key("k"));
                        cache.get(&key("k"));
                    }
                    cache.remove(&key("k"));
                })
            };

            held_rx.recv().unwrap();
            let started = Instant::now();
            let seen = cache.get(&key("k"));
            let waited = started.elapsed();
            done.store(true, Ordering::SeqCst);
            relay.join().unwrap();
            (seen, waited)
        });

        let (seen, waited) = result.unwrap();
        assert_eq!(seen, None);
        assert!(waited < Duration::from_millis(300), "waited {waited:?}");
    }

    #[test]
    fn timeout_is_logged_as_warning() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let cache = Arc::new(BlockingCache::with_timeout(
            MockCache::<String, String>::new("warned"),
            Duration::from_millis(10),
        ));

        let holder = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || assert_eq!(cache.get(&key("k")), None))
        };
        holder.join().unwrap();

        // The holder thread is gone without releasing, so this read must time out.
        assert_eq!(cache.get(&key("k")), None);
        capture.assert_contains("WARN");
        capture.assert_contains("cache.id=warned");
        cache.remove(&key("k"));
    }

    #[test]
    fn dropped_guard_releases_waiters() {
        let (cache, mock) = blocking();
        let result = execute_or_abandon(move || {
            let Lookup::Miss(guard) = cache.entry::<String>(&key("k")) else {
                panic!("empty cache must miss");
            };
            assert!(guard.is_populator());
            assert_eq!(guard.key(), Some(&key("k")));

            let barrier = Arc::new(Barrier::new(2));
            let waiter = {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    // The guard is dropped unfilled, so this caller becomes the next populator.
                    cache.get(&key("k"))
                })
            };

            barrier.wait();
            thread::sleep(Duration::from_millis(20));
            drop(guard);

            let seen = waiter.join().unwrap();
            (seen, cache.locked_keys())
        });

        assert_eq!(result, Some((None, 1)));
        assert!(mock.operations().contains(&CacheOp::Remove(key("k"))));
    }

    #[test]
    fn get_or_populate_error_releases_key() {
        let (cache, mock) = blocking();

        let result: Result<String, &str> = cache.get_or_populate(&key("k"), || Err("resource failed"));
        assert_eq!(result, Err("resource failed"));
        assert_eq!(cache.locked_keys(), 0);

        let value = cache.get_or_populate(&key("k"), || Ok::<_, &str>(key("v")));
        assert_eq!(value, Ok(key("v")));
        assert_eq!(mock.entry_count(), 1);
        assert_eq!(cache.locked_keys(), 0);
    }

    #[test]
    fn debug_reports_locked_keys() {
        let (cache, _) = blocking();
        assert_eq!(cache.get(&key("k")), None);

        let rendered = format!("{cache:?}");
        assert!(rendered.contains("locked_keys: 1"), "{rendered}");
        cache.remove(&key("k"));
    }
}
