// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use stowage_spi::{Cache, CacheId, ReadWriteLock};
use tick::Clock;

/// Default interval after which a [`ScheduledCache`] drops its contents.
pub const DEFAULT_CLEAR_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Drops the whole inner cache once a clear interval has elapsed.
///
/// There is no background timer. The interval is measured on the given [`Clock`] and checked
/// on `put`, `get`, `remove` and `size`; the first of those calls after the interval has
/// passed clears the inner cache before doing its own work.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use stowage::{Cache, CacheId, PerpetualCache, ScheduledCache};
/// use tick::ClockControl;
///
/// let control = ClockControl::new();
/// let inner = PerpetualCache::new(CacheId::new("flush")?);
/// let cache = ScheduledCache::new(inner, Duration::from_secs(60), &control.to_clock());
///
/// cache.put("a", 1);
/// control.advance(Duration::from_secs(61));
/// assert_eq!(cache.get(&"a"), None);
/// # Ok::<(), stowage::InvalidCacheId>(())
/// ```
#[derive(Debug)]
pub struct ScheduledCache<C> {
    inner: C,
    clear_interval: Duration,
    clock: Clock,
    last_clear: Mutex<Instant>,
}

impl<C> ScheduledCache<C> {
    /// Wraps `inner`, clearing it every `clear_interval` as measured by `clock`.
    #[must_use]
    pub fn new(inner: C, clear_interval: Duration, clock: &Clock) -> Self {
        Self {
            inner,
            clear_interval,
            last_clear: Mutex::new(clock.instant()),
            clock: clock.clone(),
        }
    }

    /// Returns the configured clear interval.
    #[must_use]
    pub fn clear_interval(&self) -> Duration {
        self.clear_interval
    }

    fn clear_when_stale<K, V>(&self)
    where
        C: Cache<K, V>,
    {
        let now = self.clock.instant();
        let mut last_clear = self.last_clear.lock();
        if now.saturating_duration_since(*last_clear) >= self.clear_interval {
            tracing::debug!(cache.id = %self.inner.id(), "clear interval elapsed, clearing cache");
            self.inner.clear();
            *last_clear = now;
        }
    }
}

impl<K, V, C> Cache<K, V> for ScheduledCache<C>
where
    C: Cache<K, V>,
{
    fn id(&self) -> &CacheId {
        self.inner.id()
    }

    fn put(&self, key: K, value: V) {
        self.clear_when_stale::<K, V>();
        self.inner.put(key, value);
    }

    fn get(&self, key: &K) -> Option<V> {
        self.clear_when_stale::<K, V>();
        self.inner.get(key)
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.clear_when_stale::<K, V>();
        self.inner.remove(key)
    }

    fn clear(&self) {
        *self.last_clear.lock() = self.clock.instant();
        self.inner.clear();
    }

    fn size(&self) -> usize {
        self.clear_when_stale::<K, V>();
        self.inner.size()
    }

    fn lock(&self) -> Option<&ReadWriteLock> {
        self.inner.lock()
    }
}
