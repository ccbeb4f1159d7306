// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "metrics")]
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter},
};
use stowage_spi::{Cache, CacheId, ReadWriteLock};

#[cfg(feature = "metrics")]
pub(crate) const LOOKUP_COUNT_NAME: &str = "cache.lookup.count";

#[cfg(feature = "metrics")]
fn create_lookup_counter(meter: &Meter) -> Counter<u64> {
    meter
        .u64_counter(LOOKUP_COUNT_NAME)
        .with_description("Cache lookups by outcome")
        .with_unit("{lookup}")
        .build()
}

/// Tracks the hit ratio of the inner cache and logs it on every read.
///
/// Each `get` emits a `DEBUG` event carrying the `cache.id` and the running
/// `cache.hit_ratio`. No other operation is logged.
///
/// With the `metrics` feature, [`with_meter`](Self::with_meter) also counts every lookup on a
/// `cache.lookup.count` counter, with `cache.id` and `cache.activity` (`hit` or `miss`)
/// attributes.
#[derive(Debug)]
pub struct LoggingCache<C> {
    inner: C,
    requests: AtomicU64,
    hits: AtomicU64,
    #[cfg(feature = "metrics")]
    lookups: Option<Counter<u64>>,
}

impl<C> LoggingCache<C> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            #[cfg(feature = "metrics")]
            lookups: None,
        }
    }

    /// Wraps `inner`, also counting lookups on a counter created from `meter`.
    #[cfg(feature = "metrics")]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn with_meter(inner: C, meter: &Meter) -> Self {
        Self {
            lookups: Some(create_lookup_counter(meter)),
            ..Self::new(inner)
        }
    }

    /// Returns the number of reads seen so far.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Returns the fraction of reads that hit, or `0.0` before the first read.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "a ratio does not need full u64 precision")]
    pub fn hit_ratio(&self) -> f64 {
        let requests = self.requests.load(Ordering::Relaxed);
        if requests == 0 {
            return 0.0;
        }
        self.hits.load(Ordering::Relaxed) as f64 / requests as f64
    }

    #[cfg(feature = "metrics")]
    fn record_lookup(&self, id: &CacheId, hit: bool) {
        if let Some(lookups) = &self.lookups {
            let activity = if hit { "hit" } else { "miss" };
            lookups.add(
                1,
                &[
                    KeyValue::new("cache.id", id.to_string()),
                    KeyValue::new("cache.activity", activity),
                ],
            );
        }
    }
}

impl<K, V, C> Cache<K, V> for LoggingCache<C>
where
    C: Cache<K, V>,
{
    fn id(&self) -> &CacheId {
        self.inner.id()
    }

    fn put(&self, key: K, value: V) {
        self.inner.put(key, value);
    }

    fn get(&self, key: &K) -> Option<V> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let value = self.inner.get(key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        #[cfg(feature = "metrics")]
        self.record_lookup(self.inner.id(), value.is_some());
        tracing::debug!(cache.id = %self.inner.id(), cache.hit_ratio = self.hit_ratio(), "cache.read");
        value
    }

    fn remove(&self, key: &K) -> Option<V> {
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
