// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Assembling a decorator chain from settings.

use std::{
    fmt,
    hash::Hash,
    num::NonZeroUsize,
    sync::{Arc, Weak},
    time::Duration,
};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::Meter;
use stowage_spi::{Cache, CacheId};
use tick::Clock;

use crate::{
    BlockingCache, CacheConfig, ConfigError, EvictionPolicy, FifoCache, LoggingCache, LruCache, PerpetualCache, ScheduledCache,
    WeakCache,
};

type BaseFactory<K, V> = Box<dyn FnOnce(CacheId) -> Box<dyn Cache<K, V>>>;

/// Builds a cache chain in a fixed order.
///
/// From the inside out the chain is:
///
/// 1. the base store, a [`PerpetualCache`] unless [`implementation`](Self::implementation)
///    or [`weak_values`](CacheBuilder::weak_values) says otherwise
/// 2. the eviction decorator, [`LruCache`] by default
/// 3. [`ScheduledCache`], if a clear interval is set, measured on the builder's [`Clock`]
/// 4. [`LoggingCache`], unless logging is turned off
/// 5. [`BlockingCache`], if blocking is turned on
///
/// [`build`](Self::build) erases the chain behind `dyn Cache`. When the caller needs the
/// scoped population API of [`BlockingCache`], [`build_blocking`](Self::build_blocking)
/// returns the outermost layer with its concrete type.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use stowage::{Cache, CacheBuilder, EvictionPolicy};
/// use tick::Clock;
///
/// let cache = CacheBuilder::<u64, String>::new("users", Clock::new_frozen())
///     .eviction(EvictionPolicy::Lru)
///     .size(2)
///     .clear_interval(Duration::from_secs(600))
///     .build()?;
///
/// cache.put(1, "a".into());
/// cache.put(2, "b".into());
/// cache.put(3, "c".into());
/// assert_eq!(cache.size(), 2);
/// # Ok::<(), stowage::ConfigError>(())
/// ```
pub struct CacheBuilder<K, V> {
    id: String,
    clock: Clock,
    base: Option<BaseFactory<K, V>>,
    eviction: EvictionPolicy,
    size: usize,
    clear_interval: Option<Duration>,
    blocking: bool,
    blocking_timeout: Option<Duration>,
    logging: bool,
    #[cfg(feature = "metrics")]
    meter: Option<Meter>,
}

impl<K, V> fmt::Debug for CacheBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("CacheBuilder");
        debug
            .field("id", &self.id)
            .field("custom_base", &self.base.is_some())
            .field("eviction", &self.eviction)
            .field("size", &self.size)
            .field("clear_interval", &self.clear_interval)
            .field("blocking", &self.blocking)
            .field("blocking_timeout", &self.blocking_timeout)
            .field("logging", &self.logging);
        #[cfg(feature = "metrics")]
        debug.field("metered", &self.meter.is_some());
        debug.finish_non_exhaustive()
    }
}

/// The chain below the blocking layer, plus whether and how to block.
struct Assembled<K, V> {
    cache: Box<dyn Cache<K, V>>,
    blocking: bool,
    blocking_timeout: Option<Duration>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    /// Starts a builder for the cache named `id`, with the default settings.
    ///
    /// `clock` measures the clear interval.
    #[must_use]
    pub fn new(id: impl Into<String>, clock: Clock) -> Self {
        Self::from_config(id, &CacheConfig::default(), clock)
    }

    /// Starts a builder for the cache named `id`, with the given settings.
    #[must_use]
    pub fn from_config(id: impl Into<String>, config: &CacheConfig, clock: Clock) -> Self {
        Self {
            id: id.into(),
            clock,
            base: None,
            eviction: config.eviction,
            size: config.size,
            clear_interval: config.flush_interval(),
            blocking: config.blocking,
            blocking_timeout: config.blocking_timeout(),
            logging: config.logging,
            #[cfg(feature = "metrics")]
            meter: None,
        }
    }

    /// Returns the clock the chain will use.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Uses `factory` to create the base store instead of a [`PerpetualCache`].
    #[must_use]
    pub fn implementation<C>(mut self, factory: impl FnOnce(CacheId) -> C + 'static) -> Self
    where
        C: Cache<K, V> + 'static,
    {
        self.base = Some(Box::new(move |id| -> Box<dyn Cache<K, V>> { Box::new(factory(id)) }));
        self
    }

    /// Sets the eviction policy.
    #[must_use]
    pub fn eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Sets the capacity of the eviction policy.
    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Clears the whole cache every `interval`.
    #[must_use]
    pub fn clear_interval(mut self, interval: Duration) -> Self {
        self.clear_interval = Some(interval);
        self
    }

    /// Turns per-key blocking on or off.
    #[must_use]
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Turns per-key blocking on, with waiters giving up after `timeout`.
    #[must_use]
    pub fn blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking = true;
        self.blocking_timeout = Some(timeout);
        self
    }

    /// Turns hit-ratio logging on or off.
    #[must_use]
    pub fn logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// Counts lookups on a counter created from `meter`.
    ///
    /// Lookups are counted by the hit-ratio layer, so this turns logging on.
    #[cfg(feature = "metrics")]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn meter(mut self, meter: &Meter) -> Self {
        self.logging = true;
        self.meter = Some(meter.clone());
        self
    }

    /// Builds the chain.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the identity is empty, or if an eviction policy, clear
    /// interval or blocking timeout was given a zero size or duration.
    pub fn build(self) -> Result<Box<dyn Cache<K, V>>, ConfigError> {
        let assembled = self.assemble()?;
        if !assembled.blocking {
            return Ok(assembled.cache);
        }
        Ok(Box::new(Self::wrap_blocking(assembled.cache, assembled.blocking_timeout)))
    }

    /// Builds the chain behind an [`Arc`], ready to be shared between callers.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_shared(self) -> Result<Arc<dyn Cache<K, V>>, ConfigError> {
        self.build().map(Arc::from)
    }

    /// Builds the chain with a [`BlockingCache`] on the outside, whatever the blocking setting.
    ///
    /// The result keeps [`entry`](BlockingCache::entry) and
    /// [`get_or_populate`](BlockingCache::get_or_populate) reachable, so that a failed or
    /// abandoned population still releases its key.
    ///
    /// # Examples
    ///
    /// ```
    /// use stowage::{Cache, CacheBuilder};
    /// use tick::Clock;
    ///
    /// let cache = CacheBuilder::<u32, String>::new("users", Clock::new_frozen()).build_blocking()?;
    ///
    /// let failed: Result<String, &str> = cache.get_or_populate(&7, || Err("unavailable"));
    /// assert!(failed.is_err());
    /// assert_eq!(cache.locked_keys(), 0);
    ///
    /// let name = cache.get_or_populate(&7, || Ok::<_, &str>("alice".to_string()));
    /// assert_eq!(name.as_deref(), Ok("alice"));
    /// # Ok::<(), stowage::ConfigError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_blocking(self) -> Result<BlockingCache<K, Box<dyn Cache<K, V>>>, ConfigError> {
        let assembled = self.assemble()?;
        Ok(Self::wrap_blocking(assembled.cache, assembled.blocking_timeout))
    }

    fn wrap_blocking(cache: Box<dyn Cache<K, V>>, timeout: Option<Duration>) -> BlockingCache<K, Box<dyn Cache<K, V>>> {
        match timeout {
            Some(timeout) => BlockingCache::with_timeout(cache, timeout),
            None => BlockingCache::new(cache),
        }
    }

    fn assemble(self) -> Result<Assembled<K, V>, ConfigError> {
        let id = CacheId::new(self.id)?;

        let capacity = match (self.eviction, NonZeroUsize::new(self.size)) {
            (EvictionPolicy::None, _) => None,
            (_, Some(capacity)) => Some(capacity),
            (_, None) => return Err(ConfigError::ZeroCapacity { id }),
        };
        if self.clear_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::ZeroDuration {
                id,
                setting: "clear interval",
            });
        }
        if self.blocking_timeout.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::ZeroDuration {
                id,
                setting: "blocking timeout",
            });
        }

        tracing::debug!(
            cache.id = %id,
            cache.eviction = ?self.eviction,
            cache.size = self.size,
            cache.blocking = self.blocking,
            "building cache"
        );

        let mut cache: Box<dyn Cache<K, V>> = match self.base {
            Some(factory) => factory(id),
            None => Box::new(PerpetualCache::new(id)),
        };

        cache = match (self.eviction, capacity) {
            (EvictionPolicy::Lru, Some(capacity)) => Box::new(LruCache::with_capacity(cache, capacity)),
            (EvictionPolicy::Fifo, Some(capacity)) => Box::new(FifoCache::with_capacity(cache, capacity)),
            _ => cache,
        };

        if let Some(interval) = self.clear_interval {
            cache = Box::new(ScheduledCache::new(cache, interval, &self.clock));
        }

        if self.logging {
            #[cfg(feature = "metrics")]
            let logged = match &self.meter {
                Some(meter) => LoggingCache::with_meter(cache, meter),
                None => LoggingCache::new(cache),
            };
            #[cfg(not(feature = "metrics"))]
            let logged = LoggingCache::new(cache);
            cache = Box::new(logged);
        }

        Ok(Assembled {
            cache,
            blocking: self.blocking,
            blocking_timeout: self.blocking_timeout,
        })
    }
}

impl<K, T> CacheBuilder<K, Arc<T>>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    /// Stores values as [`Weak`] handles, keeping `hard_links` recent ones strongly reachable.
    ///
    /// This replaces any base set with [`implementation`](Self::implementation).
    #[must_use]
    pub fn weak_values(mut self, hard_links: usize) -> Self {
        self.base = Some(Box::new(move |id| -> Box<dyn Cache<K, Arc<T>>> {
            Box::new(WeakCache::new(PerpetualCache::<K, Weak<T>>::new(id), hard_links))
        }));
        self
    }
}
