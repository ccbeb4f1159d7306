// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Decorator-composable result caches.
//!
//! This crate provides a base store, [`PerpetualCache`], and a set of decorators that each
//! add one behaviour on top of any other [`Cache`]:
//!
//! - [`LruCache`] and [`FifoCache`] bound the number of entries
//! - [`ScheduledCache`] drops everything once a clear interval has elapsed
//! - [`WeakCache`] lets values be reclaimed once nobody holds them any more
//! - [`LoggingCache`] tracks and logs the hit ratio
//! - [`BlockingCache`] lets exactly one caller populate a missing key while the others wait
//!
//! [`TransactionalCache`], [`TransactionalCacheManager`] and [`CachingTransaction`] connect a
//! cache to a unit of work so that a rollback removes speculative entries and releases any
//! waiting callers.
//!
//! # Examples
//!
//! ## Assembling a chain by hand
//!
//! ```
//! use std::num::NonZeroUsize;
//!
//! use stowage::{BlockingCache, Cache, CacheId, LruCache, PerpetualCache};
//!
//! let id = CacheId::new("users")?;
//! let capacity = NonZeroUsize::new(2).unwrap();
//! let cache = BlockingCache::new(LruCache::with_capacity(PerpetualCache::new(id), capacity));
//!
//! let value = cache.get_or_populate(&"alice".to_string(), || Ok::<_, std::io::Error>(7))?;
//! assert_eq!(value, 7);
//! assert_eq!(cache.get(&"alice".to_string()), Some(7));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Building a chain from configuration
//!
//! ```
//! use stowage::{Cache, CacheBuilder, EvictionPolicy};
//! use tick::runtime::InactiveClock;
//!
//! // Only the clock's time is read, so its timer driver is not needed.
//! let (clock, _driver) = InactiveClock::default().activate();
//!
//! let cache = CacheBuilder::<String, u64>::new("orders", clock)
//!     .eviction(EvictionPolicy::Fifo)
//!     .size(512)
//!     .build_blocking()?;
//!
//! let total = cache.get_or_populate(&"order-1".to_string(), || Ok::<_, std::io::Error>(99))?;
//! assert_eq!(total, 99);
//! assert_eq!(cache.id().as_str(), "orders");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod blocking;
mod builder;
mod config;
mod error;
mod fifo;
mod logging;
mod lru;
mod perpetual;
mod scheduled;
pub mod transactional;
mod weak;

#[doc(inline)]
pub use blocking::{BlockingCache, Lookup, PopulateGuard};
#[doc(inline)]
pub use builder::CacheBuilder;
#[doc(inline)]
pub use config::{CacheConfig, EvictionPolicy};
#[doc(inline)]
pub use error::ConfigError;
#[doc(inline)]
pub use fifo::FifoCache;
#[doc(inline)]
pub use logging::LoggingCache;
#[doc(inline)]
pub use lru::LruCache;
#[doc(inline)]
pub use perpetual::PerpetualCache;
#[doc(inline)]
pub use scheduled::{DEFAULT_CLEAR_INTERVAL, ScheduledCache};
#[doc(inline)]
pub use stowage_spi::{Cache, CacheId, CacheKey, InvalidCacheId, KeyPart, ReadWriteLock, Transaction, TransactionError};
#[doc(inline)]
pub use transactional::{CachingTransaction, TransactionalCache, TransactionalCacheManager};
#[doc(inline)]
pub use weak::{DEFAULT_HARD_LINKS, WeakCache};

/// Default capacity of the eviction decorators.
pub const DEFAULT_CAPACITY: usize = 1024;
