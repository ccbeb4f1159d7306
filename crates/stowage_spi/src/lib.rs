// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Service-provider contracts for namespaced result caches.
//!
//! This crate defines the [`Cache`] trait that every cache store and every cache decorator
//! implements, the [`CacheId`] identity assigned to a cache at construction, the composite
//! [`CacheKey`] fingerprint, and the [`Transaction`] contract through which a unit of work
//! reports commit and rollback.
//!
//! # Overview
//!
//! A cache is created once per namespace and shared by every caller of that namespace. The
//! contract is deliberately small: `put`, `get`, `remove`, `clear`, and an advisory `size`.
//! Behaviour such as eviction, expiry or blocking is added by wrapping one cache in another
//! that implements the same trait, see the `stowage` crate.
//!
//! # Implementing a Cache
//!
//! ```
//! use std::collections::HashMap;
//!
//! use parking_lot::Mutex;
//! use stowage_spi::{Cache, CacheId};
//!
//! struct MapCache {
//!     id: CacheId,
//!     map: Mutex<HashMap<String, u32>>,
//! }
//!
//! impl Cache<String, u32> for MapCache {
//!     fn id(&self) -> &CacheId {
//!         &self.id
//!     }
//!
//!     fn put(&self, key: String, value: u32) {
//!         self.map.lock().insert(key, value);
//!     }
//!
//!     fn get(&self, key: &String) -> Option<u32> {
//!         self.map.lock().get(key).copied()
//!     }
//!
//!     fn remove(&self, key: &String) -> Option<u32> {
//!         self.map.lock().remove(key)
//!     }
//!
//!     fn clear(&self) {
//!         self.map.lock().clear();
//!     }
//!
//!     fn size(&self) -> usize {
//!         self.map.lock().len()
//!     }
//! }
//!
//! let cache = MapCache {
//!     id: CacheId::new("users").unwrap(),
//!     map: Mutex::default(),
//! };
//! cache.put("alice".to_string(), 7);
//! assert_eq!(cache.get(&"alice".to_string()), Some(7));
//! ```

mod cache;
mod id;
mod key;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
pub mod transaction;

#[doc(inline)]
pub use cache::{Cache, ReadWriteLock};
#[doc(inline)]
pub use id::{CacheId, InvalidCacheId};
#[doc(inline)]
pub use key::{CacheKey, KeyPart};
#[doc(inline)]
pub use transaction::{Transaction, TransactionError, TransactionOperation};
