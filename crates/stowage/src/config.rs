// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use serde::Deserialize;

use crate::DEFAULT_CAPACITY;

/// How a cache bounds the number of entries it keeps.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum EvictionPolicy {
    /// Evict the least recently used key.
    #[default]
    Lru,
    /// Evict the oldest inserted key.
    Fifo,
    /// Never evict.
    None,
}

/// Declarative description of a cache chain.
///
/// Every field has a default, so an empty document yields an LRU cache of 1024 entries with
/// hit-ratio logging and no blocking.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use stowage::{CacheConfig, EvictionPolicy};
///
/// let config: CacheConfig = serde_json::from_str(
///     r#"{ "eviction": "fifo", "size": 64, "flush_interval_ms": 60000, "blocking": true }"#,
/// )?;
///
/// assert_eq!(config.eviction, EvictionPolicy::Fifo);
/// assert_eq!(config.flush_interval(), Some(Duration::from_secs(60)));
/// assert!(config.logging);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Eviction policy.
    pub eviction: EvictionPolicy,
    /// Maximum number of entries kept by the eviction policy.
    pub size: usize,
    /// Clear the whole cache at this interval, in milliseconds.
    pub flush_interval_ms: Option<u64>,
    /// Let one caller populate a missing key while others wait.
    pub blocking: bool,
    /// Give up waiting for another populator after this many milliseconds.
    pub blocking_timeout_ms: Option<u64>,
    /// Log the hit ratio on every read.
    pub logging: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            eviction: EvictionPolicy::default(),
            size: DEFAULT_CAPACITY,
            flush_interval_ms: None,
            blocking: false,
            blocking_timeout_ms: None,
            logging: true,
        }
    }
}

impl CacheConfig {
    /// Returns the clear interval, if one is configured.
    #[must_use]
    pub fn flush_interval(&self) -> Option<Duration> {
        self.flush_interval_ms.map(Duration::from_millis)
    }

    /// Returns the blocking timeout, if one is configured.
    #[must_use]
    pub fn blocking_timeout(&self) -> Option<Duration> {
        self.blocking_timeout_ms.map(Duration::from_millis)
    }
}
