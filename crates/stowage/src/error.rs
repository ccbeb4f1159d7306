// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use stowage_spi::{CacheId, InvalidCacheId};
use thiserror::Error;

/// The error returned when a cache chain cannot be built.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The cache was given an empty identity.
    #[error(transparent)]
    InvalidId(#[from] InvalidCacheId),

    /// An eviction policy was requested with room for no entries.
    #[error("cache `{id}` has an eviction policy but a capacity of zero")]
    ZeroCapacity {
        /// The cache being built.
        id: CacheId,
    },

    /// A clear interval or blocking timeout of zero was requested.
    #[error("cache `{id}` has a zero {setting}")]
    ZeroDuration {
        /// The cache being built.
        id: CacheId,
        /// The offending setting.
        setting: &'static str,
    },
}
