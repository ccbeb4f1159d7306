// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt, sync::Arc};

use thiserror::Error;

/// The identity of a cache, one per namespace.
///
/// A `CacheId` is assigned when the cache is constructed and never changes. It is cheap to
/// clone and is used by decorators, transaction adapters and log output to name the cache.
///
/// # Examples
///
/// ```
/// use stowage_spi::CacheId;
///
/// let id = CacheId::new("com.example.UserMapper").unwrap();
/// assert_eq!(id.as_str(), "com.example.UserMapper");
///
/// assert!(CacheId::new("").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(Arc<str>);

impl CacheId {
    /// Creates a cache identity.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCacheId`] if `id` is empty or consists only of whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidCacheId> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(InvalidCacheId);
        }
        Ok(Self(Arc::from(id)))
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for CacheId {
    type Error = InvalidCacheId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for CacheId {
    type Error = InvalidCacheId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// The error returned when a cache is given an empty identity.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("cache identity must be a non-empty string")]
pub struct InvalidCacheId;
