// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Composite cache key.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

const DEFAULT_MULTIPLIER: u64 = 37;
const DEFAULT_HASH: u64 = 17;

/// One component of a [`CacheKey`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum KeyPart {
    /// An absent value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer. Narrower integer types widen into this variant.
    Int(i64),
    /// A string, such as a statement id or a bound text parameter.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl KeyPart {
    fn fingerprint(&self) -> u64 {
        match self {
            Self::Null => xxh3_64(&[0]),
            Self::Bool(value) => xxh3_64(&[1, u8::from(*value)]),
            Self::Int(value) => xxh3_64_with_seed(&value.to_le_bytes(), 2),
            Self::Text(value) => xxh3_64_with_seed(value.as_bytes(), 3),
            Self::Bytes(value) => xxh3_64_with_seed(value, 4),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Bytes(value) => value.iter().try_for_each(|byte| write!(f, "{byte:02x}")),
        }
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&[u8]> for KeyPart {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for KeyPart {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T> From<Option<T>> for KeyPart
where
    T: Into<Self>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// An order-sensitive composite fingerprint used as a cache key.
///
/// A query result is typically identified by several values: the statement id, the paging
/// bounds, the SQL text and every bound parameter. `CacheKey` folds them into a running hash
/// and checksum as they are added, so that hashing is O(1) and most inequality checks are
/// decided without comparing the parts themselves.
///
/// # Examples
///
/// ```
/// use stowage_spi::CacheKey;
///
/// let mut a = CacheKey::new();
/// a.update("selectUser");
/// a.update(42);
///
/// let b = CacheKey::from_parts(["selectUser".into(), 42.into()]);
/// assert_eq!(a, b);
///
/// let mut c = CacheKey::new();
/// c.update(42);
/// c.update("selectUser");
/// assert_ne!(a, c);
/// ```
#[derive(Clone, Debug)]
pub struct CacheKey {
    hash: u64,
    checksum: u64,
    count: u64,
    parts: Vec<KeyPart>,
}

impl CacheKey {
    /// Creates an empty key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hash: DEFAULT_HASH,
            checksum: 0,
            count: 0,
            parts: Vec::new(),
        }
    }

    /// Creates a key from a sequence of parts, in order.
    #[must_use]
    pub fn from_parts(parts: impl IntoIterator<Item = KeyPart>) -> Self {
        let mut key = Self::new();
        key.update_all(parts);
        key
    }

    /// Appends one part to the key.
    pub fn update(&mut self, part: impl Into<KeyPart>) {
        let part = part.into();
        let base = part.fingerprint();

        self.count += 1;
        self.checksum = self.checksum.wrapping_add(base);
        let base = base.wrapping_mul(self.count);
        self.hash = DEFAULT_MULTIPLIER.wrapping_mul(self.hash).wrapping_add(base);

        self.parts.push(part);
    }

    /// Appends every part of `parts`, in order.
    pub fn update_all(&mut self, parts: impl IntoIterator<Item = KeyPart>) {
        for part in parts {
            self.update(part);
        }
    }

    /// Returns the number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns `true` if no part has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Returns the parts in insertion order.
    #[must_use]
    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.checksum == other.checksum && self.count == other.count && self.parts == other.parts
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.checksum)?;
        for part in &self.parts {
            write!(f, ":{part}")?;
        }
        Ok(())
    }
}
