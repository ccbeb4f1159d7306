// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Recording test doubles for the cache and transaction contracts.
//!
//! [`MockCache`] stores values in memory and records every operation, which makes it easy to
//! check what a decorator forwarded to the layer below it. [`MockTransaction`] records calls
//! and can be told to fail selected operations.

use std::{collections::HashMap, hash::Hash, sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{Cache, CacheId, Transaction, TransactionError, TransactionOperation};

/// Recorded cache operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp<K, V> {
    /// A put with the given key and value.
    Put {
        /// The key that was stored.
        key: K,
        /// The value that was stored.
        value: V,
    },
    /// A get for the given key.
    Get(K),
    /// A remove for the given key.
    Remove(K),
    /// A clear.
    Clear,
}

/// An in-memory cache that records every operation.
///
/// Clones share storage and the operation log.
///
/// # Examples
///
/// ```
/// use stowage_spi::{Cache, testing::{CacheOp, MockCache}};
///
/// let cache = MockCache::<&str, i32>::new("mock");
/// cache.put("key", 42);
/// assert_eq!(cache.get(&"key"), Some(42));
///
/// assert_eq!(cache.operations(), vec![
///     CacheOp::Put { key: "key", value: 42 },
///     CacheOp::Get("key"),
/// ]);
/// ```
pub struct MockCache<K, V> {
    id: CacheId,
    data: Arc<Mutex<HashMap<K, V>>>,
    operations: Arc<Mutex<Vec<CacheOp<K, V>>>>,
}

impl<K, V> std::fmt::Debug for MockCache<K, V>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCache")
            .field("id", &self.id)
            .field("data", &self.data)
            .field("operations", &self.operations)
            .finish()
    }
}

impl<K, V> Clone for MockCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
        }
    }
}

impl<K, V> MockCache<K, V> {
    /// Creates an empty mock cache.
    ///
    /// # Panics
    ///
    /// Panics if `id` is empty.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: CacheId::new(id).expect("mock cache id must be non-empty"),
            data: Arc::default(),
            operations: Arc::default(),
        }
    }
}

impl<K, V> MockCache<K, V>
where
    K: Eq + Hash,
{
    /// Returns true if the store holds `key`, without recording an operation.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Returns the number of stored entries, without recording an operation.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }
}

impl<K, V> MockCache<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Returns a copy of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<CacheOp<K, V>> {
        self.operations.lock().clone()
    }

    /// Forgets all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn record(&self, op: CacheOp<K, V>) {
        self.operations.lock().push(op);
    }
}

impl<K, V> Cache<K, V> for MockCache<K, V>
where
    K: Clone + Eq + Hash + Send,
    V: Clone + Send,
{
    fn id(&self) -> &CacheId {
        &self.id
    }

    fn put(&self, key: K, value: V) {
        self.record(CacheOp::Put {
            key: key.clone(),
            value: value.clone(),
        });
        self.data.lock().insert(key, value);
    }

    fn get(&self, key: &K) -> Option<V> {
        self.record(CacheOp::Get(key.clone()));
        self.data.lock().get(key).cloned()
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.record(CacheOp::Remove(key.clone()));
        self.data.lock().remove(key)
    }

    fn clear(&self) {
        self.record(CacheOp::Clear);
        self.data.lock().clear();
    }

    fn size(&self) -> usize {
        self.data.lock().len()
    }
}

/// Connection handed out by [`MockTransaction`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MockConnection {
    /// Number of times the connection was requested.
    pub checkouts: u32,
}

#[derive(Debug, Default)]
struct MockTransactionState {
    calls: Vec<TransactionOperation>,
    failing: Vec<TransactionOperation>,
    checkouts: u32,
    timeout: Option<Duration>,
    closed: bool,
}

/// A transaction double that records calls and fails on demand.
///
/// Clones share state, so a test can keep one clone while handing another to the code under
/// test.
#[derive(Clone, Debug, Default)]
pub struct MockTransaction {
    state: Arc<Mutex<MockTransactionState>>,
    connection: MockConnection,
}

impl MockTransaction {
    /// Creates a transaction that succeeds at everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future call of `operation` fail with a resource error.
    pub fn fail_on(&self, operation: TransactionOperation) {
        self.state.lock().failing.push(operation);
    }

    /// Sets the value reported by [`Transaction::timeout`].
    pub fn set_timeout(&self, timeout: Duration) {
        self.state.lock().timeout = Some(timeout);
    }

    /// Returns the operations called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<TransactionOperation> {
        self.state.lock().calls.clone()
    }

    /// Returns how many times a connection was requested across all clones.
    #[must_use]
    pub fn checkouts(&self) -> u32 {
        self.state.lock().checkouts
    }

    /// Returns true once `close` has succeeded.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn enter(&self, operation: TransactionOperation) -> Result<(), TransactionError> {
        let mut state = self.state.lock();
        state.calls.push(operation);
        if state.closed {
            return Err(TransactionError::Closed);
        }
        if state.failing.contains(&operation) {
            return Err(TransactionError::resource(operation, format!("mock: {operation} failed")));
        }
        Ok(())
    }
}

impl Transaction for MockTransaction {
    type Connection = MockConnection;

    fn connection(&mut self) -> Result<&mut Self::Connection, TransactionError> {
        self.enter(TransactionOperation::Connect)?;
        let mut state = self.state.lock();
        state.checkouts += 1;
        self.connection.checkouts = state.checkouts;
        drop(state);
        Ok(&mut self.connection)
    }

    fn commit(&mut self) -> Result<(), TransactionError> {
        self.enter(TransactionOperation::Commit)
    }

    fn rollback(&mut self) -> Result<(), TransactionError> {
        self.enter(TransactionOperation::Rollback)
    }

    fn close(&mut self) -> Result<(), TransactionError> {
        self.enter(TransactionOperation::Close)?;
        self.state.lock().closed = true;
        Ok(())
    }

    fn timeout(&self) -> Result<Option<Duration>, TransactionError> {
        self.enter(TransactionOperation::Timeout)?;
        Ok(self.state.lock().timeout)
    }
}
