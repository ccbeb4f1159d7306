// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The contract of a transactional resource.
//!
//! A [`Transaction`] wraps a database connection for one unit of work. Its implementation
//! (connection pooling, driver calls, isolation levels) lives outside this workspace; the
//! cache layer only needs to learn when a unit of work commits or rolls back.

use std::{error::Error as StdError, fmt, time::Duration};

use thiserror::Error;

/// Boxed cause of a resource-level failure.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// A transactional resource bound to one unit of work.
///
/// Every operation may fail with a resource-level [`TransactionError`]. The cache layer
/// never retries those; retry policy belongs to whoever drives the transaction.
pub trait Transaction: Send {
    /// The connection type handed out by this transaction.
    type Connection;

    /// Returns the connection of this unit of work, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be obtained.
    fn connection(&mut self) -> Result<&mut Self::Connection, TransactionError>;

    /// Commits the unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying resource fails to commit.
    fn commit(&mut self) -> Result<(), TransactionError>;

    /// Rolls back the unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying resource fails to roll back.
    fn rollback(&mut self) -> Result<(), TransactionError>;

    /// Releases the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying resource fails to close.
    fn close(&mut self) -> Result<(), TransactionError>;

    /// Returns the statement timeout configured for this unit of work, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout cannot be read from the underlying resource.
    fn timeout(&self) -> Result<Option<Duration>, TransactionError>;
}

/// The transaction operation during which a resource failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionOperation {
    /// Obtaining the connection.
    Connect,
    /// Committing.
    Commit,
    /// Rolling back.
    Rollback,
    /// Closing.
    Close,
    /// Reading the timeout.
    Timeout,
}

impl TransactionOperation {
    /// Returns a stable lowercase name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Close => "close",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for TransactionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by a transactional resource.
///
/// This is always a resource-level failure (connectivity, driver). Normal absence of data is
/// never reported through this type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransactionError {
    /// The transaction was used after it had been closed.
    #[error("transaction is closed")]
    Closed,

    /// The underlying resource failed.
    #[error("transaction {operation} failed")]
    Resource {
        /// The operation that failed.
        operation: TransactionOperation,
        /// What the resource reported.
        #[source]
        source: BoxError,
    },
}

impl TransactionError {
    /// Creates a resource failure for `operation`.
    pub fn resource(operation: TransactionOperation, source: impl Into<BoxError>) -> Self {
        Self::Resource {
            operation,
            source: source.into(),
        }
    }

    /// Returns the failed operation, if this is a resource failure.
    #[must_use]
    pub fn operation(&self) -> Option<TransactionOperation> {
        match self {
            Self::Closed => None,
            Self::Resource { operation, .. } => Some(*operation),
        }
    }
}
