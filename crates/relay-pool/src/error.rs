//! Pool error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during pool operations.
///
/// `PoolError` is `Clone` because a single failure is handed to a parked
/// borrower by another thread (a background creation failure, or a pool
/// shutdown) and then returned from that borrower's `get()` call.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// No connection became available within the deadline.
    #[error("no connection available within {0:?}")]
    Timeout(Duration),

    /// The waiting thread was interrupted through [`Pool::interrupt`](crate::Pool::interrupt).
    #[error("borrow interrupted while waiting for a connection")]
    Interrupted,

    /// Pool is closed, resetting, or was never initialized.
    #[error("pool is closed")]
    PoolClosed,

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),

    /// The connection factory failed to create a raw connection.
    #[error("failed to create connection: {0}")]
    FactoryFailure(#[source] DriverError),

    /// `init` was called on a pool that is not uninitialized.
    #[error("pool has already been initialized")]
    AlreadyInitialized,

    /// The connection handle has been closed.
    ///
    /// Returned for any operation on a handle after the caller closed it,
    /// after hold-timeout eviction, or after pool shutdown.
    #[error("connection is closed")]
    ConnectionClosed,

    /// A delegated driver operation failed.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// A background worker thread could not be started.
    #[error("failed to start pool worker: {0}")]
    WorkerSpawn(String),
}

impl PoolError {
    /// Check if this error is a borrow timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this error is transient and a later borrow may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Interrupted | Self::FactoryFailure(_)
        )
    }
}

/// Errors reported by a driver implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DriverError {
    /// The driver does not implement an optional capability.
    #[error("operation not supported by driver: {0}")]
    Unsupported(String),

    /// The driver operation failed.
    #[error("{0}")]
    Failed(String),

    /// The raw connection or statement is already closed.
    #[error("raw resource is closed")]
    Closed,
}

impl DriverError {
    /// Create a failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Create an "unsupported capability" error.
    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported(capability.into())
    }

    /// Check if the driver rejected the operation as unsupported.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}
