//! Driver collaborator traits.
//!
//! The pool never talks to a database directly. A driver supplies a
//! [`ConnectionFactory`] that produces [`RawConnection`]s, and the pool wraps
//! those in [`ProxyConnection`](crate::ProxyConnection) handles.
//!
//! Optional capabilities (`set_schema`, `is_valid`, `set_query_timeout`)
//! default to [`DriverError::Unsupported`]; the pool detects them on the
//! first connection it creates and adapts for the rest of its lifetime.

use std::time::Duration;

use crate::error::DriverError;

/// Transaction isolation levels understood by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Dirty reads allowed.
    ReadUncommitted,
    /// Only committed data is read.
    ReadCommitted,
    /// Rows read in a transaction stay stable.
    RepeatableRead,
    /// Full serializability.
    Serializable,
}

/// A raw, driver-level database session.
///
/// The pool guarantees that at most one thread uses a raw connection at a
/// time, so implementations only need to be `Send`.
pub trait RawConnection: Send {
    /// Enable or disable auto-commit mode.
    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError>;

    /// Current auto-commit mode.
    fn auto_commit(&self) -> Result<bool, DriverError>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Set the transaction isolation level.
    fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<(), DriverError>;

    /// Mark the session read-only or read-write.
    fn set_read_only(&mut self, read_only: bool) -> Result<(), DriverError>;

    /// Switch the current catalog (database).
    fn set_catalog(&mut self, catalog: &str) -> Result<(), DriverError>;

    /// Switch the current schema.
    fn set_schema(&mut self, _schema: &str) -> Result<(), DriverError> {
        Err(DriverError::unsupported("schema"))
    }

    /// Native liveness probe.
    ///
    /// Returns `Ok(false)` when the session is known to be dead.
    fn is_valid(&mut self, _timeout: Duration) -> Result<bool, DriverError> {
        Err(DriverError::unsupported("isValid"))
    }

    /// Create a statement on this session.
    fn create_statement(&mut self) -> Result<Box<dyn RawStatement>, DriverError>;

    /// Close the session.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// A raw, driver-level statement.
pub trait RawStatement: Send {
    /// Limit how long `execute` may run.
    fn set_query_timeout(&mut self, _timeout: Duration) -> Result<(), DriverError> {
        Err(DriverError::unsupported("queryTimeout"))
    }

    /// Execute a SQL statement and return the number of affected rows.
    fn execute(&mut self, sql: &str) -> Result<u64, DriverError>;

    /// Close the statement.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// Creates and destroys raw connections.
///
/// `create` is called while the pool holds its structural lock and from the
/// background creator thread, so it must not call back into the pool.
pub trait ConnectionFactory: Send + Sync {
    /// Open a new raw connection.
    fn create(&self) -> Result<Box<dyn RawConnection>, DriverError>;

    /// Dispose of a raw connection the pool no longer needs.
    fn destroy(&self, mut conn: Box<dyn RawConnection>) -> Result<(), DriverError> {
        conn.close()
    }
}
