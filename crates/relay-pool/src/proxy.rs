//! Caller-facing connection and statement handles.
//!
//! A [`ProxyConnection`] is the only way callers reach a raw connection. It
//! is created for a single borrow and shares a [`ProxyLink`] with the pooled
//! connection so the pool can close it from another thread when the borrow
//! is reclaimed (hold timeout, forced shutdown). Every delegated call checks
//! the link first, so a reclaimed handle fails with
//! [`PoolError::ConnectionClosed`] instead of touching a connection that now
//! belongs to someone else.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::connection::{PooledConnection, dirty};
use crate::driver::{IsolationLevel, RawConnection, RawStatement};
use crate::error::{DriverError, PoolError};

/// Closed flag shared by a handle and the pooled connection it wraps.
#[derive(Debug, Default)]
pub(crate) struct ProxyLink {
    closed: AtomicBool,
}

impl ProxyLink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Mark the handle closed. Only the first caller gets `true`.
    pub(crate) fn close_once(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A borrowed connection.
///
/// Dropping the handle returns the connection to the pool, exactly like
/// calling [`close`](Self::close).
///
/// # Example
///
/// ```rust,ignore
/// let conn = pool.get()?;
/// conn.set_auto_commit(false)?;
/// let mut stmt = conn.create_statement()?;
/// stmt.execute("UPDATE accounts SET balance = balance - 10 WHERE id = 1")?;
/// conn.commit()?;
/// conn.close();
/// ```
pub struct ProxyConnection {
    conn: Arc<PooledConnection>,
    link: Arc<ProxyLink>,
}

impl ProxyConnection {
    pub(crate) fn new(conn: Arc<PooledConnection>) -> Self {
        let link = Arc::new(ProxyLink::new());
        conn.attach_proxy(link.clone());
        conn.touch();
        Self { conn, link }
    }

    fn with_raw<T>(
        &self,
        op: impl FnOnce(&mut dyn RawConnection) -> Result<T, DriverError>,
    ) -> Result<T, PoolError> {
        if self.link.is_closed() {
            return Err(PoolError::ConnectionClosed);
        }
        let mut guard = self.conn.lock_raw();
        if self.link.is_closed() {
            return Err(PoolError::ConnectionClosed);
        }
        let raw = guard.as_deref_mut().ok_or(PoolError::ConnectionClosed)?;
        let value = op(raw)?;
        self.conn.touch();
        Ok(value)
    }

    /// Pool-assigned id of the underlying connection.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.conn.id()
    }

    /// Whether this handle has been closed, by the caller or by the pool.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.link.is_closed()
    }

    /// Enable or disable auto-commit mode.
    pub fn set_auto_commit(&self, enabled: bool) -> Result<(), PoolError> {
        self.with_raw(|raw| raw.set_auto_commit(enabled))?;
        self.conn.mark_dirty(dirty::AUTO_COMMIT);
        Ok(())
    }

    /// Current auto-commit mode.
    pub fn auto_commit(&self) -> Result<bool, PoolError> {
        self.with_raw(|raw| raw.auto_commit())
    }

    /// Commit the current transaction.
    pub fn commit(&self) -> Result<(), PoolError> {
        self.with_raw(|raw| raw.commit())?;
        self.conn.clear_dirty(dirty::UNCOMMITTED);
        Ok(())
    }

    /// Roll back the current transaction.
    pub fn rollback(&self) -> Result<(), PoolError> {
        self.with_raw(|raw| raw.rollback())?;
        self.conn.clear_dirty(dirty::UNCOMMITTED);
        Ok(())
    }

    /// Set the transaction isolation level.
    pub fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<(), PoolError> {
        self.with_raw(|raw| raw.set_transaction_isolation(level))?;
        self.conn.mark_dirty(dirty::ISOLATION);
        Ok(())
    }

    /// Mark the session read-only or read-write.
    pub fn set_read_only(&self, read_only: bool) -> Result<(), PoolError> {
        self.with_raw(|raw| raw.set_read_only(read_only))?;
        self.conn.mark_dirty(dirty::READ_ONLY);
        Ok(())
    }

    /// Switch the current catalog.
    pub fn set_catalog(&self, catalog: &str) -> Result<(), PoolError> {
        self.with_raw(|raw| raw.set_catalog(catalog))?;
        self.conn.mark_dirty(dirty::CATALOG);
        Ok(())
    }

    /// Switch the current schema.
    pub fn set_schema(&self, schema: &str) -> Result<(), PoolError> {
        self.with_raw(|raw| raw.set_schema(schema))?;
        self.conn.mark_dirty(dirty::SCHEMA);
        Ok(())
    }

    /// Run the driver's validity check on this connection.
    pub fn is_valid(&self, timeout: Duration) -> Result<bool, PoolError> {
        self.with_raw(|raw| raw.is_valid(timeout))
    }

    /// Create a statement bound to this handle.
    pub fn create_statement(&self) -> Result<ProxyStatement, PoolError> {
        let stmt = self.with_raw(|raw| raw.create_statement())?;
        Ok(ProxyStatement {
            stmt: Some(stmt),
            conn: self.conn.clone(),
            link: self.link.clone(),
        })
    }

    /// Return the connection to the pool.
    ///
    /// Closing an already closed handle does nothing.
    pub fn close(self) {
        drop(self);
    }

    /// Discard the underlying connection instead of returning it.
    ///
    /// Use this when the session is known to be broken; the pool closes it
    /// and creates a replacement on demand.
    pub fn abandon(self) {
        if self.link.close_once() {
            self.conn.abandon();
        }
    }
}

impl Drop for ProxyConnection {
    fn drop(&mut self) {
        if self.link.close_once() {
            tracing::trace!(connection_id = self.conn.id(), "returning connection to pool");
            self.conn.return_to_pool();
        }
    }
}

impl std::fmt::Debug for ProxyConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConnection")
            .field("id", &self.conn.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A statement created from a [`ProxyConnection`].
///
/// Fails with [`PoolError::ConnectionClosed`] once it or its connection
/// handle has been closed.
pub struct ProxyStatement {
    stmt: Option<Box<dyn RawStatement>>,
    conn: Arc<PooledConnection>,
    link: Arc<ProxyLink>,
}

impl ProxyStatement {
    fn raw(&mut self) -> Result<&mut dyn RawStatement, PoolError> {
        if self.link.is_closed() {
            return Err(PoolError::ConnectionClosed);
        }
        match self.stmt.as_deref_mut() {
            Some(stmt) => Ok(stmt),
            None => Err(PoolError::ConnectionClosed),
        }
    }

    /// Limit how long `execute` may run.
    pub fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), PoolError> {
        self.raw()?.set_query_timeout(timeout)?;
        Ok(())
    }

    /// Execute a SQL statement and return the number of affected rows.
    pub fn execute(&mut self, sql: &str) -> Result<u64, PoolError> {
        let rows = self.raw()?.execute(sql)?;
        self.conn.mark_dirty(dirty::UNCOMMITTED);
        self.conn.touch();
        Ok(rows)
    }

    /// Whether this statement can no longer be used.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stmt.is_none() || self.link.is_closed()
    }

    /// Close the statement.
    pub fn close(mut self) -> Result<(), PoolError> {
        match self.stmt.take() {
            Some(mut stmt) => Ok(stmt.close()?),
            None => Ok(()),
        }
    }
}

impl Drop for ProxyStatement {
    fn drop(&mut self) {
        if let Some(mut stmt) = self.stmt.take() {
            if let Err(e) = stmt.close() {
                tracing::debug!(connection_id = self.conn.id(), error = %e, "error closing statement");
            }
        }
    }
}

impl std::fmt::Debug for ProxyStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyStatement")
            .field("connection_id", &self.conn.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}
