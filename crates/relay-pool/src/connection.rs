//! Pooled connection state and lifecycle.
//!
//! A [`PooledConnection`] owns exactly one raw connection. Its state field is
//! the single point of mutual exclusion for that raw connection: only the
//! thread that moved it from `Idle` to `Using` (or that received it through a
//! fair hand-off) may use or close it.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use crate::driver::{IsolationLevel, RawConnection};
use crate::error::{DriverError, PoolError};
use crate::pool::PoolInner;
use crate::proxy::ProxyLink;

/// Connection state tracked by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum ConnectionState {
    /// Connection is idle and available for use.
    Idle = 0,
    /// Connection is owned by a borrower.
    Using = 1,
    /// Connection has been removed and must never be reused.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Using,
            _ => Self::Closed,
        }
    }
}

/// Session defaults applied to new connections and restored on return.
#[derive(Debug, Clone)]
pub(crate) struct SessionDefaults {
    pub(crate) auto_commit: bool,
    pub(crate) isolation: Option<IsolationLevel>,
    pub(crate) read_only: bool,
    pub(crate) catalog: Option<String>,
    pub(crate) schema: Option<String>,
}

/// Bits recording which session settings a borrower changed.
pub(crate) mod dirty {
    pub(crate) const AUTO_COMMIT: u8 = 1;
    pub(crate) const ISOLATION: u8 = 1 << 1;
    pub(crate) const READ_ONLY: u8 = 1 << 2;
    pub(crate) const CATALOG: u8 = 1 << 3;
    pub(crate) const SCHEMA: u8 = 1 << 4;
    pub(crate) const UNCOMMITTED: u8 = 1 << 5;
}

/// A raw connection managed by the pool.
pub(crate) struct PooledConnection {
    id: u64,
    state: AtomicU8,
    created_at: Instant,
    /// Nanoseconds since `created_at` of the last recorded activity.
    last_access: AtomicU64,
    raw: Mutex<Option<Box<dyn RawConnection>>>,
    dirty: AtomicU8,
    proxy: Mutex<Option<Arc<ProxyLink>>>,
    pool: Weak<PoolInner>,
}

impl PooledConnection {
    pub(crate) fn new(
        id: u64,
        raw: Box<dyn RawConnection>,
        state: ConnectionState,
        pool: Weak<PoolInner>,
    ) -> Self {
        Self {
            id,
            state: AtomicU8::new(state as u8),
            created_at: Instant::now(),
            last_access: AtomicU64::new(0),
            raw: Mutex::new(Some(raw)),
            dirty: AtomicU8::new(0),
            proxy: Mutex::new(None),
            pool,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn compare_and_set(&self, current: ConnectionState, new: ConnectionState) -> bool {
        self.state
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Unconditional write, used by the fair transfer policy and removal.
    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.created_at.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Record activity on this connection.
    pub(crate) fn touch(&self) {
        self.last_access
            .store(self.elapsed_nanos(), Ordering::Release);
    }

    /// Time since the last recorded activity.
    pub(crate) fn idle_for(&self) -> Duration {
        let last = self.last_access.load(Ordering::Acquire);
        Duration::from_nanos(self.elapsed_nanos().saturating_sub(last))
    }

    pub(crate) fn accessed_within(&self, window: Duration) -> bool {
        self.idle_for() < window
    }

    /// Lock the raw connection.
    ///
    /// Returns `None` once the raw connection has been released.
    pub(crate) fn lock_raw(&self) -> MutexGuard<'_, Option<Box<dyn RawConnection>>> {
        self.raw.lock()
    }

    /// Take the raw connection out for disposal. Yields it at most once.
    pub(crate) fn take_raw(&self) -> Option<Box<dyn RawConnection>> {
        self.raw.lock().take()
    }

    pub(crate) fn mark_dirty(&self, bits: u8) {
        self.dirty.fetch_or(bits, Ordering::AcqRel);
    }

    pub(crate) fn clear_dirty(&self, bits: u8) {
        self.dirty.fetch_and(!bits, Ordering::AcqRel);
    }

    /// Attach a fresh wrapper link for a new borrow.
    pub(crate) fn attach_proxy(&self, link: Arc<ProxyLink>) {
        *self.proxy.lock() = Some(link);
    }

    /// Ask the current wrapper to close itself and hand the connection back.
    ///
    /// Returns `true` if this call closed the wrapper.
    pub(crate) fn try_set_as_closed(self: &Arc<Self>) -> bool {
        let link = self.proxy.lock().clone();
        match link {
            Some(link) if link.close_once() => {
                tracing::debug!(connection_id = self.id, "borrowed connection reclaimed by pool");
                self.return_to_pool();
                true
            }
            _ => false,
        }
    }

    /// Give the connection back to its owning pool after the wrapper closed.
    pub(crate) fn return_to_pool(self: &Arc<Self>) {
        self.proxy.lock().take();
        match self.pool.upgrade() {
            Some(pool) => pool.return_connection(self),
            None => {
                self.set_state(ConnectionState::Closed);
                if let Some(mut raw) = self.take_raw() {
                    let _ = raw.close();
                }
            }
        }
    }

    /// Report the connection as broken so the pool discards it.
    pub(crate) fn abandon(self: &Arc<Self>) {
        self.proxy.lock().take();
        match self.pool.upgrade() {
            Some(pool) => pool.abandon_on_return(self),
            None => {
                self.set_state(ConnectionState::Closed);
                if let Some(mut raw) = self.take_raw() {
                    let _ = raw.close();
                }
            }
        }
    }

    /// Restore every session setting the borrower changed.
    ///
    /// Uncommitted work is rolled back first when auto-commit is off.
    pub(crate) fn reset_session(
        &self,
        defaults: &SessionDefaults,
        schema_supported: bool,
    ) -> Result<(), PoolError> {
        let bits = self.dirty.swap(0, Ordering::AcqRel);
        if bits == 0 {
            return Ok(());
        }

        let mut guard = self.raw.lock();
        let raw = guard.as_deref_mut().ok_or(PoolError::ConnectionClosed)?;

        if bits & dirty::UNCOMMITTED != 0 && !raw.auto_commit().unwrap_or(true) {
            raw.rollback()?;
        }
        if bits & dirty::AUTO_COMMIT != 0 {
            raw.set_auto_commit(defaults.auto_commit)?;
        }
        if bits & dirty::ISOLATION != 0 {
            if let Some(level) = defaults.isolation {
                raw.set_transaction_isolation(level)?;
            }
        }
        if bits & dirty::READ_ONLY != 0 {
            raw.set_read_only(defaults.read_only)?;
        }
        if bits & dirty::CATALOG != 0 {
            if let Some(catalog) = &defaults.catalog {
                raw.set_catalog(catalog)?;
            }
        }
        if bits & dirty::SCHEMA != 0 && schema_supported {
            if let Some(schema) = &defaults.schema {
                match raw.set_schema(schema) {
                    Err(e) if !e.is_unsupported() => return Err(e.into()),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Release the raw connection through the factory. Idempotent.
    pub(crate) fn close_raw(&self, destroy: impl FnOnce(Box<dyn RawConnection>) -> Result<(), DriverError>) {
        if let Some(raw) = self.take_raw() {
            if let Err(e) = destroy(raw) {
                tracing::debug!(connection_id = self.id, error = %e, "error closing raw connection");
            }
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("idle_for", &self.idle_for())
            .finish()
    }
}
