//! Pool counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free pool counters updated on the hot paths.
#[derive(Debug, Default)]
pub(crate) struct AtomicPoolStats {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    borrows: AtomicU64,
    borrow_timeouts: AtomicU64,
    borrow_failures: AtomicU64,
    transfers: AtomicU64,
    tests: AtomicU64,
    test_failures: AtomicU64,
}

impl AtomicPoolStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_borrow(&self) {
        self.borrows.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed borrow; timeouts are counted separately.
    pub(crate) fn record_borrow_error(&self, timed_out: bool) {
        if timed_out {
            self.borrow_timeouts.fetch_add(1, Ordering::Relaxed);
        } else {
            self.borrow_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_transfer(&self) {
        self.transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_test(&self, alive: bool) {
        self.tests.fetch_add(1, Ordering::Relaxed);
        if !alive {
            self.test_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> PoolMetrics {
        PoolMetrics {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            borrows: self.borrows.load(Ordering::Relaxed),
            borrow_timeouts: self.borrow_timeouts.load(Ordering::Relaxed),
            borrow_failures: self.borrow_failures.load(Ordering::Relaxed),
            transfers: self.transfers.load(Ordering::Relaxed),
            tests: self.tests.load(Ordering::Relaxed),
            test_failures: self.test_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct PoolMetrics {
    /// Raw connections created.
    pub connections_created: u64,
    /// Raw connections closed.
    pub connections_closed: u64,
    /// Successful borrows.
    pub borrows: u64,
    /// Borrows that ran out of time.
    pub borrow_timeouts: u64,
    /// Borrows that failed for any other reason.
    pub borrow_failures: u64,
    /// Connections handed directly to a queued borrower.
    pub transfers: u64,
    /// Liveness tests performed.
    pub tests: u64,
    /// Liveness tests that found a dead connection.
    pub test_failures: u64,
}

impl PoolMetrics {
    /// Fraction of borrow attempts that succeeded.
    #[must_use]
    pub fn borrow_success_rate(&self) -> f64 {
        let total = self.borrows + self.borrow_timeouts + self.borrow_failures;
        if total == 0 {
            1.0
        } else {
            self.borrows as f64 / total as f64
        }
    }

    /// Fraction of liveness tests that passed.
    #[must_use]
    pub fn test_success_rate(&self) -> f64 {
        if self.tests == 0 {
            1.0
        } else {
            (self.tests - self.test_failures) as f64 / self.tests as f64
        }
    }

    /// Connections currently open according to the counters.
    #[must_use]
    pub fn connections_open(&self) -> u64 {
        self.connections_created.saturating_sub(self.connections_closed)
    }
}
