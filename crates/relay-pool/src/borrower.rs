//! Per-thread borrow context used for direct connection hand-off.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::Thread;

use parking_lot::Mutex;

use crate::connection::PooledConnection;
use crate::error::PoolError;

/// What a queued borrower is currently waiting on, or has been given.
#[derive(Debug)]
pub(crate) enum BorrowerState {
    /// Not parked; a releaser may hand over a connection.
    Normal,
    /// Parked; a releaser that hands over a connection must unpark.
    Waiting,
    /// A releaser offered this connection.
    Transferred(Arc<PooledConnection>),
    /// The wait ended with this error.
    Failed(PoolError),
}

impl BorrowerState {
    /// Whether a connection or failure may still be delivered.
    pub(crate) fn is_open(&self) -> bool {
        matches!(self, Self::Normal | Self::Waiting)
    }
}

/// Borrow context of one thread against one pool.
///
/// The state is swapped as a whole. `compare_and_set` succeeds only if the
/// stored value is the exact allocation the caller observed, so a concurrent
/// hand-off racing a timeout is detected rather than lost.
#[derive(Debug)]
pub(crate) struct Borrower {
    thread: Thread,
    state: Mutex<Arc<BorrowerState>>,
    last_used: Mutex<Weak<PooledConnection>>,
    interrupted: AtomicBool,
}

impl Borrower {
    pub(crate) fn new(thread: Thread) -> Self {
        Self {
            thread,
            state: Mutex::new(Arc::new(BorrowerState::Normal)),
            last_used: Mutex::new(Weak::new()),
            interrupted: AtomicBool::new(false),
        }
    }

    pub(crate) fn thread(&self) -> &Thread {
        &self.thread
    }

    pub(crate) fn state(&self) -> Arc<BorrowerState> {
        self.state.lock().clone()
    }

    /// Replace the state if it is still `current`.
    pub(crate) fn compare_and_set(&self, current: &Arc<BorrowerState>, new: BorrowerState) -> bool {
        let mut guard = self.state.lock();
        if Arc::ptr_eq(&*guard, current) {
            *guard = Arc::new(new);
            true
        } else {
            false
        }
    }

    /// Plain write back to `Normal`, only valid while no releaser can target
    /// this borrower (not queued, or holding a `Transferred` value).
    pub(crate) fn reset(&self) {
        *self.state.lock() = Arc::new(BorrowerState::Normal);
    }

    /// Deliver a value if the borrower is still open, waking it if parked.
    ///
    /// Returns `false` if the borrower already holds a connection or failure.
    pub(crate) fn offer(&self, value: impl Fn() -> BorrowerState) -> bool {
        loop {
            let state = self.state();
            if !state.is_open() {
                return false;
            }
            if self.compare_and_set(&state, value()) {
                if matches!(*state, BorrowerState::Waiting) {
                    self.thread.unpark();
                }
                return true;
            }
        }
    }

    pub(crate) fn last_used(&self) -> Option<Arc<PooledConnection>> {
        self.last_used.lock().upgrade()
    }

    pub(crate) fn set_last_used(&self, conn: &Arc<PooledConnection>) {
        *self.last_used.lock() = Arc::downgrade(conn);
    }

    pub(crate) fn clear_last_used(&self) {
        *self.last_used.lock() = Weak::new();
    }

    pub(crate) fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.thread.unpark();
    }

    pub(crate) fn interrupt_flag(&self) -> &AtomicBool {
        &self.interrupted
    }

    /// Consume a pending interrupt.
    pub(crate) fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::AcqRel)
    }
}

/// A pool as seen by the per-thread borrower cache.
pub(crate) trait BorrowScope: Send + Sync {
    fn scope_id(&self) -> u64;

    /// `false` once the pool has shut down.
    fn is_open(&self) -> bool;
}

struct CachedBorrower {
    scope: Weak<dyn BorrowScope>,
    borrower: Arc<Borrower>,
}

impl CachedBorrower {
    fn is_stale(&self) -> bool {
        self.scope.upgrade().is_none_or(|scope| !scope.is_open())
    }
}

thread_local! {
    static BORROWERS: RefCell<HashMap<u64, CachedBorrower>> = RefCell::new(HashMap::new());
}

/// Fetch (or lazily create) the calling thread's borrower for a pool.
///
/// The thread-local map holds the only strong reference, so a borrower dies
/// with its thread. Entries of pools that were dropped or closed are pruned
/// whenever a new one is added. The returned flag is `true` when the
/// borrower was just created.
pub(crate) fn current<S: BorrowScope + 'static>(scope: &Arc<S>) -> (Arc<Borrower>, bool) {
    let id = scope.scope_id();
    BORROWERS.with(|cell| {
        let mut map = cell.borrow_mut();
        if let Some(entry) = map.get(&id) {
            return (entry.borrower.clone(), false);
        }
        map.retain(|_, entry| !entry.is_stale());

        let borrower = Arc::new(Borrower::new(std::thread::current()));
        let weak: Weak<dyn BorrowScope> = Arc::<S>::downgrade(scope);
        map.insert(
            id,
            CachedBorrower {
                scope: weak,
                borrower: borrower.clone(),
            },
        );
        (borrower, true)
    })
}

/// Drop the calling thread's borrower for a pool that has shut down.
pub(crate) fn forget(pool_id: u64) {
    let _ = BORROWERS.try_with(|cell| {
        cell.borrow_mut().remove(&pool_id);
    });
}

#[cfg(test)]
fn cached_pool_ids() -> Vec<u64> {
    BORROWERS.with(|cell| {
        let mut ids: Vec<u64> = cell.borrow().keys().copied().collect();
        ids.sort_unstable();
        ids
    })
}
