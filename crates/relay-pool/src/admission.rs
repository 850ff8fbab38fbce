//! Bounded admission control for borrow attempts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::PoolError;

/// Stand-in deadline distance for timeouts too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `base + offset`, saturating at a far-future instant instead of panicking
/// on overflow, so `Duration::MAX` means "wait forever".
pub(crate) fn instant_after(base: Instant, offset: Duration) -> Instant {
    base.checked_add(offset)
        .or_else(|| base.checked_add(FAR_FUTURE.min(offset)))
        .unwrap_or(base)
}

/// Counting semaphore limiting concurrent borrow attempts.
///
/// In fair mode permits are granted strictly in arrival order; otherwise any
/// waiter may take a freed permit.
#[derive(Debug)]
pub(crate) struct AdmissionSemaphore {
    permits: u32,
    fair: bool,
    state: Mutex<SemaphoreState>,
    released: Condvar,
}

#[derive(Debug)]
struct SemaphoreState {
    available: u32,
    next_ticket: u64,
    waiters: VecDeque<u64>,
}

impl SemaphoreState {
    fn leave(&mut self, ticket: u64) {
        if let Some(pos) = self.waiters.iter().position(|t| *t == ticket) {
            self.waiters.remove(pos);
        }
    }
}

/// A held permit. Released on drop.
#[derive(Debug)]
#[must_use = "the permit is released as soon as it is dropped"]
pub(crate) struct AdmissionPermit<'a> {
    semaphore: &'a AdmissionSemaphore,
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

impl AdmissionSemaphore {
    pub(crate) fn new(permits: u32, fair: bool) -> Self {
        Self {
            permits,
            fair,
            state: Mutex::new(SemaphoreState {
                available: permits,
                next_ticket: 0,
                waiters: VecDeque::new(),
            }),
            released: Condvar::new(),
        }
    }

    /// Acquire a permit, waiting at most `timeout`.
    ///
    /// A pending interrupt (set before or during the wait) is consumed and
    /// reported as [`PoolError::Interrupted`].
    pub(crate) fn acquire(
        &self,
        timeout: Duration,
        interrupted: &AtomicBool,
    ) -> Result<AdmissionPermit<'_>, PoolError> {
        let deadline = instant_after(Instant::now(), timeout);
        let mut state = self.state.lock();

        if interrupted.swap(false, Ordering::AcqRel) {
            return Err(PoolError::Interrupted);
        }
        if state.available > 0 && (!self.fair || state.waiters.is_empty()) {
            state.available -= 1;
            return Ok(AdmissionPermit { semaphore: self });
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_back(ticket);

        loop {
            if interrupted.swap(false, Ordering::AcqRel) {
                state.leave(ticket);
                self.released.notify_all();
                return Err(PoolError::Interrupted);
            }
            let my_turn = !self.fair || state.waiters.front() == Some(&ticket);
            if state.available > 0 && my_turn {
                state.leave(ticket);
                state.available -= 1;
                if state.available > 0 {
                    self.released.notify_all();
                }
                return Ok(AdmissionPermit { semaphore: self });
            }
            if Instant::now() >= deadline {
                state.leave(ticket);
                // The head may have changed; let the new head re-check.
                self.released.notify_all();
                return Err(PoolError::Timeout(timeout));
            }
            self.released.wait_until(&mut state, deadline);
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.available += 1;
        drop(state);
        self.released.notify_all();
    }

    /// Wake every waiter so it re-checks its interrupt flag.
    pub(crate) fn wake_all(&self) {
        let _state = self.state.lock();
        self.released.notify_all();
    }

    /// Permits currently held.
    pub(crate) fn acquired(&self) -> u32 {
        self.permits - self.state.lock().available
    }

    /// Threads waiting for a permit.
    pub(crate) fn queue_len(&self) -> usize {
        self.state.lock().waiters.len()
    }

    pub(crate) fn has_queued(&self) -> bool {
        !self.state.lock().waiters.is_empty()
    }

    pub(crate) fn permits(&self) -> u32 {
        self.permits
    }
}
