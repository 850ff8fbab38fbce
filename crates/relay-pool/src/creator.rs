//! Background connection creation.
//!
//! Borrowers never wait on a factory call made on their behalf by another
//! borrower. When a connection is lost (failed test, idle eviction, abandon)
//! the pool asks the creator for a replacement; the creator builds it on its
//! own thread and hands it straight to the head of the wait queue. A
//! creation failure is handed to that waiter instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread::{JoinHandle, Thread};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::connection::ConnectionState;
use crate::error::PoolError;
use crate::pool::PoolInner;

/// Creator thread state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum CreatorState {
    Working = 0,
    Waiting = 1,
    Dead = 2,
}

impl CreatorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Working,
            1 => Self::Waiting,
            _ => Self::Dead,
        }
    }
}

/// Replenishes connections for queued borrowers on a dedicated thread.
#[derive(Debug)]
pub(crate) struct ConnectionCreator {
    need: AtomicUsize,
    state: AtomicU8,
    notify_lock: Mutex<()>,
    thread: OnceCell<Thread>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionCreator {
    pub(crate) fn new() -> Self {
        Self {
            need: AtomicUsize::new(0),
            state: AtomicU8::new(CreatorState::Waiting as u8),
            notify_lock: Mutex::new(()),
            thread: OnceCell::new(),
            handle: Mutex::new(None),
        }
    }

    fn state(&self) -> CreatorState {
        CreatorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: CreatorState, to: CreatorState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Pending creation requests.
    pub(crate) fn pending(&self) -> usize {
        self.need.load(Ordering::Acquire)
    }

    /// Start the creator thread.
    pub(crate) fn start(&self, pool: &Arc<PoolInner>, name: &str) -> Result<(), PoolError> {
        let worker = pool.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{name}-creator"))
            .spawn(move || worker.creator().run(&worker))
            .map_err(|e| PoolError::WorkerSpawn(e.to_string()))?;
        let _ = self.thread.set(handle.thread().clone());
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Ask for one more connection.
    ///
    /// Requests beyond the free capacity of the pool are dropped, so the
    /// number of connections plus outstanding requests never exceeds `max`.
    pub(crate) fn request(&self, total: impl Fn() -> usize, max: usize) {
        if total() + self.pending() >= max {
            return;
        }
        let _guard = self.notify_lock.lock();
        if total() + self.pending() < max {
            self.need.fetch_add(1, Ordering::AcqRel);
            if self.transition(CreatorState::Waiting, CreatorState::Working) {
                if let Some(thread) = self.thread.get() {
                    thread.unpark();
                }
            }
            tracing::debug!(pending = self.pending(), "connection replenishment requested");
        }
    }

    fn take_request(&self) -> bool {
        self.need
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn run(&self, pool: &Arc<PoolInner>) {
        loop {
            match self.state() {
                CreatorState::Dead => break,
                CreatorState::Waiting => {
                    if self.pending() > 0 {
                        self.transition(CreatorState::Waiting, CreatorState::Working);
                    } else {
                        std::thread::park();
                    }
                    continue;
                }
                CreatorState::Working => {}
            }

            while self.take_request() {
                if self.state() == CreatorState::Dead {
                    return;
                }
                if !pool.has_waiters() || !pool.is_normal() {
                    continue;
                }
                match pool.create_for_waiter(ConnectionState::Using) {
                    Ok(Some(conn)) => pool.recycle(&conn),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "background connection creation failed");
                        pool.transfer_exception(e);
                    }
                }
            }

            self.transition(CreatorState::Working, CreatorState::Waiting);
        }
    }

    /// Stop the creator thread and wait for it to exit.
    pub(crate) fn shutdown(&self) {
        self.state.store(CreatorState::Dead as u8, Ordering::Release);
        if let Some(thread) = self.thread.get() {
            thread.unpark();
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
                tracing::warn!("connection creator thread panicked");
            }
        }
    }
}
