//! Periodic idle and hold-timeout scan.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::admission::instant_after;
use crate::error::PoolError;
use crate::pool::PoolInner;

/// Runs [`PoolInner::close_idle_timeout`] at a fixed rate.
#[derive(Debug, Default)]
pub(crate) struct IdleScanner {
    stopped: Mutex<bool>,
    signal: Condvar,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IdleScanner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start scanning after `initial_delay`, then every `period`.
    pub(crate) fn start(
        &self,
        pool: &Arc<PoolInner>,
        name: &str,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<(), PoolError> {
        let worker = pool.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{name}-idle-scanner"))
            .spawn(move || {
                let scanner = worker.scanner();
                let mut next = instant_after(Instant::now(), initial_delay);
                while scanner.wait_until(next) {
                    worker.close_idle_timeout();
                    next = next_tick(next, period, Instant::now());
                }
            })
            .map_err(|e| PoolError::WorkerSpawn(e.to_string()))?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Sleep until `deadline`. Returns `false` once the scanner is stopped.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.signal.wait_until(&mut stopped, deadline).timed_out() {
                return !*stopped;
            }
        }
        false
    }

    /// Stop the scanner and wait for an in-progress scan to finish.
    pub(crate) fn stop(&self) {
        *self.stopped.lock() = true;
        self.signal.notify_all();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
                tracing::warn!("idle scanner thread panicked");
            }
        }
    }
}

/// The tick after `previous`, skipping ticks missed while a scan overran its
/// period.
fn next_tick(previous: Instant, period: Duration, now: Instant) -> Instant {
    instant_after(previous, period).max(now)
}
