//! Connection pool implementation.
//!
//! ## Borrowing
//!
//! A borrow tries, in order:
//!
//! 1. the connection the calling thread used last, claimed with a single CAS
//!    and no semaphore;
//! 2. after taking an admission permit, every connection in the current
//!    snapshot of the connection set;
//! 3. creating a new connection if the pool is below `max_active`;
//! 4. joining the wait queue until a releasing thread hands a connection
//!    (or an error) directly to it, or the deadline passes.
//!
//! ## Returning
//!
//! A returned connection is offered to queued borrowers head-first. What
//! "offered" means depends on the [`TransferPolicy`]: in fair mode the
//! connection stays claimed until the chosen borrower picks it up, in
//! compete mode it becomes idle and anyone may take it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::admission::{AdmissionSemaphore, instant_after};
use crate::borrower::{self, BorrowScope, Borrower, BorrowerState};
use crate::config::PoolConfig;
use crate::connection::{ConnectionState, PooledConnection, SessionDefaults};
use crate::creator::ConnectionCreator;
use crate::driver::{ConnectionFactory, IsolationLevel};
use crate::error::PoolError;
use crate::metrics::{AtomicPoolStats, PoolMetrics};
use crate::proxy::ProxyConnection;
use crate::scanner::IdleScanner;
use crate::transfer::{self, TransferPolicy};
use crate::validation::{self, ConnectionTester, DriverCapabilities};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Waits shorter than this are spun out instead of parking.
const PARK_THRESHOLD: Duration = Duration::from_micros(1);

/// Spins granted to the borrower at the head of the wait queue.
const MAX_TIMED_SPINS: u32 = 32;

/// Pool lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolState {
    /// Created but not initialized.
    Uninit = 0,
    /// Serving borrows.
    Normal = 1,
    /// Shut down; terminal.
    Closed = 2,
    /// Draining all connections for a reset.
    Resting = 3,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninit,
            1 => Self::Normal,
            3 => Self::Resting,
            _ => Self::Closed,
        }
    }
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninit => "uninit",
            Self::Normal => "normal",
            Self::Closed => "closed",
            Self::Resting => "resting",
        };
        f.write_str(name)
    }
}

/// A blocking connection pool.
///
/// The pool manages a bounded set of driver connections, hands them to
/// borrowing threads, and reclaims, tests, and replaces them. Share it
/// between threads with an [`Arc`].
///
/// Dropping the pool closes it.
pub struct Pool {
    inner: Arc<PoolInner>,
}

/// Everything fixed by `init`.
struct Core {
    name: String,
    config: PoolConfig,
    max_active: usize,
    semaphore: AdmissionSemaphore,
    transfer: Box<dyn TransferPolicy>,
    defaults: SessionDefaults,
    caps: Arc<DriverCapabilities>,
    tester: ConnectionTester,
    spin_count: u32,
}

impl Core {
    fn new(pool_id: u64, config: PoolConfig) -> Self {
        let name = config
            .pool_name
            .clone()
            .unwrap_or_else(|| format!("RelayPool-{pool_id}"));
        let caps = Arc::new(DriverCapabilities::new());
        let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            max_active: config.max_active as usize,
            semaphore: AdmissionSemaphore::new(config.effective_semaphore_size(), config.fair_mode),
            transfer: transfer::for_mode(config.fair_mode),
            defaults: SessionDefaults {
                auto_commit: config.default_auto_commit,
                isolation: config.default_isolation,
                read_only: config.default_read_only,
                catalog: config.default_catalog.clone(),
                schema: config.default_schema.clone(),
            },
            tester: ConnectionTester::new(
                config.connection_test_sql.clone(),
                config.connection_test_timeout,
                caps.clone(),
            ),
            caps,
            spin_count: if cpus < 2 { 0 } else { MAX_TIMED_SPINS },
            name,
            config,
        }
    }
}

/// State shared by the pool handle, its worker threads, and its connections.
pub(crate) struct PoolInner {
    id: u64,
    factory: Box<dyn ConnectionFactory>,
    state: AtomicU8,
    init_lock: Mutex<()>,
    core: OnceCell<Core>,
    /// Copy-on-write connection set; readers clone the `Arc` and scan
    /// without holding the lock.
    connections: RwLock<Arc<Vec<Arc<PooledConnection>>>>,
    /// Serializes structural changes to `connections`.
    structure_lock: Mutex<()>,
    next_connection_id: AtomicU64,
    waiters: Mutex<VecDeque<Arc<Borrower>>>,
    borrowers: Mutex<HashMap<ThreadId, Weak<Borrower>>>,
    stats: AtomicPoolStats,
    creator: ConnectionCreator,
    scanner: IdleScanner,
}

impl Pool {
    /// Create an uninitialized pool around a connection factory.
    ///
    /// Call [`init`](Self::init) before borrowing.
    pub fn new(factory: impl ConnectionFactory + 'static) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                factory: Box::new(factory),
                state: AtomicU8::new(PoolState::Uninit as u8),
                init_lock: Mutex::new(()),
                core: OnceCell::new(),
                connections: RwLock::new(Arc::new(Vec::new())),
                structure_lock: Mutex::new(()),
                next_connection_id: AtomicU64::new(1),
                waiters: Mutex::new(VecDeque::new()),
                borrowers: Mutex::new(HashMap::new()),
                stats: AtomicPoolStats::new(),
                creator: ConnectionCreator::new(),
                scanner: IdleScanner::new(),
            }),
        }
    }

    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Initialize the pool.
    ///
    /// Creates `initial_size` connections, starts the background creator and
    /// idle scanner, and opens the pool for borrowing. If any initial
    /// connection fails, every connection created so far is closed and the
    /// pool stays uninitialized.
    pub fn init(&self, config: PoolConfig) -> Result<(), PoolError> {
        let inner = &self.inner;
        let _guard = inner.init_lock.lock();
        if inner.state() != PoolState::Uninit || inner.core.get().is_some() {
            return Err(PoolError::AlreadyInitialized);
        }
        config.validate()?;

        let core = Core::new(inner.id, config);
        for _ in 0..core.config.initial_size {
            if let Err(e) = inner.create_pooled(&core, ConnectionState::Idle) {
                tracing::warn!(pool = %core.name, error = %e, "failed to create initial connections");
                inner.discard_all(&core.name, "init");
                return Err(e);
            }
        }

        let name = core.name.clone();
        let (initial_delay, period) = (
            core.config.idle_check_initial_delay,
            core.config.idle_check_interval,
        );
        if inner.core.set(core).is_err() {
            return Err(PoolError::AlreadyInitialized);
        }

        let started = inner
            .creator
            .start(inner, &name)
            .and_then(|()| inner.scanner.start(inner, &name, initial_delay, period));
        if let Err(e) = started {
            inner.creator.shutdown();
            inner.scanner.stop();
            inner.discard_all(&name, "init");
            inner.set_state(PoolState::Closed);
            return Err(e);
        }

        if !inner.transition(PoolState::Uninit, PoolState::Normal) {
            // Closed while initializing.
            inner.creator.shutdown();
            inner.scanner.stop();
            inner.discard_all(&name, "destroy");
            return Err(PoolError::PoolClosed);
        }

        if let Some(core) = inner.core.get() {
            tracing::info!(
                pool = %core.name,
                mode = core.transfer.mode(),
                initial_size = core.config.initial_size,
                max_active = core.max_active,
                semaphore_size = core.semaphore.permits(),
                max_wait_ms = u64::try_from(core.config.max_wait.as_millis()).unwrap_or(u64::MAX),
                "connection pool initialized"
            );
        }
        Ok(())
    }

    /// Borrow a connection, waiting at most the configured `max_wait`.
    pub fn get(&self) -> Result<ProxyConnection, PoolError> {
        let timeout = self
            .inner
            .core
            .get()
            .map_or(Duration::ZERO, |core| core.config.max_wait);
        self.get_timeout(timeout)
    }

    /// Borrow a connection, waiting at most `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<ProxyConnection, PoolError> {
        let inner = &self.inner;
        let core = match inner.core.get() {
            Some(core) if inner.is_normal() => core,
            _ => return Err(PoolError::PoolClosed),
        };

        tracing::trace!(pool = %core.name, "acquiring connection from pool");
        match inner.borrow(core, timeout) {
            Ok(conn) => {
                inner.stats.record_borrow();
                Ok(ProxyConnection::new(conn))
            }
            Err(e) => {
                inner.stats.record_borrow_error(e.is_timeout());
                tracing::debug!(pool = %core.name, error = %e, "borrow failed");
                Err(e)
            }
        }
    }

    /// Close the pool.
    ///
    /// Queued borrowers fail with [`PoolError::PoolClosed`]. Idle connections
    /// are closed at once; borrowed ones when they are returned, when their
    /// hold timeout passes, or immediately with `force_close_on_shutdown`.
    /// Closing a closed pool does nothing.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state() == PoolState::Closed
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        self.inner.state()
    }

    /// Close every connection and start over, waiting for borrowed ones.
    pub fn reset(&self) {
        self.reset_force(false);
    }

    /// Close every connection and start over.
    ///
    /// With `force`, borrowed connections are reclaimed immediately instead
    /// of when their hold timeout passes. Does nothing unless the pool is
    /// serving borrows.
    pub fn reset_force(&self, force: bool) {
        let inner = &self.inner;
        let Some(core) = inner.core.get() else {
            return;
        };
        if inner.transition(PoolState::Normal, PoolState::Resting) {
            tracing::info!(pool = %core.name, force, "resetting connection pool");
            inner.remove_all(core, force, "reset");
            inner.set_state(PoolState::Normal);
            tracing::info!(pool = %core.name, "connection pool reset complete");
        }
    }

    /// Interrupt a thread blocked in [`get`](Self::get) on this pool.
    ///
    /// The wait fails with [`PoolError::Interrupted`]. If the thread is not
    /// waiting, its next wait on this pool fails instead. Returns `false` if
    /// the thread has never borrowed from this pool.
    pub fn interrupt(&self, thread: ThreadId) -> bool {
        let inner = &self.inner;
        let borrower = inner.borrowers.lock().get(&thread).and_then(Weak::upgrade);
        match borrower {
            Some(borrower) => {
                borrower.interrupt();
                if let Some(core) = inner.core.get() {
                    core.semaphore.wake_all();
                }
                true
            }
            None => false,
        }
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let inner = &self.inner;
        let (idle, using, total) = inner.count();
        PoolStatus {
            available: idle,
            in_use: using,
            total,
            max: inner.core.get().map_or(0, |core| core.config.max_active),
        }
    }

    /// Snapshot of the pool's internal state.
    #[must_use]
    pub fn monitor(&self) -> PoolMonitor {
        let inner = &self.inner;
        let (idle, using, total) = inner.count();
        let core = inner.core.get();
        PoolMonitor {
            pool_name: core.map(|c| c.name.clone()).unwrap_or_default(),
            mode: core.map_or("", |c| c.transfer.mode()),
            state: inner.state(),
            max_active: core.map_or(0, |c| c.config.max_active),
            total,
            idle,
            using,
            semaphore_size: core.map_or(0, |c| c.semaphore.permits()),
            semaphore_acquired: core.map_or(0, |c| c.semaphore.acquired()),
            semaphore_waiting: core.map_or(0, |c| c.semaphore.queue_len()),
            transfer_waiting: inner.waiters.lock().len(),
            pending_creations: inner.creator.pending(),
        }
    }

    /// Counters accumulated since the pool was created.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        self.inner.stats.snapshot()
    }

    /// Get the pool configuration, once initialized.
    #[must_use]
    pub fn config(&self) -> Option<&PoolConfig> {
        self.inner.core.get().map(|core| &core.config)
    }

    /// Pool name, once initialized.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.core.get().map(|core| core.name.as_str())
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("status", &self.status())
            .finish()
    }
}

impl BorrowScope for PoolInner {
    fn scope_id(&self) -> u64 {
        self.id
    }

    fn is_open(&self) -> bool {
        self.state() != PoolState::Closed
    }
}

impl PoolInner {
    fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PoolState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: PoolState, to: PoolState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_normal(&self) -> bool {
        self.state() == PoolState::Normal
    }

    pub(crate) fn creator(&self) -> &ConnectionCreator {
        &self.creator
    }

    pub(crate) fn scanner(&self) -> &IdleScanner {
        &self.scanner
    }

    fn snapshot(&self) -> Arc<Vec<Arc<PooledConnection>>> {
        self.connections.read().clone()
    }

    fn total(&self) -> usize {
        self.connections.read().len()
    }

    /// `(idle, using, total)`
    fn count(&self) -> (u32, u32, u32) {
        let snapshot = self.snapshot();
        let (mut idle, mut using) = (0u32, 0u32);
        for conn in snapshot.iter() {
            match conn.state() {
                ConnectionState::Idle => idle += 1,
                ConnectionState::Using => using += 1,
                ConnectionState::Closed => {}
            }
        }
        let total = u32::try_from(snapshot.len()).unwrap_or(u32::MAX);
        (idle, using, total)
    }

    pub(crate) fn has_waiters(&self) -> bool {
        !self.waiters.lock().is_empty()
    }

    fn exist_borrower(&self, core: &Core) -> bool {
        core.semaphore.acquired() > 0 || core.semaphore.has_queued()
    }

    /// Create a connection and add it to the set.
    ///
    /// Returns `None` when the pool is already full. Refused once the pool
    /// has left `Uninit`/`Normal`, so draining cannot race a creation.
    fn create_pooled(
        self: &Arc<Self>,
        core: &Core,
        state: ConnectionState,
    ) -> Result<Option<Arc<PooledConnection>>, PoolError> {
        let _guard = self.structure_lock.lock();
        if !matches!(self.state(), PoolState::Normal | PoolState::Uninit) {
            return Err(PoolError::PoolClosed);
        }
        if self.total() >= core.max_active {
            return Ok(None);
        }

        let mut raw = self.factory.create().map_err(PoolError::FactoryFailure)?;
        validation::apply_defaults(
            &core.name,
            raw.as_mut(),
            &core.defaults,
            &core.caps,
            core.config.connection_test_timeout,
        );

        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(PooledConnection::new(id, raw, state, Arc::downgrade(self)));
        conn.touch();
        {
            let mut set = self.connections.write();
            let mut next = Vec::with_capacity(set.len() + 1);
            next.extend(set.iter().cloned());
            next.push(conn.clone());
            *set = Arc::new(next);
        }
        self.stats.record_created();
        tracing::debug!(pool = %core.name, connection_id = id, "connection created");
        Ok(Some(conn))
    }

    /// Creation entry point for the background creator.
    pub(crate) fn create_for_waiter(
        self: &Arc<Self>,
        state: ConnectionState,
    ) -> Result<Option<Arc<PooledConnection>>, PoolError> {
        match self.core.get() {
            Some(core) => self.create_pooled(core, state),
            None => Ok(None),
        }
    }

    /// Mark a connection closed, drop it from the set, and release it.
    fn remove_pooled(&self, pool: &str, conn: &Arc<PooledConnection>, reason: &'static str) {
        let _guard = self.structure_lock.lock();
        conn.set_state(ConnectionState::Closed);
        let removed = {
            let mut set = self.connections.write();
            match set.iter().position(|c| Arc::ptr_eq(c, conn)) {
                Some(pos) => {
                    let mut next = Vec::with_capacity(set.len() - 1);
                    next.extend(set.iter().take(pos).cloned());
                    next.extend(set.iter().skip(pos + 1).cloned());
                    *set = Arc::new(next);
                    true
                }
                None => false,
            }
        };
        conn.close_raw(|raw| self.factory.destroy(raw));
        if removed {
            self.stats.record_closed();
            tracing::debug!(pool, connection_id = conn.id(), reason, "connection removed");
        }
    }

    /// Close every connection without regard to state. Only used while no
    /// borrower can hold one (failed init).
    fn discard_all(&self, pool: &str, reason: &'static str) {
        for conn in self.snapshot().iter() {
            self.remove_pooled(pool, conn, reason);
        }
    }

    fn request_replenish(&self, core: &Core) {
        self.creator.request(|| self.total(), core.max_active);
    }

    fn register_borrower(&self, borrower: &Arc<Borrower>) {
        let mut registry = self.borrowers.lock();
        registry.retain(|_, b| b.strong_count() > 0);
        registry.insert(borrower.thread().id(), Arc::downgrade(borrower));
    }

    fn dequeue(&self, borrower: &Arc<Borrower>) {
        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.iter().position(|b| Arc::ptr_eq(b, borrower)) {
            waiters.remove(pos);
        }
    }

    fn borrow(
        self: &Arc<Self>,
        core: &Core,
        timeout: Duration,
    ) -> Result<Arc<PooledConnection>, PoolError> {
        let deadline = instant_after(Instant::now(), timeout);
        let (borrower, created) = borrower::current(self);
        if created {
            self.register_borrower(&borrower);
        } else if let Some(conn) = borrower.last_used() {
            if conn.compare_and_set(ConnectionState::Idle, ConnectionState::Using) {
                if self.test_on_borrow(core, &conn) {
                    return Ok(conn);
                }
                borrower.clear_last_used();
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let _permit = core
            .semaphore
            .acquire(remaining, borrower.interrupt_flag())
            .map_err(|e| if e.is_timeout() { PoolError::Timeout(timeout) } else { e })?;
        if !self.is_normal() {
            return Err(PoolError::PoolClosed);
        }

        for conn in self.snapshot().iter() {
            if conn.compare_and_set(ConnectionState::Idle, ConnectionState::Using)
                && self.test_on_borrow(core, conn)
            {
                borrower.set_last_used(conn);
                return Ok(conn.clone());
            }
        }

        if self.total() < core.max_active {
            if let Some(conn) = self.create_pooled(core, ConnectionState::Using)? {
                borrower.set_last_used(&conn);
                return Ok(conn);
            }
        }

        self.wait_for_transfer(core, &borrower, deadline, timeout)
    }

    /// Queue up and wait for a releasing thread to hand over a connection.
    fn wait_for_transfer(
        &self,
        core: &Core,
        borrower: &Arc<Borrower>,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<Arc<PooledConnection>, PoolError> {
        borrower.reset();
        let mut spins = {
            let mut waiters = self.waiters.lock();
            waiters.push_back(borrower.clone());
            if waiters.front().is_some_and(|head| Arc::ptr_eq(head, borrower)) {
                core.spin_count
            } else {
                0
            }
        };

        let mut failure: Option<PoolError> = None;
        loop {
            let state = borrower.state();
            match &*state {
                BorrowerState::Transferred(conn) => {
                    if core.transfer.try_catch(conn) && self.test_on_borrow(core, conn) {
                        self.dequeue(borrower);
                        borrower.reset();
                        borrower.set_last_used(conn);
                        self.stats.record_transfer();
                        return Ok(conn.clone());
                    }
                    // Lost the race or the connection was dead; keep waiting.
                    borrower.reset();
                    std::thread::yield_now();
                    continue;
                }
                BorrowerState::Failed(e) => {
                    self.dequeue(borrower);
                    let e = e.clone();
                    borrower.reset();
                    return Err(e);
                }
                BorrowerState::Normal | BorrowerState::Waiting => {}
            }

            if let Some(cause) = &failure {
                borrower.compare_and_set(&state, BorrowerState::Failed(cause.clone()));
                continue;
            }
            if borrower.take_interrupt() {
                failure = Some(PoolError::Interrupted);
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                failure = Some(PoolError::Timeout(timeout));
            } else if spins > 0 {
                spins -= 1;
                std::hint::spin_loop();
            } else if remaining > PARK_THRESHOLD
                && borrower.compare_and_set(&state, BorrowerState::Waiting)
            {
                std::thread::park_timeout(remaining);
                if borrower.take_interrupt() {
                    failure = Some(PoolError::Interrupted);
                }
            }
        }
    }

    /// Test a connection the caller just claimed. A dead connection is
    /// removed and a replacement requested.
    fn test_on_borrow(&self, core: &Core, conn: &Arc<PooledConnection>) -> bool {
        if conn.accessed_within(core.config.connection_test_interval) {
            return true;
        }
        let alive = core.tester.is_alive(&core.name, conn);
        self.stats.record_test(alive);
        if alive {
            return true;
        }
        self.remove_pooled(&core.name, conn, "bad");
        self.request_replenish(core);
        false
    }

    /// Offer a released connection to the wait queue.
    pub(crate) fn recycle(&self, conn: &Arc<PooledConnection>) {
        let Some(core) = self.core.get() else {
            conn.set_state(ConnectionState::Idle);
            return;
        };
        let policy = &core.transfer;
        policy.before_transfer(conn);
        {
            let waiters = self.waiters.lock();
            for borrower in waiters.iter() {
                let mut state = borrower.state();
                while state.is_open() {
                    if conn.state() != policy.check_state() {
                        return;
                    }
                    if borrower.compare_and_set(&state, BorrowerState::Transferred(conn.clone())) {
                        if matches!(*state, BorrowerState::Waiting) {
                            borrower.thread().unpark();
                        }
                        return;
                    }
                    state = borrower.state();
                }
            }
        }
        policy.on_failed_transfer(conn);
    }

    /// Entry point for a handle that was closed normally.
    pub(crate) fn return_connection(&self, conn: &Arc<PooledConnection>) {
        let Some(core) = self.core.get() else {
            conn.set_state(ConnectionState::Idle);
            return;
        };
        if conn.state() == ConnectionState::Closed {
            self.remove_pooled(&core.name, conn, "closed");
            return;
        }
        match conn.reset_session(&core.defaults, core.caps.schema_usable()) {
            Ok(()) => {
                conn.touch();
                tracing::trace!(pool = %core.name, connection_id = conn.id(), "connection returned");
                self.recycle(conn);
            }
            Err(e) => {
                tracing::warn!(
                    pool = %core.name,
                    connection_id = conn.id(),
                    error = %e,
                    "failed to reset connection on return, discarding"
                );
                self.abandon_on_return(conn);
            }
        }
    }

    /// Entry point for a handle that reported its connection as broken.
    pub(crate) fn abandon_on_return(&self, conn: &Arc<PooledConnection>) {
        match self.core.get() {
            Some(core) => {
                self.remove_pooled(&core.name, conn, "bad");
                self.request_replenish(core);
            }
            None => self.remove_pooled("", conn, "bad"),
        }
    }

    /// Deliver an error to the first queued borrower still waiting.
    pub(crate) fn transfer_exception(&self, error: PoolError) {
        let waiters = self.waiters.lock();
        for borrower in waiters.iter() {
            if borrower.offer(|| BorrowerState::Failed(error.clone())) {
                return;
            }
        }
    }

    /// One idle scan: evict idle-timed-out connections, reclaim
    /// hold-timed-out borrows, and drop closed entries.
    pub(crate) fn close_idle_timeout(&self) {
        let Some(core) = self.core.get() else {
            return;
        };
        if !self.is_normal() {
            return;
        }

        for conn in self.snapshot().iter() {
            match conn.state() {
                ConnectionState::Idle if !self.exist_borrower(core) => {
                    if conn.idle_for() >= core.config.idle_timeout
                        && conn.compare_and_set(ConnectionState::Idle, ConnectionState::Closed)
                    {
                        self.remove_pooled(&core.name, conn, "idle");
                        self.request_replenish(core);
                    }
                }
                ConnectionState::Using => {
                    if conn.idle_for() >= core.config.hold_timeout && conn.try_set_as_closed() {
                        tracing::debug!(
                            pool = %core.name,
                            connection_id = conn.id(),
                            "reclaimed connection past hold timeout"
                        );
                    }
                }
                ConnectionState::Closed => {
                    self.remove_pooled(&core.name, conn, "closed");
                    self.request_replenish(core);
                }
                ConnectionState::Idle => {}
            }
        }

        let (idle, using, total) = self.count();
        tracing::debug!(pool = %core.name, idle, using, total, "idle scan complete");
    }

    /// Drain the pool: fail every queued borrower, then close connections
    /// until the set is empty.
    fn remove_all(&self, core: &Core, force: bool, reason: &'static str) {
        while self.exist_borrower(core) {
            self.transfer_exception(PoolError::PoolClosed);
            std::thread::yield_now();
        }

        loop {
            for conn in self.snapshot().iter() {
                if conn.compare_and_set(ConnectionState::Idle, ConnectionState::Closed) {
                    self.remove_pooled(&core.name, conn, reason);
                    continue;
                }
                match conn.state() {
                    ConnectionState::Closed => self.remove_pooled(&core.name, conn, reason),
                    ConnectionState::Using => {
                        let expired = conn.idle_for() >= core.config.hold_timeout;
                        if (force || expired)
                            && conn.try_set_as_closed()
                            && conn.compare_and_set(ConnectionState::Idle, ConnectionState::Closed)
                        {
                            self.remove_pooled(&core.name, conn, reason);
                        }
                    }
                    ConnectionState::Idle => {}
                }
            }

            {
                let _guard = self.structure_lock.lock();
                if self.connections.read().is_empty() {
                    break;
                }
            }
            std::thread::sleep(core.config.clear_pool_backoff);
        }
    }

    fn close(&self) {
        loop {
            match self.state() {
                PoolState::Closed => return,
                PoolState::Uninit => {
                    if self.transition(PoolState::Uninit, PoolState::Closed) {
                        return;
                    }
                }
                PoolState::Normal => {
                    if self.transition(PoolState::Normal, PoolState::Closed) {
                        self.shutdown();
                        return;
                    }
                }
                PoolState::Resting => {
                    let backoff = self
                        .core
                        .get()
                        .map_or(Duration::from_millis(10), |core| core.config.clear_pool_backoff);
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    fn shutdown(&self) {
        let Some(core) = self.core.get() else {
            return;
        };
        tracing::info!(pool = %core.name, "shutting down connection pool");
        self.remove_all(core, core.config.force_close_on_shutdown, "destroy");
        self.creator.shutdown();
        self.scanner.stop();
        borrower::forget(self.id);
        self.borrowers.lock().clear();
        tracing::info!(pool = %core.name, "connection pool closed");
    }
}

/// Builder for creating a connection pool.
#[derive(Debug, Clone, Default)]
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    /// Create a new pool builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the pool name.
    #[must_use]
    pub fn pool_name(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.pool_name(name);
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_active(mut self, count: u32) -> Self {
        self.config = self.config.max_active(count);
        self
    }

    /// Set the number of connections created at startup.
    #[must_use]
    pub fn initial_size(mut self, count: u32) -> Self {
        self.config = self.config.initial_size(count);
        self
    }

    /// Set the default borrow timeout.
    #[must_use]
    pub fn max_wait(mut self, timeout: Duration) -> Self {
        self.config = self.config.max_wait(timeout);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.idle_timeout(timeout);
        self
    }

    /// Set the hold timeout for borrowed connections.
    #[must_use]
    pub fn hold_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.hold_timeout(timeout);
        self
    }

    /// Set the SQL liveness probe.
    #[must_use]
    pub fn connection_test_sql(mut self, sql: impl Into<Arc<str>>) -> Self {
        self.config = self.config.connection_test_sql(sql);
        self
    }

    /// Set the liveness probe timeout.
    #[must_use]
    pub fn connection_test_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connection_test_timeout(timeout);
        self
    }

    /// Set the window within which recently used connections skip the probe.
    #[must_use]
    pub fn connection_test_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.connection_test_interval(interval);
        self
    }

    /// Enable or disable fair hand-off.
    #[must_use]
    pub fn fair_mode(mut self, enabled: bool) -> Self {
        self.config = self.config.fair_mode(enabled);
        self
    }

    /// Set the admission semaphore size.
    #[must_use]
    pub fn borrow_semaphore_size(mut self, size: u32) -> Self {
        self.config = self.config.borrow_semaphore_size(size);
        self
    }

    /// Set the idle scanner period.
    #[must_use]
    pub fn idle_check_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.idle_check_interval(interval);
        self
    }

    /// Set the delay before the first idle scan.
    #[must_use]
    pub fn idle_check_initial_delay(mut self, delay: Duration) -> Self {
        self.config = self.config.idle_check_initial_delay(delay);
        self
    }

    /// Reclaim borrowed connections immediately on shutdown.
    #[must_use]
    pub fn force_close_on_shutdown(mut self, enabled: bool) -> Self {
        self.config = self.config.force_close_on_shutdown(enabled);
        self
    }

    /// Set the backoff between drain passes.
    #[must_use]
    pub fn clear_pool_backoff(mut self, backoff: Duration) -> Self {
        self.config = self.config.clear_pool_backoff(backoff);
        self
    }

    /// Set the default auto-commit mode.
    #[must_use]
    pub fn default_auto_commit(mut self, enabled: bool) -> Self {
        self.config = self.config.default_auto_commit(enabled);
        self
    }

    /// Set the default isolation level.
    #[must_use]
    pub fn default_isolation(mut self, level: IsolationLevel) -> Self {
        self.config = self.config.default_isolation(level);
        self
    }

    /// Set the default read-only flag.
    #[must_use]
    pub fn default_read_only(mut self, read_only: bool) -> Self {
        self.config = self.config.default_read_only(read_only);
        self
    }

    /// Set the default catalog.
    #[must_use]
    pub fn default_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.config = self.config.default_catalog(catalog);
        self
    }

    /// Set the default schema.
    #[must_use]
    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.config = self.config.default_schema(schema);
        self
    }

    /// Build and initialize the pool.
    pub fn build(self, factory: impl ConnectionFactory + 'static) -> Result<Pool, PoolError> {
        let pool = Pool::new(factory);
        pool.init(self.config)?;
        Ok(pool)
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use.
    pub in_use: u32,
    /// Total number of connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl PoolStatus {
    /// Percentage of the maximum currently borrowed.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            0.0
        } else {
            f64::from(self.in_use) / f64::from(self.max) * 100.0
        }
    }

    /// Whether no further connections can be created.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Detailed snapshot of the pool for monitoring.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolMonitor {
    /// Pool name.
    pub pool_name: String,
    /// Hand-off mode, `"fair"` or `"compete"`.
    pub mode: &'static str,
    /// Lifecycle state.
    pub state: PoolState,
    /// Configured maximum.
    pub max_active: u32,
    /// Connections in the set.
    pub total: u32,
    /// Idle connections.
    pub idle: u32,
    /// Borrowed connections.
    pub using: u32,
    /// Admission permits.
    pub semaphore_size: u32,
    /// Admission permits held.
    pub semaphore_acquired: u32,
    /// Threads waiting for a permit.
    pub semaphore_waiting: usize,
    /// Borrowers in the wait queue.
    pub transfer_waiting: usize,
    /// Outstanding background creation requests.
    pub pending_creations: usize,
}
