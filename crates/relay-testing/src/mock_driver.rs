//! Scriptable in-memory driver.
//!
//! [`MockFactory`] implements the pool's `ConnectionFactory` without a
//! database. Statement results are configured per SQL text, optional driver
//! capabilities can be switched off, and failures can be injected at runtime
//! (refused creations, connections that die while pooled). Every connection
//! keeps an inspectable [`SessionSnapshot`] so tests can assert what the pool
//! did to it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use relay_pool::{ConnectionFactory, DriverError, IsolationLevel, RawConnection, RawStatement};

/// Result of executing a statement on a mock connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Statement succeeds and reports this many affected rows.
    Affected(u64),
    /// Statement fails with this message.
    Error(String),
}

impl MockResponse {
    /// Create a successful response.
    #[must_use]
    pub fn affected(count: u64) -> Self {
        Self::Affected(count)
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}

/// Session settings and activity of one mock connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Creation order, starting at 1.
    pub id: usize,
    /// Whether the simulated server session is still up.
    pub alive: bool,
    /// Whether the pool closed the connection.
    pub closed: bool,
    /// Current auto-commit mode.
    pub auto_commit: bool,
    /// Current read-only flag.
    pub read_only: bool,
    /// Current isolation level, if ever set.
    pub isolation: Option<IsolationLevel>,
    /// Current catalog, if ever set.
    pub catalog: Option<String>,
    /// Current schema, if ever set.
    pub schema: Option<String>,
    /// Number of commits.
    pub commits: u32,
    /// Number of rollbacks.
    pub rollbacks: u32,
    /// Executed SQL, in order.
    pub executed: Vec<String>,
}

impl SessionSnapshot {
    fn new(id: usize) -> Self {
        Self {
            id,
            alive: true,
            closed: false,
            auto_commit: true,
            read_only: false,
            isolation: None,
            catalog: None,
            schema: None,
            commits: 0,
            rollbacks: 0,
            executed: Vec::new(),
        }
    }
}

/// Configuration for the mock driver.
#[derive(Debug, Clone)]
pub struct MockDriverConfig {
    responses: HashMap<String, MockResponse>,
    default_response: MockResponse,
    native_valid: bool,
    query_timeout: bool,
    schema: bool,
    create_delay: Duration,
}

/// Builder for [`MockFactory`].
#[derive(Debug, Clone)]
pub struct MockFactoryBuilder {
    config: MockDriverConfig,
}

impl MockFactoryBuilder {
    /// Create a new builder with every capability supported.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MockDriverConfig {
                responses: HashMap::new(),
                default_response: MockResponse::Affected(0),
                native_valid: true,
                query_timeout: true,
                schema: true,
                create_delay: Duration::ZERO,
            },
        }
    }

    /// Add a response for a specific SQL text.
    #[must_use]
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.config.responses.insert(sql.into(), response);
        self
    }

    /// Set the response for unmatched SQL.
    #[must_use]
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Whether connections implement the native validity check.
    #[must_use]
    pub fn with_native_valid(mut self, supported: bool) -> Self {
        self.config.native_valid = supported;
        self
    }

    /// Whether statements accept a query timeout.
    #[must_use]
    pub fn with_query_timeout(mut self, supported: bool) -> Self {
        self.config.query_timeout = supported;
        self
    }

    /// Whether connections accept a schema.
    #[must_use]
    pub fn with_schema(mut self, supported: bool) -> Self {
        self.config.schema = supported;
        self
    }

    /// Make every creation take at least this long.
    #[must_use]
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.config.create_delay = delay;
        self
    }

    /// Build the factory.
    #[must_use]
    pub fn build(self) -> MockFactory {
        MockFactory {
            shared: Arc::new(Shared {
                config: self.config,
                created: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                validity_checks: AtomicUsize::new(0),
                refuse: AtomicBool::new(false),
                refuse_next: AtomicUsize::new(0),
                budget: AtomicUsize::new(usize::MAX),
                validity_delay: Mutex::new(Duration::ZERO),
                sessions: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Default for MockFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Shared {
    config: MockDriverConfig,
    created: AtomicUsize,
    closed: AtomicUsize,
    validity_checks: AtomicUsize,
    refuse: AtomicBool,
    refuse_next: AtomicUsize,
    budget: AtomicUsize,
    validity_delay: Mutex<Duration>,
    sessions: Mutex<Vec<Arc<Mutex<SessionSnapshot>>>>,
}

/// In-memory connection factory.
///
/// Cloning shares the same counters and sessions, so a test can hand one
/// clone to the pool and keep another for assertions.
#[derive(Debug, Clone)]
pub struct MockFactory {
    shared: Arc<Shared>,
}

impl MockFactory {
    /// Create a new builder for the factory.
    #[must_use]
    pub fn builder() -> MockFactoryBuilder {
        MockFactoryBuilder::new()
    }

    /// Raw connections created so far.
    #[must_use]
    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::Acquire)
    }

    /// Raw connections closed so far.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Raw connections currently open.
    #[must_use]
    pub fn open(&self) -> usize {
        self.created().saturating_sub(self.closed())
    }

    /// Native validity checks performed.
    #[must_use]
    pub fn validity_checks(&self) -> usize {
        self.shared.validity_checks.load(Ordering::Acquire)
    }

    /// Refuse (or accept again) every creation.
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::Release);
    }

    /// Refuse the next `count` creations.
    pub fn refuse_next(&self, count: usize) {
        self.shared.refuse_next.store(count, Ordering::Release);
    }

    /// Accept `count` more creations, then refuse every one after that.
    pub fn refuse_after(&self, count: usize) {
        self.shared.budget.store(count, Ordering::Release);
    }

    /// Make each validity check that starts from now on take `delay`.
    pub fn stall_validity_checks(&self, delay: Duration) {
        *self.shared.validity_delay.lock() = delay;
    }

    /// Simulate a server-side disconnect of one connection.
    pub fn kill(&self, id: usize) {
        if let Some(session) = self.session_handle(id) {
            session.lock().alive = false;
        }
    }

    /// Simulate a server restart: every open connection dies.
    pub fn kill_all(&self) {
        for session in self.shared.sessions.lock().iter() {
            session.lock().alive = false;
        }
    }

    fn session_handle(&self, id: usize) -> Option<Arc<Mutex<SessionSnapshot>>> {
        let sessions = self.shared.sessions.lock();
        id.checked_sub(1).and_then(|i| sessions.get(i)).cloned()
    }

    /// Snapshot of one connection by creation order (1-based).
    #[must_use]
    pub fn session(&self, id: usize) -> Option<SessionSnapshot> {
        self.session_handle(id).map(|s| s.lock().clone())
    }

    /// Snapshots of every connection ever created.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        self.shared
            .sessions
            .lock()
            .iter()
            .map(|s| s.lock().clone())
            .collect()
    }

    fn take_refusal(&self) -> bool {
        if self.shared.refuse.load(Ordering::Acquire) {
            return true;
        }
        if self
            .shared
            .refuse_next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            return true;
        }
        self.shared
            .budget
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n == usize::MAX { Some(n) } else { n.checked_sub(1) }
            })
            .is_err()
    }
}

impl ConnectionFactory for MockFactory {
    fn create(&self) -> Result<Box<dyn RawConnection>, DriverError> {
        if !self.shared.config.create_delay.is_zero() {
            std::thread::sleep(self.shared.config.create_delay);
        }
        if self.take_refusal() {
            return Err(DriverError::failed("connection refused"));
        }

        let session = {
            let mut sessions = self.shared.sessions.lock();
            let session = Arc::new(Mutex::new(SessionSnapshot::new(sessions.len() + 1)));
            sessions.push(session.clone());
            session
        };
        self.shared.created.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(id = session.lock().id, "mock connection created");
        Ok(Box::new(MockConnection {
            shared: self.shared.clone(),
            session,
        }))
    }
}

/// Mock raw connection produced by [`MockFactory`].
#[derive(Debug)]
pub struct MockConnection {
    shared: Arc<Shared>,
    session: Arc<Mutex<SessionSnapshot>>,
}

impl MockConnection {
    fn live(&self) -> Result<parking_lot::MutexGuard<'_, SessionSnapshot>, DriverError> {
        let session = self.session.lock();
        if session.closed {
            Err(DriverError::Closed)
        } else if !session.alive {
            Err(DriverError::failed("connection reset by peer"))
        } else {
            Ok(session)
        }
    }
}

impl RawConnection for MockConnection {
    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError> {
        self.live()?.auto_commit = enabled;
        Ok(())
    }

    fn auto_commit(&self) -> Result<bool, DriverError> {
        Ok(self.live()?.auto_commit)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.live()?.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.live()?.rollbacks += 1;
        Ok(())
    }

    fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<(), DriverError> {
        self.live()?.isolation = Some(level);
        Ok(())
    }

    fn set_read_only(&mut self, read_only: bool) -> Result<(), DriverError> {
        self.live()?.read_only = read_only;
        Ok(())
    }

    fn set_catalog(&mut self, catalog: &str) -> Result<(), DriverError> {
        self.live()?.catalog = Some(catalog.to_string());
        Ok(())
    }

    fn set_schema(&mut self, schema: &str) -> Result<(), DriverError> {
        if !self.shared.config.schema {
            return Err(DriverError::unsupported("schema"));
        }
        self.live()?.schema = Some(schema.to_string());
        Ok(())
    }

    fn is_valid(&mut self, _timeout: Duration) -> Result<bool, DriverError> {
        if !self.shared.config.native_valid {
            return Err(DriverError::unsupported("isValid"));
        }
        let delay = *self.shared.validity_delay.lock();
        self.shared.validity_checks.fetch_add(1, Ordering::AcqRel);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let session = self.session.lock();
        Ok(session.alive && !session.closed)
    }

    fn create_statement(&mut self) -> Result<Box<dyn RawStatement>, DriverError> {
        let _session = self.live()?;
        Ok(Box::new(MockStatement {
            shared: self.shared.clone(),
            session: self.session.clone(),
            closed: false,
        }))
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let mut session = self.session.lock();
        if !session.closed {
            session.closed = true;
            self.shared.closed.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

/// Mock statement produced by [`MockConnection`].
#[derive(Debug)]
pub struct MockStatement {
    shared: Arc<Shared>,
    session: Arc<Mutex<SessionSnapshot>>,
    closed: bool,
}

impl RawStatement for MockStatement {
    fn set_query_timeout(&mut self, _timeout: Duration) -> Result<(), DriverError> {
        if self.shared.config.query_timeout {
            Ok(())
        } else {
            Err(DriverError::unsupported("queryTimeout"))
        }
    }

    fn execute(&mut self, sql: &str) -> Result<u64, DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        let mut session = self.session.lock();
        if session.closed {
            return Err(DriverError::Closed);
        }
        if !session.alive {
            return Err(DriverError::failed("connection reset by peer"));
        }
        session.executed.push(sql.to_string());

        let config = &self.shared.config;
        match config.responses.get(sql).unwrap_or(&config.default_response) {
            MockResponse::Affected(rows) => Ok(*rows),
            MockResponse::Error(message) => Err(DriverError::failed(message.clone())),
        }
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_refuse_next_counts_down() {
        let factory = MockFactory::builder().build();
        factory.refuse_next(2);
        assert!(factory.create().is_err());
        assert!(factory.create().is_err());
        assert!(factory.create().is_ok());
        assert_eq!(factory.created(), 1);
    }

    #[test]
    fn test_refuse_after_budget() {
        let factory = MockFactory::builder().build();
        factory.refuse_after(1);
        assert!(factory.create().is_ok());
        assert!(factory.create().is_err());
        assert!(factory.create().is_err());
    }

    #[test]
    fn test_stalled_validity_check() {
        let factory = MockFactory::builder().build();
        let mut conn = factory.create().unwrap();
        factory.stall_validity_checks(Duration::from_millis(50));

        let start = std::time::Instant::now();
        assert!(conn.is_valid(Duration::from_secs(1)).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_killed_connection_fails_operations() {
        let factory = MockFactory::builder().build();
        let mut conn = factory.create().unwrap();
        factory.kill(1);
        assert!(!conn.is_valid(Duration::from_secs(1)).unwrap());
        assert!(conn.create_statement().is_err());
    }
}
