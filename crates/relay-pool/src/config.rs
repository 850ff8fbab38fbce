//! Pool configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::driver::IsolationLevel;
use crate::error::PoolError;

/// Default liveness probe statement.
pub const DEFAULT_CONNECTION_TEST_SQL: &str = "SELECT 1";

/// Configuration for the connection pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Name used in logs and monitor snapshots.
    ///
    /// When unset the pool is named `RelayPool-{n}`.
    pub pool_name: Option<String>,

    /// Maximum number of connections the pool may hold.
    pub max_active: u32,

    /// Number of connections created eagerly by `init`.
    pub initial_size: u32,

    /// Time to wait for a connection before timing out.
    pub max_wait: Duration,

    /// Time an idle connection may sit unused before it is closed.
    pub idle_timeout: Duration,

    /// Time a borrowed connection may go without activity before the pool
    /// reclaims it.
    pub hold_timeout: Duration,

    /// SQL executed (and rolled back) to probe liveness when the driver has
    /// no native validity check.
    pub connection_test_sql: Arc<str>,

    /// Upper bound for a single liveness probe.
    pub connection_test_timeout: Duration,

    /// Connections accessed within this window are not re-tested on borrow.
    pub connection_test_interval: Duration,

    /// Hand released connections to the longest waiter (fair) instead of
    /// letting every borrower compete for them.
    pub fair_mode: bool,

    /// Bound on concurrent borrow attempts.
    ///
    /// When unset, `min(max_active / 2, available CPUs)` with a floor of 1.
    pub borrow_semaphore_size: Option<u32>,

    /// Period of the idle scanner.
    pub idle_check_interval: Duration,

    /// Delay before the first idle scan.
    pub idle_check_initial_delay: Duration,

    /// Reclaim borrowed connections immediately on `close` instead of waiting
    /// for their hold timeout.
    pub force_close_on_shutdown: bool,

    /// Sleep between passes while draining connections on close or reset.
    pub clear_pool_backoff: Duration,

    /// Auto-commit mode applied to every new connection.
    pub default_auto_commit: bool,

    /// Isolation level applied to every new connection.
    pub default_isolation: Option<IsolationLevel>,

    /// Read-only flag applied to every new connection.
    pub default_read_only: bool,

    /// Catalog applied to every new connection.
    pub default_catalog: Option<String>,

    /// Schema applied to every new connection.
    pub default_schema: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_name: None,
            max_active: 10,
            initial_size: 0,
            max_wait: Duration::from_secs(8),
            idle_timeout: Duration::from_secs(180),
            hold_timeout: Duration::from_secs(300),
            connection_test_sql: Arc::from(DEFAULT_CONNECTION_TEST_SQL),
            connection_test_timeout: Duration::from_secs(3),
            connection_test_interval: Duration::from_millis(500),
            fair_mode: false,
            borrow_semaphore_size: None,
            idle_check_interval: Duration::from_secs(180),
            idle_check_initial_delay: Duration::from_secs(1),
            force_close_on_shutdown: false,
            clear_pool_backoff: Duration::from_secs(3),
            default_auto_commit: true,
            default_isolation: None,
            default_read_only: false,
            default_catalog: None,
            default_schema: None,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool name.
    #[must_use]
    pub fn pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = Some(name.into());
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_active(mut self, count: u32) -> Self {
        self.max_active = count;
        self
    }

    /// Set the number of connections created at startup.
    #[must_use]
    pub fn initial_size(mut self, count: u32) -> Self {
        self.initial_size = count;
        self
    }

    /// Set the default borrow timeout.
    #[must_use]
    pub fn max_wait(mut self, timeout: Duration) -> Self {
        self.max_wait = timeout;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the hold timeout for borrowed connections.
    #[must_use]
    pub fn hold_timeout(mut self, timeout: Duration) -> Self {
        self.hold_timeout = timeout;
        self
    }

    /// Set the SQL liveness probe.
    ///
    /// The probe runs inside a transaction that is always rolled back, so it
    /// may safely call a function or procedure with side effects.
    ///
    /// ```rust
    /// use relay_pool::PoolConfig;
    ///
    /// let config = PoolConfig::new().connection_test_sql("SELECT 1 FROM DUAL");
    /// assert_eq!(&*config.connection_test_sql, "SELECT 1 FROM DUAL");
    /// ```
    #[must_use]
    pub fn connection_test_sql(mut self, sql: impl Into<Arc<str>>) -> Self {
        self.connection_test_sql = sql.into();
        self
    }

    /// Set the liveness probe timeout.
    #[must_use]
    pub fn connection_test_timeout(mut self, timeout: Duration) -> Self {
        self.connection_test_timeout = timeout;
        self
    }

    /// Set the window within which recently used connections skip the probe.
    #[must_use]
    pub fn connection_test_interval(mut self, interval: Duration) -> Self {
        self.connection_test_interval = interval;
        self
    }

    /// Enable or disable fair hand-off.
    #[must_use]
    pub fn fair_mode(mut self, enabled: bool) -> Self {
        self.fair_mode = enabled;
        self
    }

    /// Set the admission semaphore size.
    #[must_use]
    pub fn borrow_semaphore_size(mut self, size: u32) -> Self {
        self.borrow_semaphore_size = Some(size);
        self
    }

    /// Set the idle scanner period.
    #[must_use]
    pub fn idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval;
        self
    }

    /// Set the delay before the first idle scan.
    #[must_use]
    pub fn idle_check_initial_delay(mut self, delay: Duration) -> Self {
        self.idle_check_initial_delay = delay;
        self
    }

    /// Reclaim borrowed connections immediately on shutdown.
    #[must_use]
    pub fn force_close_on_shutdown(mut self, enabled: bool) -> Self {
        self.force_close_on_shutdown = enabled;
        self
    }

    /// Set the backoff between drain passes on close or reset.
    #[must_use]
    pub fn clear_pool_backoff(mut self, backoff: Duration) -> Self {
        self.clear_pool_backoff = backoff;
        self
    }

    /// Set the default auto-commit mode.
    #[must_use]
    pub fn default_auto_commit(mut self, enabled: bool) -> Self {
        self.default_auto_commit = enabled;
        self
    }

    /// Set the default isolation level.
    #[must_use]
    pub fn default_isolation(mut self, level: IsolationLevel) -> Self {
        self.default_isolation = Some(level);
        self
    }

    /// Set the default read-only flag.
    #[must_use]
    pub fn default_read_only(mut self, read_only: bool) -> Self {
        self.default_read_only = read_only;
        self
    }

    /// Set the default catalog.
    #[must_use]
    pub fn default_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.default_catalog = Some(catalog.into());
        self
    }

    /// Set the default schema.
    #[must_use]
    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Effective admission semaphore size.
    #[must_use]
    pub fn effective_semaphore_size(&self) -> u32 {
        match self.borrow_semaphore_size {
            Some(size) => size,
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| u32::try_from(n.get()).unwrap_or(u32::MAX))
                    .unwrap_or(1);
                (self.max_active / 2).min(cpus).max(1)
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_active == 0 {
            return Err(PoolError::Configuration(
                "max_active must be greater than 0".into(),
            ));
        }
        if self.initial_size > self.max_active {
            return Err(PoolError::Configuration(
                "initial_size cannot be greater than max_active".into(),
            ));
        }
        if self.borrow_semaphore_size == Some(0) {
            return Err(PoolError::Configuration(
                "borrow_semaphore_size must be greater than 0".into(),
            ));
        }
        if self.idle_check_interval.is_zero() {
            return Err(PoolError::Configuration(
                "idle_check_interval must be greater than 0".into(),
            ));
        }
        if self.connection_test_sql.trim().is_empty() {
            return Err(PoolError::Configuration(
                "connection_test_sql cannot be empty".into(),
            ));
        }
        Ok(())
    }
}
