//! Test fixture utilities.

use std::time::Duration;

use relay_pool::{Pool, PoolConfig, PoolError};

use crate::mock_driver::MockFactory;

/// Pool configuration tuned for tests.
///
/// Background scans are pushed out of the way and drain backoff is short,
/// so tests that do not exercise the scanner are not disturbed by it and
/// `close` returns promptly.
#[must_use]
pub fn test_config() -> PoolConfig {
    PoolConfig::new()
        .pool_name("test-pool")
        .max_active(4)
        .max_wait(Duration::from_millis(500))
        .idle_check_initial_delay(Duration::from_secs(3600))
        .idle_check_interval(Duration::from_secs(3600))
        .clear_pool_backoff(Duration::from_millis(10))
}

/// Configuration with a fast idle scanner for eviction tests.
#[must_use]
pub fn scanning_config(period: Duration) -> PoolConfig {
    test_config()
        .idle_check_initial_delay(Duration::ZERO)
        .idle_check_interval(period)
}

/// A pool wired to a mock factory, with a handle kept for assertions.
pub struct PoolFixture {
    /// The pool under test.
    pub pool: Pool,
    /// Shared handle to the factory the pool uses.
    pub factory: MockFactory,
}

impl PoolFixture {
    /// Initialize a pool over a default mock factory.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_factory(MockFactory::builder().build(), config)
    }

    /// Initialize a pool over the given factory.
    pub fn with_factory(factory: MockFactory, config: PoolConfig) -> Result<Self, PoolError> {
        let pool = Pool::new(factory.clone());
        pool.init(config)?;
        Ok(Self { pool, factory })
    }
}

impl std::fmt::Debug for PoolFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolFixture")
            .field("pool", &self.pool)
            .field("factory", &self.factory)
            .finish()
    }
}
