//! # relay-pool
//!
//! Blocking database connection pool with direct connection hand-off.
//!
//! Borrowing threads that find no idle connection queue up and are handed a
//! released connection (or a creation failure) directly by the releasing
//! thread, instead of polling the pool. A bounded admission semaphore caps
//! how many threads contend at once.
//!
//! ## Features
//!
//! - Per-thread fast path that reuses the last connection with a single CAS
//! - Fair (first-waiting-first-served) or compete hand-off modes
//! - Liveness test on borrow, native or SQL-based, with capability detection
//! - Session defaults restored when a connection is returned
//! - Background replacement of lost connections
//! - Idle timeout eviction and hold timeout reclamation
//! - Drain-on-close and reset with optional forced reclamation
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use relay_pool::Pool;
//!
//! let pool = Pool::builder()
//!     .max_active(20)
//!     .max_wait(Duration::from_secs(5))
//!     .idle_timeout(Duration::from_secs(300))
//!     .build(factory)?;
//!
//! let conn = pool.get()?;
//! let mut stmt = conn.create_statement()?;
//! stmt.execute("UPDATE jobs SET state = 'done' WHERE id = 7")?;
//! // Connection automatically returned to pool on drop
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod admission;
mod borrower;
pub mod config;
mod connection;
mod creator;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod proxy;
mod scanner;
mod transfer;
mod validation;

pub use config::PoolConfig;
pub use driver::{ConnectionFactory, IsolationLevel, RawConnection, RawStatement};
pub use error::{DriverError, PoolError};
pub use metrics::PoolMetrics;
pub use pool::{Pool, PoolBuilder, PoolMonitor, PoolState, PoolStatus};
pub use proxy::{ProxyConnection, ProxyStatement};
