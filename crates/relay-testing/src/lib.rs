//! # relay-testing
//!
//! Test infrastructure for `relay-pool`.
//!
//! This crate provides an in-memory driver implementing the pool's
//! collaborator traits, so pool behavior can be exercised without a
//! database.
//!
//! ## Features
//!
//! - Mock connection factory with per-SQL scripted responses
//! - Switchable driver capabilities (native validity check, query timeout,
//!   schema)
//! - Runtime failure injection: refused creations, killed sessions
//! - Inspectable session state for every connection created
//! - Pool fixtures and test configuration presets
//!
//! ## Example
//!
//! ```rust,ignore
//! use relay_testing::{MockFactory, MockResponse, PoolFixture, test_config};
//!
//! let factory = MockFactory::builder()
//!     .with_native_valid(false)
//!     .with_response("SELECT 1", MockResponse::affected(1))
//!     .build();
//! let fixture = PoolFixture::with_factory(factory, test_config())?;
//!
//! let conn = fixture.pool.get()?;
//! assert_eq!(fixture.factory.created(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_driver;

pub use fixtures::{PoolFixture, scanning_config, test_config};
pub use mock_driver::{
    MockConnection, MockDriverConfig, MockFactory, MockFactoryBuilder, MockResponse,
    MockStatement, SessionSnapshot,
};
