//! Mock Driver Fidelity Tests
//!
//! These tests validate that the mock driver behaves like a real driver in
//! the ways the pool relies on: capability errors are reported as
//! unsupported, dead sessions fail every operation, and closing is counted
//! exactly once.
//!
//! ```bash
//! cargo test -p relay-testing --test mock_fidelity
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use relay_pool::{ConnectionFactory, IsolationLevel};
use relay_testing::{MockFactory, MockResponse};

// =============================================================================
// Capability Tests
// =============================================================================

#[test]
fn test_all_capabilities_supported_by_default() {
    let factory = MockFactory::builder().build();
    let mut conn = factory.create().expect("create should succeed");

    assert!(conn.is_valid(Duration::from_secs(1)).unwrap());
    conn.set_schema("app").unwrap();
    let mut stmt = conn.create_statement().unwrap();
    stmt.set_query_timeout(Duration::from_secs(1)).unwrap();

    assert_eq!(factory.session(1).unwrap().schema.as_deref(), Some("app"));
    assert_eq!(factory.validity_checks(), 1);
}

#[test]
fn test_disabled_capabilities_report_unsupported() {
    let factory = MockFactory::builder()
        .with_native_valid(false)
        .with_query_timeout(false)
        .with_schema(false)
        .build();
    let mut conn = factory.create().unwrap();

    assert!(conn.is_valid(Duration::from_secs(1)).unwrap_err().is_unsupported());
    assert!(conn.set_schema("app").unwrap_err().is_unsupported());
    let mut stmt = conn.create_statement().unwrap();
    assert!(
        stmt.set_query_timeout(Duration::from_secs(1))
            .unwrap_err()
            .is_unsupported()
    );
    assert_eq!(factory.validity_checks(), 0);
}

// =============================================================================
// Statement Tests
// =============================================================================

#[test]
fn test_scripted_responses() {
    let factory = MockFactory::builder()
        .with_response("UPDATE t SET x = 1", MockResponse::affected(3))
        .with_response("SELECT broken()", MockResponse::error("function missing"))
        .with_default_response(MockResponse::affected(0))
        .build();
    let mut conn = factory.create().unwrap();
    let mut stmt = conn.create_statement().unwrap();

    assert_eq!(stmt.execute("UPDATE t SET x = 1").unwrap(), 3);
    assert_eq!(stmt.execute("SELECT 1").unwrap(), 0);
    let err = stmt.execute("SELECT broken()").unwrap_err();
    assert!(err.to_string().contains("function missing"));

    let session = factory.session(1).unwrap();
    assert_eq!(
        session.executed,
        vec!["UPDATE t SET x = 1", "SELECT 1", "SELECT broken()"]
    );
}

#[test]
fn test_closed_statement_refuses_execute() {
    let factory = MockFactory::builder().build();
    let mut conn = factory.create().unwrap();
    let mut stmt = conn.create_statement().unwrap();
    stmt.close().unwrap();
    assert!(stmt.execute("SELECT 1").is_err());
}

// =============================================================================
// Session State Tests
// =============================================================================

#[test]
fn test_session_settings_are_recorded() {
    let factory = MockFactory::builder().build();
    let mut conn = factory.create().unwrap();

    conn.set_auto_commit(false).unwrap();
    conn.set_read_only(true).unwrap();
    conn.set_catalog("sales").unwrap();
    conn.set_transaction_isolation(IsolationLevel::Serializable)
        .unwrap();
    conn.commit().unwrap();
    conn.rollback().unwrap();

    let session = factory.session(1).unwrap();
    assert!(!session.auto_commit);
    assert!(session.read_only);
    assert_eq!(session.catalog.as_deref(), Some("sales"));
    assert_eq!(session.isolation, Some(IsolationLevel::Serializable));
    assert_eq!(session.commits, 1);
    assert_eq!(session.rollbacks, 1);
}

// =============================================================================
// Failure Injection Tests
// =============================================================================

#[test]
fn test_refuse_connections_toggle() {
    let factory = MockFactory::builder().build();
    factory.refuse_connections(true);
    assert!(factory.create().is_err());
    factory.refuse_connections(false);
    assert!(factory.create().is_ok());
    assert_eq!(factory.created(), 1);
}

#[test]
fn test_kill_all_fails_every_session() {
    let factory = MockFactory::builder().build();
    let mut a = factory.create().unwrap();
    let mut b = factory.create().unwrap();
    factory.kill_all();

    assert!(!a.is_valid(Duration::from_secs(1)).unwrap());
    assert!(b.set_auto_commit(false).is_err());
    assert!(factory.sessions().iter().all(|s| !s.alive));
}

#[test]
fn test_close_counted_once() {
    let factory = MockFactory::builder().build();
    let mut conn = factory.create().unwrap();
    conn.close().unwrap();
    conn.close().unwrap();
    assert_eq!(factory.closed(), 1);
    assert_eq!(factory.open(), 0);
    assert!(factory.session(1).unwrap().closed);

    // Destroy through the factory closes too.
    let conn = factory.create().unwrap();
    factory.destroy(conn).unwrap();
    assert_eq!(factory.closed(), 2);
}
