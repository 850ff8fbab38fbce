//! Connection pool integration tests.
//!
//! These tests run the pool against the in-memory driver from
//! `relay-testing`, so no database is required:
//!
//! ```bash
//! cargo test -p relay-pool --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use relay_pool::{Pool, PoolConfig, PoolError, PoolState};
use relay_testing::{MockFactory, MockResponse, PoolFixture, scanning_config, test_config};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Poll until `check` holds or two seconds pass.
fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}

// =============================================================================
// Basic Pool Tests
// =============================================================================

#[test]
fn test_pool_create_and_close() {
    init_tracing();
    let fx = PoolFixture::new(test_config()).expect("Failed to create pool");

    assert!(!fx.pool.is_closed());
    assert_eq!(fx.pool.state(), PoolState::Normal);
    assert_eq!(fx.pool.name(), Some("test-pool"));

    let status = fx.pool.status();
    assert_eq!(status.max, 4);
    assert_eq!(status.in_use, 0);
    assert_eq!(status.total, 0);

    fx.pool.close();
    assert!(fx.pool.is_closed());
    fx.pool.close();
    assert!(fx.pool.is_closed());
}

#[test]
fn test_pool_get_connection() {
    let fx = PoolFixture::new(test_config()).unwrap();

    let conn = fx.pool.get().expect("Failed to get connection");
    let id = conn.id();
    assert_eq!(fx.pool.status().in_use, 1);
    assert_eq!(fx.factory.created(), 1);

    let mut stmt = conn.create_statement().unwrap();
    assert_eq!(stmt.execute("SELECT 1").unwrap(), 0);
    drop(stmt);
    drop(conn);

    let status = fx.pool.status();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.available, 1);

    // The same thread gets its last connection back without a new creation.
    let again = fx.pool.get().unwrap();
    assert_eq!(again.id(), id);
    assert_eq!(fx.factory.created(), 1);
}

#[test]
fn test_idle_connection_reused_by_other_thread() {
    let fx = PoolFixture::new(test_config()).unwrap();
    let id = fx.pool.get().unwrap().id();

    let pool = Arc::new(fx.pool);
    let other = {
        let pool = pool.clone();
        std::thread::spawn(move || pool.get().map(|c| c.id()))
    };
    assert_eq!(other.join().unwrap().unwrap(), id);
    assert_eq!(fx.factory.created(), 1);
}

#[test]
fn test_initial_size_created_eagerly() {
    let fx = PoolFixture::new(test_config().initial_size(3)).unwrap();

    let status = fx.pool.status();
    assert_eq!(status.total, 3);
    assert_eq!(status.available, 3);
    assert_eq!(fx.factory.created(), 3);
    assert_eq!(fx.pool.metrics().connections_created, 3);
}

#[test]
fn test_pool_builder() {
    let factory = MockFactory::builder().build();
    let pool = Pool::builder()
        .pool_name("built")
        .max_active(2)
        .initial_size(1)
        .fair_mode(true)
        .clear_pool_backoff(Duration::from_millis(10))
        .build(factory.clone())
        .unwrap();

    let monitor = pool.monitor();
    assert_eq!(monitor.pool_name, "built");
    assert_eq!(monitor.mode, "fair");
    assert_eq!(monitor.max_active, 2);
    assert_eq!(monitor.total, 1);
    assert_eq!(factory.created(), 1);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_get_before_init_fails() {
    let pool = Pool::new(MockFactory::builder().build());
    assert_eq!(pool.state(), PoolState::Uninit);
    assert!(matches!(pool.get(), Err(PoolError::PoolClosed)));
}

#[test]
fn test_init_twice_fails() {
    let fx = PoolFixture::new(test_config()).unwrap();
    assert!(matches!(
        fx.pool.init(test_config()),
        Err(PoolError::AlreadyInitialized)
    ));
}

#[test]
fn test_init_rejects_invalid_config() {
    let pool = Pool::new(MockFactory::builder().build());
    let result = pool.init(PoolConfig::new().max_active(2).initial_size(5));
    assert!(matches!(result, Err(PoolError::Configuration(_))));
    assert_eq!(pool.state(), PoolState::Uninit);
}

#[test]
fn test_init_failure_tears_down_created_connections() {
    let factory = MockFactory::builder().build();
    factory.refuse_after(2);
    let pool = Pool::new(factory.clone());

    let err = pool.init(test_config().initial_size(4)).unwrap_err();
    assert!(matches!(err, PoolError::FactoryFailure(_)));
    assert_eq!(factory.created(), 2);
    assert_eq!(factory.open(), 0);
    assert_eq!(pool.state(), PoolState::Uninit);
    assert_eq!(pool.status().total, 0);

    // The pool is still uninitialized, so init can be retried.
    factory.refuse_after(usize::MAX);
    pool.init(test_config().initial_size(1)).unwrap();
    assert_eq!(pool.state(), PoolState::Normal);
}

#[test]
fn test_get_after_close_fails() {
    let fx = PoolFixture::new(test_config().initial_size(2)).unwrap();
    fx.pool.close();

    assert!(matches!(fx.pool.get(), Err(PoolError::PoolClosed)));
    assert_eq!(fx.factory.open(), 0);
    assert!(matches!(
        fx.pool.init(test_config()),
        Err(PoolError::AlreadyInitialized)
    ));
}

#[test]
fn test_close_uninitialized_pool() {
    let pool = Pool::new(MockFactory::builder().build());
    pool.close();
    assert!(pool.is_closed());
    assert!(pool.init(test_config()).is_err());
}

// =============================================================================
// Timeout Tests
// =============================================================================

#[test]
fn test_timeout_accuracy() {
    let fx = PoolFixture::new(test_config().max_active(1)).unwrap();
    let _held = fx.pool.get().unwrap();

    let wait = Duration::from_millis(200);
    let start = Instant::now();
    let err = fx.pool.get_timeout(wait).unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(elapsed >= wait, "returned early after {elapsed:?}");
    assert!(elapsed < wait + Duration::from_secs(1), "overshot: {elapsed:?}");
    assert_eq!(fx.pool.metrics().borrow_timeouts, 1);
}

#[test]
fn test_two_of_three_concurrent_borrowers() {
    let fx = PoolFixture::new(
        test_config()
            .max_active(2)
            .borrow_semaphore_size(3)
            .max_wait(Duration::from_millis(300)),
    )
    .unwrap();
    let pool = Arc::new(fx.pool);
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Arc::new(std::sync::Mutex::new(release_rx));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            let release_rx = release_rx.clone();
            std::thread::spawn(move || {
                let start = Instant::now();
                match pool.get() {
                    Ok(conn) => {
                        // Hold until the test has seen the timeout.
                        let _ = release_rx.lock().unwrap().recv();
                        drop(conn);
                        Ok(start.elapsed())
                    }
                    Err(e) => Err((e, start.elapsed())),
                }
            })
        })
        .collect();

    assert!(wait_for(|| pool.metrics().borrow_timeouts == 1));
    assert_eq!(pool.metrics().borrows, 2);
    assert_eq!(pool.status().in_use, 2);
    release_tx.send(()).unwrap();
    release_tx.send(()).unwrap();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert_eq!(failures.len(), 1);
    let (err, elapsed) = failures[0];
    assert!(err.is_timeout());
    assert!(*elapsed >= Duration::from_millis(300));
    assert_eq!(fx.factory.created(), 2);
}

#[test]
fn test_zero_timeout_fails_fast_when_exhausted() {
    let fx = PoolFixture::new(test_config().max_active(1)).unwrap();
    let _held = fx.pool.get().unwrap();
    let start = Instant::now();
    assert!(fx.pool.get_timeout(Duration::ZERO).unwrap_err().is_timeout());
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[test]
fn test_unbounded_max_wait() {
    let fx = PoolFixture::new(
        test_config()
            .initial_size(1)
            .max_active(1)
            .max_wait(Duration::MAX),
    )
    .unwrap();
    let pool = Arc::new(fx.pool);
    let held = pool.get().unwrap();
    let held_id = held.id();

    let waiter = {
        let pool = pool.clone();
        std::thread::spawn(move || pool.get().map(|conn| conn.id()))
    };
    assert!(wait_for(|| pool.monitor().transfer_waiting == 1));
    drop(held);
    assert_eq!(waiter.join().unwrap().unwrap(), held_id);
}

#[test]
fn test_huge_timeout_borrows_normally() {
    let fx = PoolFixture::new(test_config()).unwrap();
    drop(fx.pool.get_timeout(Duration::from_secs(u64::MAX / 2)).unwrap());
    drop(fx.pool.get_timeout(Duration::MAX).unwrap());
    assert_eq!(fx.factory.created(), 1);
}

#[test]
fn test_timeout_covers_fast_path_and_admission() {
    init_tracing();
    let fx = PoolFixture::new(
        test_config()
            .max_active(2)
            .borrow_semaphore_size(1)
            .connection_test_interval(Duration::ZERO)
            .max_wait(Duration::from_secs(5)),
    )
    .unwrap();
    let pool = Arc::new(fx.pool);

    // Leave connection 2 as this thread's last used one.
    let first = pool.get().unwrap();
    let second = pool.get().unwrap();
    assert_eq!((first.id(), second.id()), (1, 2));
    drop(first);
    drop(second);

    // Another thread claims connection 1 and holds the only permit while
    // its liveness test stalls.
    fx.factory.stall_validity_checks(Duration::from_secs(2));
    let checks = fx.factory.validity_checks();
    let holder = {
        let pool = pool.clone();
        std::thread::spawn(move || pool.get().map(|conn| conn.id()))
    };
    assert!(wait_for(|| fx.factory.validity_checks() > checks));
    assert_eq!(pool.monitor().semaphore_acquired, 1);

    // The fast path spends most of the budget testing a dead connection,
    // leaving only the remainder for the permit.
    fx.factory.kill(2);
    fx.factory.stall_validity_checks(Duration::from_millis(300));
    let wait = Duration::from_millis(500);
    let start = Instant::now();
    let err = pool.get_timeout(wait).unwrap_err();
    let elapsed = start.elapsed();

    match err {
        PoolError::Timeout(d) => assert_eq!(d, wait),
        other => panic!("unexpected error: {other}"),
    }
    assert!(elapsed >= wait, "returned early after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(750), "overshot: {elapsed:?}");
    assert_eq!(holder.join().unwrap().unwrap(), 1);
}

// =============================================================================
// Hand-off Tests
// =============================================================================

#[test]
fn test_waiter_receives_released_connection() {
    let fx = PoolFixture::new(test_config().max_active(1).max_wait(Duration::from_secs(5))).unwrap();
    let pool = Arc::new(fx.pool);
    let held = pool.get().unwrap();
    let id = held.id();

    let waiter = {
        let pool = pool.clone();
        std::thread::spawn(move || pool.get().map(|c| c.id()))
    };
    assert!(wait_for(|| pool.monitor().transfer_waiting == 1));
    drop(held);

    assert_eq!(waiter.join().unwrap().unwrap(), id);
    assert_eq!(pool.monitor().transfer_waiting, 0);
    assert_eq!(fx.factory.created(), 1);
}

#[test]
fn test_no_lost_wakeups() {
    let fx = PoolFixture::new(
        test_config()
            .max_active(2)
            .borrow_semaphore_size(8)
            .max_wait(Duration::from_secs(5)),
    )
    .unwrap();
    let pool = Arc::new(fx.pool);
    let first = pool.get().unwrap();
    let second = {
        let pool = pool.clone();
        std::thread::spawn(move || pool.get().unwrap())
            .join()
            .unwrap()
    };

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let conn = pool.get()?;
                std::thread::sleep(Duration::from_millis(20));
                drop(conn);
                Ok::<_, PoolError>(())
            })
        })
        .collect();
    assert!(wait_for(|| pool.monitor().transfer_waiting == 4));

    drop(first);
    drop(second);
    for waiter in waiters {
        waiter.join().unwrap().unwrap();
    }
    assert_eq!(fx.factory.created(), 2);
}

#[test]
fn test_replacement_created_for_waiter() {
    let fx = PoolFixture::new(test_config().max_active(1).max_wait(Duration::from_secs(5))).unwrap();
    let pool = Arc::new(fx.pool);
    let held = pool.get().unwrap();
    let first_id = held.id();

    let waiter = {
        let pool = pool.clone();
        std::thread::spawn(move || pool.get().map(|c| c.id()))
    };
    assert!(wait_for(|| pool.monitor().transfer_waiting == 1));

    // The broken connection is discarded; the creator builds a new one and
    // hands it to the waiter.
    held.abandon();
    let id = waiter.join().unwrap().unwrap();
    assert_ne!(id, first_id);
    assert_eq!(fx.factory.created(), 2);
    assert_eq!(fx.factory.closed(), 1);
}

#[test]
fn test_creation_failure_delivered_to_waiter() {
    let fx = PoolFixture::new(test_config().max_active(1).max_wait(Duration::from_secs(5))).unwrap();
    let pool = Arc::new(fx.pool);
    let held = pool.get().unwrap();

    let waiter = {
        let pool = pool.clone();
        std::thread::spawn(move || pool.get().map(|c| c.id()))
    };
    assert!(wait_for(|| pool.monitor().transfer_waiting == 1));

    fx.factory.refuse_connections(true);
    held.abandon();
    let err = waiter.join().unwrap().unwrap_err();
    assert!(matches!(err, PoolError::FactoryFailure(_)), "unexpected error: {err}");
    assert!(err.is_transient());
}

#[test]
fn test_interrupt_waiting_borrower() {
    let fx = PoolFixture::new(test_config().max_active(1).max_wait(Duration::from_secs(30))).unwrap();
    let pool = Arc::new(fx.pool);
    let _held = pool.get().unwrap();

    let (id_tx, id_rx) = mpsc::channel();
    let waiter = {
        let pool = pool.clone();
        std::thread::spawn(move || {
            id_tx.send(std::thread::current().id()).unwrap();
            let start = Instant::now();
            (pool.get().map(|c| c.id()), start.elapsed())
        })
    };
    let waiter_id = id_rx.recv().unwrap();
    assert!(wait_for(|| pool.monitor().transfer_waiting == 1));

    assert!(pool.interrupt(waiter_id));
    let (result, elapsed) = waiter.join().unwrap();
    assert!(matches!(result, Err(PoolError::Interrupted)));
    assert!(elapsed < Duration::from_secs(5));
    assert_eq!(pool.monitor().transfer_waiting, 0);
}

#[test]
fn test_interrupt_unknown_thread() {
    let fx = PoolFixture::new(test_config()).unwrap();
    let stranger = std::thread::spawn(|| std::thread::current().id())
        .join()
        .unwrap();
    assert!(!fx.pool.interrupt(stranger));
}

// =============================================================================
// Liveness Tests
// =============================================================================

#[test]
fn test_dead_connection_removed_on_borrow() {
    let fx = PoolFixture::new(
        test_config()
            .initial_size(1)
            .connection_test_interval(Duration::ZERO),
    )
    .unwrap();
    fx.factory.kill(1);

    let conn = fx.pool.get().unwrap();
    assert_eq!(fx.factory.created(), 2);
    assert_eq!(fx.factory.closed(), 1);
    assert!(conn.is_valid(Duration::from_secs(1)).unwrap());

    let metrics = fx.pool.metrics();
    assert_eq!(metrics.tests, 1);
    assert_eq!(metrics.test_failures, 1);
}

#[test]
fn test_recently_used_connection_skips_probe() {
    let fx = PoolFixture::new(test_config().initial_size(1)).unwrap();
    let checks = fx.factory.validity_checks();

    drop(fx.pool.get().unwrap());
    drop(fx.pool.get().unwrap());
    assert_eq!(fx.factory.validity_checks(), checks);
    assert_eq!(fx.pool.metrics().tests, 0);
}

#[test]
fn test_sql_probe_used_without_native_check() {
    let factory = MockFactory::builder()
        .with_native_valid(false)
        .with_query_timeout(false)
        .with_response("SELECT 1", MockResponse::affected(1))
        .build();
    let fx = PoolFixture::with_factory(
        factory,
        test_config()
            .initial_size(1)
            .connection_test_interval(Duration::ZERO),
    )
    .unwrap();

    let conn = fx.pool.get().unwrap();
    assert_eq!(conn.id(), 1);
    drop(conn);

    let session = fx.factory.session(1).unwrap();
    assert_eq!(session.executed, vec!["SELECT 1"]);
    assert_eq!(session.rollbacks, 1);
    assert!(session.auto_commit);
    assert_eq!(fx.factory.validity_checks(), 0);
}

#[test]
fn test_failing_sql_probe_discards_connection() {
    let factory = MockFactory::builder()
        .with_native_valid(false)
        .with_response("SELECT 1", MockResponse::error("server gone"))
        .build();
    let fx = PoolFixture::with_factory(
        factory,
        test_config()
            .initial_size(1)
            .connection_test_interval(Duration::ZERO),
    )
    .unwrap();

    let conn = fx.pool.get().unwrap();
    assert_eq!(conn.id(), 2);
    assert!(fx.factory.session(1).unwrap().closed);
    assert_eq!(fx.pool.metrics().test_failures, 1);
}

#[test]
fn test_unsupported_schema_is_tolerated() {
    let factory = MockFactory::builder().with_schema(false).build();
    let fx = PoolFixture::with_factory(factory, test_config().default_schema("app").initial_size(2))
        .unwrap();

    assert_eq!(fx.pool.status().total, 2);
    let conn = fx.pool.get().unwrap();
    assert!(conn.set_schema("other").unwrap_err().to_string().contains("schema"));
    assert!(fx.factory.sessions().iter().all(|s| s.schema.is_none()));
}

// =============================================================================
// Session Reset Tests
// =============================================================================

#[test]
fn test_session_defaults_applied_and_restored() {
    let fx = PoolFixture::new(
        test_config()
            .default_catalog("sales")
            .default_read_only(false),
    )
    .unwrap();

    let conn = fx.pool.get().unwrap();
    assert_eq!(fx.factory.session(1).unwrap().catalog.as_deref(), Some("sales"));

    conn.set_auto_commit(false).unwrap();
    conn.set_read_only(true).unwrap();
    conn.set_catalog("archive").unwrap();
    let mut stmt = conn.create_statement().unwrap();
    stmt.execute("DELETE FROM orders").unwrap();
    drop(stmt);
    drop(conn);

    let session = fx.factory.session(1).unwrap();
    assert_eq!(session.rollbacks, 1, "uncommitted work must be rolled back");
    assert!(session.auto_commit);
    assert!(!session.read_only);
    assert_eq!(session.catalog.as_deref(), Some("sales"));
}

#[test]
fn test_committed_work_not_rolled_back() {
    let fx = PoolFixture::new(test_config()).unwrap();
    let conn = fx.pool.get().unwrap();
    conn.set_auto_commit(false).unwrap();
    let mut stmt = conn.create_statement().unwrap();
    stmt.execute("INSERT INTO t VALUES (1)").unwrap();
    conn.commit().unwrap();
    drop(stmt);
    drop(conn);

    let session = fx.factory.session(1).unwrap();
    assert_eq!(session.commits, 1);
    assert_eq!(session.rollbacks, 0);
    assert!(session.auto_commit);
}

#[test]
fn test_closed_handle_refuses_operations() {
    let fx = PoolFixture::new(test_config()).unwrap();
    let conn = fx.pool.get().unwrap();
    let mut stmt = conn.create_statement().unwrap();
    conn.close();

    assert!(matches!(stmt.execute("SELECT 1"), Err(PoolError::ConnectionClosed)));
    assert!(stmt.is_closed());
}

// =============================================================================
// Eviction Tests
// =============================================================================

#[test]
fn test_hold_timeout_scenario() {
    init_tracing();
    let fx = PoolFixture::new(
        scanning_config(Duration::from_millis(100))
            .max_active(1)
            .initial_size(1)
            .hold_timeout(Duration::from_millis(300)),
    )
    .unwrap();

    let conn = fx.pool.get().unwrap();
    let status = fx.pool.status();
    assert_eq!(status.total, 1);
    assert_eq!(status.in_use, 1);

    std::thread::sleep(Duration::from_millis(800));

    let status = fx.pool.status();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.total, 1);
    assert!(conn.is_closed());
    assert!(matches!(conn.auto_commit(), Err(PoolError::ConnectionClosed)));
    assert!(matches!(conn.create_statement(), Err(PoolError::ConnectionClosed)));

    // The reclaimed connection is usable by the next borrower.
    let next = fx.pool.get().unwrap();
    assert!(next.auto_commit().unwrap());
}

#[test]
fn test_idle_timeout_eviction() {
    let fx = PoolFixture::new(
        scanning_config(Duration::from_millis(50))
            .initial_size(2)
            .idle_timeout(Duration::from_millis(100)),
    )
    .unwrap();
    assert_eq!(fx.pool.status().total, 2);

    assert!(wait_for(|| fx.pool.status().total == 0));
    assert_eq!(fx.factory.closed(), 2);
    assert_eq!(fx.pool.metrics().connections_closed, 2);
}

#[test]
fn test_active_connection_not_idle_evicted() {
    let fx = PoolFixture::new(
        scanning_config(Duration::from_millis(50))
            .initial_size(1)
            .idle_timeout(Duration::from_millis(100)),
    )
    .unwrap();
    let conn = fx.pool.get().unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(fx.pool.status().total, 1);
    assert!(!conn.is_closed());
}

// =============================================================================
// Close and Reset Tests
// =============================================================================

#[test]
fn test_close_fails_queued_borrowers() {
    let fx = PoolFixture::new(
        test_config()
            .max_active(1)
            .max_wait(Duration::from_secs(10))
            .force_close_on_shutdown(true),
    )
    .unwrap();
    let pool = Arc::new(fx.pool);
    let held = pool.get().unwrap();

    let waiter = {
        let pool = pool.clone();
        std::thread::spawn(move || pool.get().map(|c| c.id()))
    };
    assert!(wait_for(|| pool.monitor().transfer_waiting == 1));

    pool.close();
    assert!(matches!(waiter.join().unwrap(), Err(PoolError::PoolClosed)));
    assert!(held.is_closed());
    assert!(matches!(held.commit(), Err(PoolError::ConnectionClosed)));
    assert_eq!(fx.factory.open(), 0);
}

#[test]
fn test_close_waits_for_borrowed_connections() {
    let fx = PoolFixture::new(test_config().initial_size(2)).unwrap();
    let pool = Arc::new(fx.pool);
    let held = pool.get().unwrap();

    let closer = {
        let pool = pool.clone();
        std::thread::spawn(move || {
            pool.close();
            Instant::now()
        })
    };
    assert!(wait_for(|| pool.is_closed()));
    std::thread::sleep(Duration::from_millis(100));
    assert!(!held.is_closed());
    let returned_at = Instant::now();
    drop(held);

    let closed_at = closer.join().unwrap();
    assert!(closed_at >= returned_at);
    assert_eq!(fx.factory.open(), 0);
    assert_eq!(pool.status().total, 0);
}

#[test]
fn test_reset_replaces_connections() {
    let fx = PoolFixture::new(test_config().initial_size(2)).unwrap();

    fx.pool.reset();
    assert_eq!(fx.pool.state(), PoolState::Normal);
    assert_eq!(fx.pool.status().total, 0);
    assert_eq!(fx.factory.closed(), 2);

    let conn = fx.pool.get().unwrap();
    assert_eq!(conn.id(), 3);
    assert_eq!(fx.factory.created(), 3);
}

#[test]
fn test_reset_force_reclaims_borrowed() {
    let fx = PoolFixture::new(test_config().initial_size(1)).unwrap();
    let conn = fx.pool.get().unwrap();

    fx.pool.reset_force(true);
    assert!(conn.is_closed());
    assert_eq!(fx.pool.status().total, 0);
    assert_eq!(fx.factory.open(), 0);
    assert!(fx.pool.get().is_ok());
}

// =============================================================================
// Monitoring Tests
// =============================================================================

#[test]
fn test_monitor_snapshot() {
    let fx = PoolFixture::new(test_config().initial_size(2).fair_mode(false)).unwrap();
    let _conn = fx.pool.get().unwrap();

    let monitor = fx.pool.monitor();
    assert_eq!(monitor.pool_name, "test-pool");
    assert_eq!(monitor.mode, "compete");
    assert_eq!(monitor.state, PoolState::Normal);
    assert_eq!(monitor.total, 2);
    assert_eq!(monitor.using, 1);
    assert_eq!(monitor.idle, 1);
    assert_eq!(monitor.semaphore_acquired, 0);
    assert_eq!(monitor.transfer_waiting, 0);

    let metrics = fx.pool.metrics();
    assert_eq!(metrics.borrows, 1);
    assert!((metrics.borrow_success_rate() - 1.0).abs() < f64::EPSILON);
}
