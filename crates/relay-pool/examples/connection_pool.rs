//! Connection pooling with metrics example.
//!
//! This example demonstrates how to use the connection pool from plain
//! threads and monitor pool health through metrics. It runs against the
//! in-memory driver from `relay-testing`, so no database is needed.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=relay_pool=debug cargo run --example connection_pool
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_pool::{Pool, PoolConfig, PoolError};
use relay_testing::{MockFactory, MockResponse};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let factory = MockFactory::builder()
        .with_response("SELECT 1", MockResponse::affected(1))
        .with_create_delay(Duration::from_millis(5))
        .build();

    println!("=== Connection Pool with Metrics Example ===\n");

    // Configure the pool
    let pool_config = PoolConfig::new()
        .pool_name("example")
        .initial_size(2)
        .max_active(8)
        .max_wait(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .default_auto_commit(true);

    println!("Pool configuration:");
    println!("  Initial size: {}", pool_config.initial_size);
    println!("  Max active: {}", pool_config.max_active);
    println!("  Idle timeout: {:?}", pool_config.idle_timeout);
    println!();

    let pool = Arc::new(Pool::builder().config(pool_config).build(factory.clone())?);

    // Print initial pool status
    print_pool_status(&pool);

    // Example 1: Basic pool usage
    println!("\n1. Basic pool usage:");
    {
        let conn = pool.get()?;
        let mut stmt = conn.create_statement()?;
        let rows = stmt.execute("SELECT 1")?;
        println!("  Connection {} answered ({rows} row)", conn.id());
        // Connection is automatically returned to pool when dropped
    }

    // Example 2: Transactions are rolled back if left open
    println!("\n2. Session reset on return:");
    {
        let conn = pool.get()?;
        conn.set_auto_commit(false)?;
        conn.create_statement()?
            .execute("UPDATE accounts SET balance = 0")?;
        println!("  Returning connection {} with an open transaction", conn.id());
    }
    let session = factory.session(1).expect("first session exists");
    println!(
        "  Rolled back: {}, auto-commit restored: {}",
        session.rollbacks, session.auto_commit
    );

    // Example 3: Concurrent usage
    println!("\n3. Concurrent pool usage (16 threads):");
    let start = Instant::now();
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let conn = pool.get()?;
                conn.create_statement()?
                    .execute(&format!("UPDATE jobs SET state = 'done' WHERE id = {i}"))?;
                std::thread::sleep(Duration::from_millis(20));
                Ok::<_, PoolError>(i)
            })
        })
        .collect();

    let completed = handles
        .into_iter()
        .map(|h| h.join().expect("worker panicked"))
        .filter(Result::is_ok)
        .count();
    println!("  Completed {} jobs in {:?}", completed, start.elapsed());

    print_pool_metrics(&pool);

    // Example 4: Monitor pool health
    println!("\n4. Pool health monitoring:");
    let status = pool.status();
    let utilization = status.utilization();
    let health_status = if utilization < 70.0 {
        "HEALTHY"
    } else if utilization < 90.0 {
        "WARNING"
    } else {
        "CRITICAL"
    };
    println!("  Pool health: {}", health_status);
    println!("  Utilization: {:.1}%", utilization);

    let monitor = pool.monitor();
    println!(
        "  Mode: {}, state: {}, idle: {}, using: {}, waiting: {}",
        monitor.mode, monitor.state, monitor.idle, monitor.using, monitor.transfer_waiting
    );

    // Example 5: Borrow timeout when the pool is exhausted
    println!("\n5. Exhausting the pool:");
    let held: Vec<_> = (0..8).map(|_| pool.get()).collect::<Result<_, _>>()?;
    match pool.get_timeout(Duration::from_millis(100)) {
        Err(e) if e.is_timeout() => println!("  Timed out as expected: {e}"),
        Err(e) => println!("  Unexpected error: {e}"),
        Ok(conn) => println!("  Unexpectedly got connection {}", conn.id()),
    }
    drop(held);
    print_pool_status(&pool);

    // Graceful shutdown
    println!("\n6. Graceful shutdown:");
    println!("  Closing pool...");
    pool.close();
    println!("  Pool closed, {} driver connections open.", factory.open());

    Ok(())
}

fn print_pool_status(pool: &Pool) {
    let status = pool.status();
    println!(
        "  Status: {}/{} connections ({:.1}% utilization)",
        status.in_use,
        status.total,
        status.utilization()
    );
}

fn print_pool_metrics(pool: &Pool) {
    let metrics = pool.metrics();
    println!("  Metrics:");
    println!("    Connections created: {}", metrics.connections_created);
    println!("    Connections closed: {}", metrics.connections_closed);
    println!(
        "    Borrow success rate: {:.2}%",
        metrics.borrow_success_rate() * 100.0
    );
    println!("    Hand-offs: {}", metrics.transfers);
    println!(
        "    Liveness tests: {} performed, {} failed",
        metrics.tests, metrics.test_failures
    );
}
