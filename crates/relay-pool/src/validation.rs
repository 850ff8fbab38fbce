//! Liveness probes and driver capability detection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use crate::connection::{PooledConnection, SessionDefaults};
use crate::driver::RawConnection;

/// Cached verdict for an optional driver capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Capability {
    /// Not probed yet.
    Unknown = 0,
    /// The driver implements it.
    Supported = 1,
    /// The driver rejected it; the pool stops trying.
    Unsupported = 2,
}

impl Capability {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Supported,
            2 => Self::Unsupported,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug)]
struct CapabilityCell(AtomicU8);

impl CapabilityCell {
    fn new() -> Self {
        Self(AtomicU8::new(Capability::Unknown as u8))
    }

    fn get(&self) -> Capability {
        Capability::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, value: Capability) {
        self.0.store(value as u8, Ordering::Release);
    }
}

/// Optional driver capabilities, probed once per pool.
#[derive(Debug)]
pub(crate) struct DriverCapabilities {
    native_valid: CapabilityCell,
    query_timeout: CapabilityCell,
    schema: CapabilityCell,
}

impl DriverCapabilities {
    pub(crate) fn new() -> Self {
        Self {
            native_valid: CapabilityCell::new(),
            query_timeout: CapabilityCell::new(),
            schema: CapabilityCell::new(),
        }
    }

    pub(crate) fn native_valid(&self) -> Capability {
        self.native_valid.get()
    }

    pub(crate) fn query_timeout(&self) -> Capability {
        self.query_timeout.get()
    }

    pub(crate) fn schema(&self) -> Capability {
        self.schema.get()
    }

    /// Whether schema resets should be attempted.
    pub(crate) fn schema_usable(&self) -> bool {
        self.schema() != Capability::Unsupported
    }
}

/// Apply the configured session defaults to a freshly created connection.
///
/// Every step is best effort; failures are logged. The first connection a
/// pool creates also settles the capability verdicts.
pub(crate) fn apply_defaults(
    pool: &str,
    raw: &mut dyn RawConnection,
    defaults: &SessionDefaults,
    caps: &DriverCapabilities,
    test_timeout: Duration,
) {
    if let Err(e) = raw.set_auto_commit(defaults.auto_commit) {
        tracing::warn!(pool, error = %e, "failed to apply default auto-commit");
    }
    if let Some(level) = defaults.isolation {
        if let Err(e) = raw.set_transaction_isolation(level) {
            tracing::warn!(pool, error = %e, "failed to apply default isolation");
        }
    }
    if let Err(e) = raw.set_read_only(defaults.read_only) {
        tracing::warn!(pool, error = %e, "failed to apply default read-only flag");
    }
    if let Some(catalog) = defaults.catalog.as_deref().filter(|c| !c.trim().is_empty()) {
        if let Err(e) = raw.set_catalog(catalog) {
            tracing::warn!(pool, error = %e, "failed to apply default catalog");
        }
    }
    if let Some(schema) = defaults.schema.as_deref().filter(|s| !s.trim().is_empty()) {
        if caps.schema_usable() {
            match raw.set_schema(schema) {
                Ok(()) => caps.schema.set(Capability::Supported),
                Err(e) => {
                    caps.schema.set(Capability::Unsupported);
                    tracing::warn!(pool, error = %e, "driver does not support schema");
                }
            }
        }
    }

    if caps.native_valid() == Capability::Unknown {
        detect_validity_probe(pool, raw, caps, test_timeout);
    }
}

fn detect_validity_probe(
    pool: &str,
    raw: &mut dyn RawConnection,
    caps: &DriverCapabilities,
    test_timeout: Duration,
) {
    match raw.is_valid(test_timeout) {
        Ok(true) => {
            caps.native_valid.set(Capability::Supported);
            tracing::debug!(pool, "using native validity probe");
            return;
        }
        Ok(false) => {
            tracing::warn!(pool, "driver validity probe rejected a fresh connection, falling back to SQL probe");
        }
        Err(e) => {
            tracing::warn!(pool, error = %e, "driver does not support native validity probe");
        }
    }
    caps.native_valid.set(Capability::Unsupported);

    let supported = match raw.create_statement() {
        Ok(mut stmt) => {
            let result = stmt.set_query_timeout(test_timeout);
            let _ = stmt.close();
            result.is_ok()
        }
        Err(_) => false,
    };
    if supported {
        caps.query_timeout.set(Capability::Supported);
    } else {
        caps.query_timeout.set(Capability::Unsupported);
        tracing::warn!(pool, "driver does not support query timeout");
    }
}

/// A liveness probe run against a borrowed connection.
pub(crate) trait ConnectionTestPolicy: Send + Sync + std::fmt::Debug {
    /// `true` if the connection is usable. Updates the access time on success.
    fn is_alive(&self, pool: &str, conn: &PooledConnection) -> bool;
}

/// Executes the configured SQL inside a rolled-back transaction.
#[derive(Debug)]
pub(crate) struct SqlQueryTestPolicy {
    sql: Arc<str>,
    timeout: Duration,
    caps: Arc<DriverCapabilities>,
}

impl SqlQueryTestPolicy {
    pub(crate) fn new(sql: Arc<str>, timeout: Duration, caps: Arc<DriverCapabilities>) -> Self {
        Self { sql, timeout, caps }
    }
}

impl ConnectionTestPolicy for SqlQueryTestPolicy {
    fn is_alive(&self, pool: &str, conn: &PooledConnection) -> bool {
        let mut guard = conn.lock_raw();
        let Some(raw) = guard.as_deref_mut() else {
            return false;
        };

        // The probe may call a function with side effects, so it always
        // runs in a transaction that is rolled back.
        let restore_auto_commit = match raw.auto_commit() {
            Ok(true) => {
                if let Err(e) = raw.set_auto_commit(false) {
                    tracing::warn!(pool, connection_id = conn.id(), error = %e, "connection test failed");
                    return false;
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(pool, connection_id = conn.id(), error = %e, "connection test failed");
                return false;
            }
        };

        let outcome = (|| {
            let mut stmt = raw.create_statement()?;
            conn.touch();
            if self.caps.query_timeout() != Capability::Unsupported {
                if let Err(e) = stmt.set_query_timeout(self.timeout) {
                    tracing::warn!(pool, error = %e, "failed to set probe query timeout");
                }
            }
            let executed = stmt.execute(&self.sql);
            let _ = stmt.close();
            executed?;
            raw.rollback()
        })();

        if restore_auto_commit {
            if let Err(e) = raw.set_auto_commit(true) {
                tracing::warn!(pool, connection_id = conn.id(), error = %e, "failed to restore auto-commit after connection test");
            }
        }

        match outcome {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(pool, connection_id = conn.id(), error = %e, "connection test failed");
                false
            }
        }
    }
}

/// Uses the driver's own validity check.
#[derive(Debug)]
pub(crate) struct NativeValidTestPolicy {
    timeout: Duration,
}

impl NativeValidTestPolicy {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ConnectionTestPolicy for NativeValidTestPolicy {
    fn is_alive(&self, pool: &str, conn: &PooledConnection) -> bool {
        let mut guard = conn.lock_raw();
        let Some(raw) = guard.as_deref_mut() else {
            return false;
        };
        match raw.is_valid(self.timeout) {
            Ok(true) => {
                conn.touch();
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(pool, connection_id = conn.id(), error = %e, "connection test failed");
                false
            }
        }
    }
}

/// Chooses the probe according to the detected capabilities.
#[derive(Debug)]
pub(crate) struct ConnectionTester {
    caps: Arc<DriverCapabilities>,
    sql: SqlQueryTestPolicy,
    native: NativeValidTestPolicy,
}

impl ConnectionTester {
    pub(crate) fn new(sql: Arc<str>, timeout: Duration, caps: Arc<DriverCapabilities>) -> Self {
        Self {
            sql: SqlQueryTestPolicy::new(sql, timeout, caps.clone()),
            native: NativeValidTestPolicy::new(timeout),
            caps,
        }
    }

    pub(crate) fn policy(&self) -> &dyn ConnectionTestPolicy {
        if self.caps.native_valid() == Capability::Supported {
            &self.native
        } else {
            &self.sql
        }
    }

    pub(crate) fn is_alive(&self, pool: &str, conn: &PooledConnection) -> bool {
        self.policy().is_alive(pool, conn)
    }
}
