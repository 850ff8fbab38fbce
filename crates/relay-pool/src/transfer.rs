//! Hand-off policies for released connections.
//!
//! When a connection is recycled the pool sweeps its wait queue head-first
//! and offers the connection to the first open borrower. The policy decides
//! what state the connection is in while it is being offered:
//!
//! - [`FairTransferPolicy`] leaves it `Using`, so nobody scanning the
//!   connection set can take it. The borrower it was offered to claims it by
//!   checking it is still `Using`; if no borrower takes it the policy writes
//!   `Idle`.
//! - [`CompeteTransferPolicy`] makes it `Idle` immediately, so the offered
//!   borrower races every other borrower for it with a CAS.

use crate::connection::{ConnectionState, PooledConnection};

/// Strategy governing how a released connection reaches a waiting borrower.
pub(crate) trait TransferPolicy: Send + Sync + std::fmt::Debug {
    /// The state the connection keeps while it is still unclaimed.
    ///
    /// The recycling sweep stops as soon as the connection leaves this state.
    fn check_state(&self) -> ConnectionState;

    /// Called before the wait queue is swept.
    fn before_transfer(&self, conn: &PooledConnection);

    /// Called by a borrower that was offered `conn`; `true` if it now owns it.
    fn try_catch(&self, conn: &PooledConnection) -> bool;

    /// Called when no queued borrower accepted the connection.
    fn on_failed_transfer(&self, conn: &PooledConnection);

    /// Mode name used in logs and monitor snapshots.
    fn mode(&self) -> &'static str;
}

/// First-wait-first-serve hand-off by identity.
#[derive(Debug, Default)]
pub(crate) struct FairTransferPolicy;

impl TransferPolicy for FairTransferPolicy {
    fn check_state(&self) -> ConnectionState {
        ConnectionState::Using
    }

    fn before_transfer(&self, _conn: &PooledConnection) {}

    fn try_catch(&self, conn: &PooledConnection) -> bool {
        conn.state() == ConnectionState::Using
    }

    fn on_failed_transfer(&self, conn: &PooledConnection) {
        conn.set_state(ConnectionState::Idle);
    }

    fn mode(&self) -> &'static str {
        "fair"
    }
}

/// Open competition between queued and scanning borrowers.
#[derive(Debug, Default)]
pub(crate) struct CompeteTransferPolicy;

impl TransferPolicy for CompeteTransferPolicy {
    fn check_state(&self) -> ConnectionState {
        ConnectionState::Idle
    }

    fn before_transfer(&self, conn: &PooledConnection) {
        conn.set_state(ConnectionState::Idle);
    }

    fn try_catch(&self, conn: &PooledConnection) -> bool {
        conn.compare_and_set(ConnectionState::Idle, ConnectionState::Using)
    }

    fn on_failed_transfer(&self, _conn: &PooledConnection) {}

    fn mode(&self) -> &'static str {
        "compete"
    }
}

/// Select the policy for the configured mode.
pub(crate) fn for_mode(fair: bool) -> Box<dyn TransferPolicy> {
    if fair {
        Box::new(FairTransferPolicy)
    } else {
        Box::new(CompeteTransferPolicy)
    }
}
