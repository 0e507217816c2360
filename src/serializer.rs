//! Write serializer — the single exclusion gate for ledger mutation.
//!
//! Every mutating ledger operation (entry commit, limit update) runs inside
//! [`WriteSerializer::with_exclusive_access`]; row allocation is a scan-then-
//! write sequence, so two overlapping commits could otherwise claim the same
//! row. Reads do not take the gate.

use std::future::Future;

use tokio::sync::Mutex;

/// Process-wide mutual-exclusion gate for ledger mutation.
///
/// Backed by a Tokio mutex: waiters are queued fairly in arrival order, and
/// the guard is released on every exit path — including when the guarded
/// operation returns an error or the owning task is cancelled.
pub struct WriteSerializer {
    gate: Mutex<()>,
}

impl WriteSerializer {
    pub fn new() -> Self {
        Self { gate: Mutex::new(()) }
    }

    /// Run `op` to completion while holding the gate.
    ///
    /// `op` is not polled until the gate is held, so the guarded operation
    /// never overlaps another guarded operation.
    pub async fn with_exclusive_access<T, F>(&self, op: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.gate.lock().await;
        op.await
    }
}

impl Default for WriteSerializer {
    fn default() -> Self {
        Self::new()
    }
}
