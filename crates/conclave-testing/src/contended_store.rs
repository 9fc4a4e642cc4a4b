//! # Contended State Store
//!
//! Simulates a competing writer: before each of the first `n` commits it
//! lands an interfering commit of its own, so the caller's commit fails with
//! a version conflict exactly `n` times.

use conclave_core::{
    CommitRecord, InMemoryStateStore, StateDelta, StateResult, StateSnapshot, StateStore, Version,
};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct ContendedStateStore {
    inner: InMemoryStateStore,
    interference: StateDelta,
    remaining: AtomicU32,
    injected: AtomicU32,
}

impl ContendedStateStore {
    /// Interfere with the next `conflicts` commits by applying `interference`.
    pub fn new(inner: InMemoryStateStore, interference: StateDelta, conflicts: u32) -> Self {
        Self {
            inner,
            interference,
            remaining: AtomicU32::new(conflicts),
            injected: AtomicU32::new(0),
        }
    }

    /// Number of interfering commits applied so far.
    pub fn injected(&self) -> u32 {
        self.injected.load(Ordering::SeqCst)
    }

    fn take_injection(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl StateStore for ContendedStateStore {
    fn snapshot(&self) -> StateResult<StateSnapshot> {
        self.inner.snapshot()
    }

    fn commit(&self, base_version: Version, delta: &StateDelta) -> StateResult<Version> {
        if self.take_injection() {
            let current = self.inner.version()?;
            let version = self.inner.commit(current, &self.interference)?;
            self.injected.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(%version, "interfering commit injected");
        }
        self.inner.commit(base_version, delta)
    }

    fn version(&self) -> StateResult<Version> {
        self.inner.version()
    }

    fn history(&self) -> StateResult<Vec<CommitRecord>> {
        self.inner.history()
    }
}
