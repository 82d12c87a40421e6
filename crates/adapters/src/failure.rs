//! Failure injection shared by the in-memory adapters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ferry_pipeline::CollaboratorError;

/// Fails the next `n` checked operations
#[derive(Debug, Default)]
pub struct SimulatedFailure {
    remaining: AtomicUsize,
    injected: AtomicU64,
}

impl SimulatedFailure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail
    pub fn fail_next(&self, count: usize) {
        self.remaining.store(count, Ordering::Relaxed);
    }

    /// Return an error if a failure is armed for `operation`
    pub fn check(&self, operation: &str) -> Result<(), CollaboratorError> {
        let armed = self
            .remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            self.injected.fetch_add(1, Ordering::Relaxed);
            return Err(CollaboratorError::new(format!("simulated {operation} failure")));
        }
        Ok(())
    }

    /// Failures returned so far
    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }
}
