//! Pending-ack slot
//!
//! Holds only the newest resume token that has been applied downstream but
//! not yet acknowledged upstream. Acknowledgment is monotonic, so older
//! tokens are simply overwritten.

use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Single-slot holder for the latest unacknowledged token
#[derive(Debug)]
pub struct PendingAck<R> {
    slot: ArcSwapOption<R>,
}

impl<R> PendingAck<R> {
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
        }
    }

    /// Replace whatever token is pending with `token`
    pub fn store(&self, token: R) {
        self.slot.store(Some(Arc::new(token)));
    }

    /// The token currently pending, if any
    pub fn current(&self) -> Option<Arc<R>> {
        self.slot.load_full()
    }

    /// Clear the slot only if it still holds `token`
    ///
    /// Returns false when a newer token was stored in the meantime; that
    /// token stays pending for the next cycle.
    pub fn clear_if(&self, token: &Arc<R>) -> bool {
        let previous = self.slot.compare_and_swap(token, None);
        matches!(&*previous, Some(p) if Arc::ptr_eq(p, token))
    }

    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }
}

impl<R> Default for PendingAck<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_overwrites() {
        let slot = PendingAck::new();
        assert!(slot.is_empty());

        slot.store(10u64);
        slot.store(20u64);
        assert_eq!(*slot.current().unwrap(), 20);
    }

    #[test]
    fn test_clear_if_same_token() {
        let slot = PendingAck::new();
        slot.store("offsets-1");

        let token = slot.current().unwrap();
        assert!(slot.clear_if(&token));
        assert!(slot.is_empty());
        assert!(slot.current().is_none());
    }

    #[test]
    fn test_clear_if_keeps_newer_token() {
        let slot = PendingAck::new();
        slot.store(1u32);
        let observed = slot.current().unwrap();

        // Committer stores a newer token while the ack call is in flight
        slot.store(2u32);

        assert!(!slot.clear_if(&observed));
        assert_eq!(*slot.current().unwrap(), 2);
    }

    #[test]
    fn test_equal_value_is_not_same_token() {
        let slot = PendingAck::new();
        slot.store(5u32);
        let observed = slot.current().unwrap();
        slot.store(5u32);

        // Identity, not value equality, decides
        assert!(!slot.clear_if(&observed));
        assert!(!slot.is_empty());
    }
}
