//! Pipeline metrics
//!
//! Atomic counters for both engines. All counters use relaxed ordering;
//! values are eventually consistent, not real-time.

use ferry_metrics::{
    InboundMetricsProvider, InboundSnapshot, OutboundMetricsProvider, OutboundSnapshot,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the inbound (consume-and-apply) pipeline
#[derive(Debug, Default)]
pub struct InboundMetrics {
    chunks_received: AtomicU64,
    items_received: AtomicU64,
    duplicates_skipped: AtomicU64,
    items_applied: AtomicU64,
    apply_batches: AtomicU64,
    apply_failures: AtomicU64,
    acks: AtomicU64,
    source_failures: AtomicU64,
    buffered: AtomicU64,
}

impl InboundMetrics {
    pub const fn new() -> Self {
        Self {
            chunks_received: AtomicU64::new(0),
            items_received: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            items_applied: AtomicU64::new(0),
            apply_batches: AtomicU64::new(0),
            apply_failures: AtomicU64::new(0),
            acks: AtomicU64::new(0),
            source_failures: AtomicU64::new(0),
            buffered: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_received(&self, items: usize, buffered: usize) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.items_received
            .fetch_add(items as u64, Ordering::Relaxed);
        self.set_buffered(buffered);
    }

    #[inline]
    pub fn record_duplicates(&self, count: usize) {
        if count > 0 {
            self.duplicates_skipped
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_applied(&self, items: usize) {
        self.apply_batches.fetch_add(1, Ordering::Relaxed);
        self.items_applied
            .fetch_add(items as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_apply_failure(&self) {
        self.apply_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ack(&self) {
        self.acks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_source_failure(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_buffered(&self, buffered: usize) {
        self.buffered.store(buffered as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> InboundSnapshot {
        InboundSnapshot {
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            items_received: self.items_received.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            items_applied: self.items_applied.load(Ordering::Relaxed),
            apply_batches: self.apply_batches.load(Ordering::Relaxed),
            apply_failures: self.apply_failures.load(Ordering::Relaxed),
            acks: self.acks.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
        }
    }
}

/// Counters for the outbound (fetch-and-publish) pipeline
#[derive(Debug, Default)]
pub struct OutboundMetrics {
    items_fetched: AtomicU64,
    duplicates_skipped: AtomicU64,
    items_sent: AtomicU64,
    items_rejected: AtomicU64,
    send_failures: AtomicU64,
    items_committed: AtomicU64,
    commit_shortfall: AtomicU64,
    storage_failures: AtomicU64,
    out_of_range: AtomicU64,
    unroutable: AtomicU64,
    in_flight: AtomicU64,
}

impl OutboundMetrics {
    pub const fn new() -> Self {
        Self {
            items_fetched: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            items_sent: AtomicU64::new(0),
            items_rejected: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            items_committed: AtomicU64::new(0),
            commit_shortfall: AtomicU64::new(0),
            storage_failures: AtomicU64::new(0),
            out_of_range: AtomicU64::new(0),
            unroutable: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_fetched(&self, items: usize) {
        self.items_fetched
            .fetch_add(items as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_duplicate(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sent(&self, accepted: usize, rejected: usize) {
        self.items_sent
            .fetch_add(accepted as u64, Ordering::Relaxed);
        self.items_rejected
            .fetch_add(rejected as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_committed(&self, requested: usize, affected: usize) {
        self.items_committed
            .fetch_add(requested as u64, Ordering::Relaxed);
        self.commit_shortfall
            .fetch_add(requested.saturating_sub(affected) as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_storage_failure(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_out_of_range(&self) {
        self.out_of_range.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unroutable(&self) {
        self.unroutable.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_in_flight(&self, in_flight: usize) {
        self.in_flight.store(in_flight as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OutboundSnapshot {
        OutboundSnapshot {
            items_fetched: self.items_fetched.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            items_sent: self.items_sent.load(Ordering::Relaxed),
            items_rejected: self.items_rejected.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            items_committed: self.items_committed.load(Ordering::Relaxed),
            commit_shortfall: self.commit_shortfall.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            out_of_range: self.out_of_range.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Handle for reporting inbound pipeline metrics
#[derive(Clone)]
pub struct InboundMetricsHandle {
    id: String,
    metrics: Arc<InboundMetrics>,
}

impl InboundMetricsHandle {
    pub(crate) fn new(id: impl Into<String>, metrics: Arc<InboundMetrics>) -> Self {
        Self {
            id: id.into(),
            metrics,
        }
    }
}

impl InboundMetricsProvider for InboundMetricsHandle {
    fn pipeline_id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> InboundSnapshot {
        self.metrics.snapshot()
    }
}

/// Handle for reporting outbound pipeline metrics
#[derive(Clone)]
pub struct OutboundMetricsHandle {
    id: String,
    metrics: Arc<OutboundMetrics>,
}

impl OutboundMetricsHandle {
    pub(crate) fn new(id: impl Into<String>, metrics: Arc<OutboundMetrics>) -> Self {
        Self {
            id: id.into(),
            metrics,
        }
    }
}

impl OutboundMetricsProvider for OutboundMetricsHandle {
    fn pipeline_id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> OutboundSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // InboundMetrics Tests
    // ========================================================================

    #[test]
    fn test_inbound_new() {
        assert_eq!(InboundMetrics::new().snapshot(), InboundSnapshot::default());
    }

    #[test]
    fn test_inbound_record() {
        let metrics = InboundMetrics::new();
        metrics.record_received(50, 50);
        metrics.record_received(60, 110);
        metrics.record_duplicates(0);
        metrics.record_duplicates(5);
        metrics.record_applied(40);
        metrics.record_apply_failure();
        metrics.record_ack();
        metrics.set_buffered(70);

        let s = metrics.snapshot();
        assert_eq!(s.chunks_received, 2);
        assert_eq!(s.items_received, 110);
        assert_eq!(s.duplicates_skipped, 5);
        assert_eq!(s.items_applied, 40);
        assert_eq!(s.apply_batches, 1);
        assert_eq!(s.apply_failures, 1);
        assert_eq!(s.acks, 1);
        assert_eq!(s.buffered, 70);
    }

    #[test]
    fn test_inbound_handle() {
        let metrics = Arc::new(InboundMetrics::new());
        let handle = InboundMetricsHandle::new("orders", Arc::clone(&metrics));
        metrics.record_applied(3);

        assert_eq!(handle.pipeline_id(), "orders");
        assert_eq!(handle.snapshot().items_applied, 3);
    }

    // ========================================================================
    // OutboundMetrics Tests
    // ========================================================================

    #[test]
    fn test_outbound_record() {
        let metrics = OutboundMetrics::new();
        metrics.record_fetched(80);
        metrics.record_duplicate();
        metrics.record_sent(100, 28);
        metrics.record_send_failure();
        metrics.record_committed(32, 30);
        metrics.record_committed(32, 32);
        metrics.record_out_of_range();
        metrics.record_unroutable();
        metrics.set_in_flight(16);

        let s = metrics.snapshot();
        assert_eq!(s.items_fetched, 80);
        assert_eq!(s.duplicates_skipped, 1);
        assert_eq!(s.items_sent, 100);
        assert_eq!(s.items_rejected, 28);
        assert_eq!(s.send_failures, 1);
        assert_eq!(s.items_committed, 64);
        assert_eq!(s.commit_shortfall, 2);
        assert_eq!(s.out_of_range, 1);
        assert_eq!(s.unroutable, 1);
        assert_eq!(s.in_flight, 16);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let metrics = Arc::new(OutboundMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        m.record_sent(1, 0);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot().items_sent, 4000);
    }
}
