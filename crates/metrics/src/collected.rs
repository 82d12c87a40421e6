//! Collected metrics snapshot and rate calculations
//!
//! Holds every registered pipeline's snapshot at one instant and derives
//! per-second rates against the previous collection.

use crate::{InboundSnapshot, OutboundSnapshot};
use std::time::{Duration, Instant};

/// Collected inbound snapshot with its pipeline id
#[derive(Debug, Clone)]
pub struct CollectedInbound {
    pub id: String,
    pub snapshot: InboundSnapshot,
}

/// Collected outbound snapshot with its pipeline id
#[derive(Debug, Clone)]
pub struct CollectedOutbound {
    pub id: String,
    pub snapshot: OutboundSnapshot,
}

/// Complete metrics collection at a point in time
#[derive(Debug, Clone, Default)]
pub struct CollectedMetrics {
    /// When this collection was taken
    pub timestamp: Option<Instant>,

    /// Inbound pipelines
    pub inbound: Vec<CollectedInbound>,

    /// Outbound pipelines
    pub outbound: Vec<CollectedOutbound>,
}

impl CollectedMetrics {
    /// Create a new empty collection stamped with the current time
    pub fn new() -> Self {
        Self {
            timestamp: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Calculate rates by comparing with a previous collection
    ///
    /// Returns None if either timestamp is missing or no time has elapsed.
    /// Pipelines are matched by id; ones missing from `previous` are skipped.
    pub fn rates(&self, previous: &CollectedMetrics) -> Option<MetricsRates> {
        let current_ts = self.timestamp?;
        let previous_ts = previous.timestamp?;

        let elapsed = current_ts.duration_since(previous_ts);
        if elapsed.is_zero() {
            return None;
        }
        let secs = elapsed.as_secs_f64();

        let inbound = self
            .inbound
            .iter()
            .filter_map(|current| {
                let prev = previous.inbound.iter().find(|p| p.id == current.id)?;
                let (c, p) = (&current.snapshot, &prev.snapshot);
                Some(InboundRates {
                    id: current.id.clone(),
                    received_per_sec: rate(c.items_received, p.items_received, secs),
                    applied_per_sec: rate(c.items_applied, p.items_applied, secs),
                    duplicates: c.duplicates_skipped.saturating_sub(p.duplicates_skipped),
                    errors: (c.apply_failures + c.source_failures)
                        .saturating_sub(p.apply_failures + p.source_failures),
                    buffered: c.buffered,
                })
            })
            .collect();

        let outbound = self
            .outbound
            .iter()
            .filter_map(|current| {
                let prev = previous.outbound.iter().find(|p| p.id == current.id)?;
                let (c, p) = (&current.snapshot, &prev.snapshot);
                Some(OutboundRates {
                    id: current.id.clone(),
                    fetched_per_sec: rate(c.items_fetched, p.items_fetched, secs),
                    sent_per_sec: rate(c.items_sent, p.items_sent, secs),
                    committed_per_sec: rate(c.items_committed, p.items_committed, secs),
                    rejected: c.items_rejected.saturating_sub(p.items_rejected),
                    errors: (c.send_failures + c.storage_failures)
                        .saturating_sub(p.send_failures + p.storage_failures),
                    in_flight: c.in_flight,
                })
            })
            .collect();

        Some(MetricsRates {
            elapsed,
            inbound,
            outbound,
        })
    }
}

/// Calculate rate per second
#[inline]
fn rate(current: u64, previous: u64, elapsed_secs: f64) -> f64 {
    let delta = current.saturating_sub(previous);
    delta as f64 / elapsed_secs
}

/// Calculated rates between two collections
#[derive(Debug, Clone)]
pub struct MetricsRates {
    /// Time elapsed between collections
    pub elapsed: Duration,
    pub inbound: Vec<InboundRates>,
    pub outbound: Vec<OutboundRates>,
}

/// Inbound pipeline rates
#[derive(Debug, Clone)]
pub struct InboundRates {
    pub id: String,
    pub received_per_sec: f64,
    pub applied_per_sec: f64,
    /// Duplicates skipped during the interval
    pub duplicates: u64,
    /// Failed collaborator calls during the interval
    pub errors: u64,
    /// Items owned by the pipeline at collection time
    pub buffered: u64,
}

/// Outbound pipeline rates
#[derive(Debug, Clone)]
pub struct OutboundRates {
    pub id: String,
    pub fetched_per_sec: f64,
    pub sent_per_sec: f64,
    pub committed_per_sec: f64,
    /// Items re-queued after partial acceptance during the interval
    pub rejected: u64,
    /// Failed collaborator calls during the interval
    pub errors: u64,
    /// Fetched but uncommitted items at collection time
    pub in_flight: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(at: Instant, applied: u64, sent: u64) -> CollectedMetrics {
        CollectedMetrics {
            timestamp: Some(at),
            inbound: vec![CollectedInbound {
                id: "inbound".into(),
                snapshot: InboundSnapshot {
                    items_received: applied + 10,
                    items_applied: applied,
                    buffered: 7,
                    ..Default::default()
                },
            }],
            outbound: vec![CollectedOutbound {
                id: "outbound".into(),
                snapshot: OutboundSnapshot {
                    items_sent: sent,
                    send_failures: sent / 100,
                    in_flight: 3,
                    ..Default::default()
                },
            }],
        }
    }

    #[test]
    fn test_rates() {
        let start = Instant::now();
        let previous = collection(start, 100, 1000);
        let current = collection(start + Duration::from_secs(10), 1100, 3000);

        let rates = current.rates(&previous).unwrap();
        assert_eq!(rates.elapsed, Duration::from_secs(10));
        assert_eq!(rates.inbound.len(), 1);
        assert!((rates.inbound[0].applied_per_sec - 100.0).abs() < f64::EPSILON);
        assert_eq!(rates.inbound[0].buffered, 7);
        assert!((rates.outbound[0].sent_per_sec - 200.0).abs() < f64::EPSILON);
        assert_eq!(rates.outbound[0].errors, 20);
        assert_eq!(rates.outbound[0].in_flight, 3);
    }

    #[test]
    fn test_rates_without_timestamp() {
        let current = CollectedMetrics::new();
        assert!(current.rates(&CollectedMetrics::default()).is_none());
    }

    #[test]
    fn test_rates_zero_elapsed() {
        let now = Instant::now();
        let a = collection(now, 1, 1);
        let b = collection(now, 2, 2);
        assert!(b.rates(&a).is_none());
    }

    #[test]
    fn test_rates_skip_new_pipelines() {
        let start = Instant::now();
        let previous = CollectedMetrics {
            timestamp: Some(start),
            ..Default::default()
        };
        let current = collection(start + Duration::from_secs(1), 5, 5);

        let rates = current.rates(&previous).unwrap();
        assert!(rates.inbound.is_empty());
        assert!(rates.outbound.is_empty());
    }

    #[test]
    fn test_counter_reset_saturates() {
        let start = Instant::now();
        let previous = collection(start, 500, 500);
        let current = collection(start + Duration::from_secs(1), 100, 100);

        let rates = current.rates(&previous).unwrap();
        assert_eq!(rates.inbound[0].applied_per_sec, 0.0);
        assert_eq!(rates.outbound[0].sent_per_sec, 0.0);
    }
}
