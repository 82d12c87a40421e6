//! Rate-limited anomaly logging
//!
//! Routing anomalies can repeat for every item of every page. This logs at
//! most once per interval and reports how many events were suppressed in
//! between.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between log lines
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Log level used when an event is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Warn,
    Error,
}

/// Logs at most once per interval, counting suppressed events
#[derive(Debug)]
pub struct RateLimitedLogger {
    min_interval: Duration,
    last_log_time: Mutex<Option<Instant>>,
    suppressed: AtomicU64,
    total: AtomicU64,
}

impl RateLimitedLogger {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log_time: Mutex::new(None),
            suppressed: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record a warning; returns true if it was logged
    pub fn warn(&self, message: &str, detail: &dyn std::fmt::Display) -> bool {
        self.record(Level::Warn, message, detail)
    }

    /// Record an error; returns true if it was logged
    pub fn error(&self, message: &str, detail: &dyn std::fmt::Display) -> bool {
        self.record(Level::Error, message, detail)
    }

    /// Events recorded since creation
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn record(&self, level: Level, message: &str, detail: &dyn std::fmt::Display) -> bool {
        self.total.fetch_add(1, Ordering::Relaxed);

        if !self.should_log() {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let suppressed = self.suppressed.swap(0, Ordering::Relaxed);
        let total = self.total.load(Ordering::Relaxed);
        match level {
            Level::Warn => tracing::warn!(
                anomaly = %message,
                detail = %detail,
                suppressed_count = suppressed,
                total_events = total,
                "routing anomaly"
            ),
            Level::Error => tracing::error!(
                anomaly = %message,
                detail = %detail,
                suppressed_count = suppressed,
                total_events = total,
                "routing anomaly"
            ),
        }
        true
    }

    fn should_log(&self) -> bool {
        let mut last_time = self.last_log_time.lock();
        let now = Instant::now();

        match *last_time {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                *last_time = Some(now);
                true
            }
        }
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}
