//! Inbound (consume-and-apply) pipeline configuration

use serde::Deserialize;
use std::time::Duration;

/// Default dedup cache capacity for both pipelines
pub const DEFAULT_DEDUP_CAPACITY: usize = 65_535;

/// Inbound pipeline configuration
///
/// # Example
///
/// ```toml
/// [inbound]
/// sink_batch_size = 512
/// sink_batch_cap = 1024
/// buffer_capacity = 8192
/// receive_timeout = "1s"
/// error_cooldown = "15s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InboundConfig {
    /// Buffered item count above which the committer is woken
    /// Default: 512
    pub sink_batch_size: usize,

    /// Maximum items handed to the sink in one apply call
    /// Default: 1024
    pub sink_batch_cap: usize,

    /// Buffer capacity; receiving pauses while half of it is used
    /// Default: 8192
    pub buffer_capacity: usize,

    /// Maximum items requested per receive call
    /// Default: same as `buffer_capacity`
    pub receive_max_items: Option<usize>,

    /// Upper bound on a single receive call
    #[serde(with = "humantime_serde")]
    pub receive_timeout: Duration,

    /// Park duration when a loop has nothing to do
    #[serde(with = "humantime_serde")]
    pub idle_interval: Duration,

    /// A non-empty buffer is committed at least this often
    #[serde(with = "humantime_serde")]
    pub commit_interval: Duration,

    /// Pause after a failed loop iteration
    #[serde(with = "humantime_serde")]
    pub error_cooldown: Duration,

    /// Receive calls per receive-loop iteration
    /// Default: 10
    pub receive_burst: usize,

    /// Recently seen identities remembered for deduplication
    /// Default: 65535
    pub dedup_capacity: usize,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            sink_batch_size: 512,
            sink_batch_cap: 1024,
            buffer_capacity: 8192,
            receive_max_items: None,
            receive_timeout: Duration::from_secs(1),
            idle_interval: Duration::from_secs(1),
            commit_interval: Duration::from_secs(1),
            error_cooldown: Duration::from_secs(15),
            receive_burst: 10,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

impl InboundConfig {
    /// Items requested per receive call
    pub fn effective_receive_max_items(&self) -> usize {
        self.receive_max_items.unwrap_or(self.buffer_capacity).max(1)
    }

    /// Buffered count below which the receiver keeps pulling
    #[inline]
    pub fn low_watermark(&self) -> usize {
        self.buffer_capacity / 2
    }
}
