//! Outbound (fetch-and-publish) pipeline configuration

use serde::Deserialize;
use std::time::Duration;

use crate::inbound::DEFAULT_DEDUP_CAPACITY;

/// Channel layout for outbound routing
///
/// A record's channel is `hash & mask`. Channels in `[start, end)` are the
/// ones this instance expects to own; anything outside is still delivered
/// but reported as an anomaly.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Number of channel lanes
    pub count: u32,
    /// First expected channel (inclusive)
    pub start: u32,
    /// Last expected channel (exclusive)
    pub end: u32,
    /// Bit mask applied to a record's hash
    pub mask: u64,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            count: 16,
            start: 0,
            end: 16,
            mask: 15,
        }
    }
}

/// Outbound pipeline configuration
///
/// # Example
///
/// ```toml
/// [outbound]
/// parallelism = 4
/// max_fetch = 4096
///
/// [outbound.channels]
/// count = 32
/// end = 32
/// mask = 31
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    /// Worker tasks shared by all channels
    /// Default: 4
    pub parallelism: usize,

    /// Fetched-but-uncommitted items above which fetching pauses
    /// Default: 4096
    pub max_fetch: usize,

    /// Items a channel may send before yielding its worker
    /// Default: 1024
    pub max_processing_chunk: usize,

    /// Items offered to the sender per call
    /// Default: 128
    pub send_batch_size: usize,

    /// Items marked processed per storage call
    /// Default: 32
    pub commit_batch_size: usize,

    /// Park duration of the fetch loop when idle
    #[serde(with = "humantime_serde")]
    pub idle_interval: Duration,

    /// Pause before a failed channel or iteration is retried
    #[serde(with = "humantime_serde")]
    pub error_cooldown: Duration,

    /// Recently seen identities remembered for deduplication
    pub dedup_capacity: usize,

    /// Channel layout
    pub channels: ChannelsConfig,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            max_fetch: 4096,
            max_processing_chunk: 1024,
            send_batch_size: 128,
            commit_batch_size: 32,
            idle_interval: Duration::from_millis(50),
            error_cooldown: Duration::from_secs(15),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            channels: ChannelsConfig::default(),
        }
    }
}
