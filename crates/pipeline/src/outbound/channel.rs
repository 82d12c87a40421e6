//! Channel selection
//!
//! A record's channel is derived from a stable hash of its routing key,
//! masked to the configured layout. The hash is xxh3 over the key bytes,
//! so every build routes a key to the same channel.

use std::sync::Arc;

use ferry_config::ChannelsConfig;
use xxhash_rust::xxh3::xxh3_64;

use crate::{ChannelFn, ChannelId};

/// Maps hashes to channels and classifies channel ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSelector {
    mask: u64,
    start: u32,
    end: u32,
    count: u32,
}

impl ChannelSelector {
    pub fn from_config(config: &ChannelsConfig) -> Self {
        Self {
            mask: config.mask,
            start: config.start,
            end: config.end,
            count: config.count,
        }
    }

    /// Channel for a routing hash
    #[inline]
    pub fn select(&self, hash: u64) -> ChannelId {
        // mask < count <= u32::MAX is enforced by validation
        ChannelId((hash & self.mask) as u32)
    }

    /// True if `channel` is one this instance expects to own
    #[inline]
    pub fn in_range(&self, channel: ChannelId) -> bool {
        (self.start..self.end).contains(&channel.0)
    }

    /// True if `channel` has a lane
    #[inline]
    pub fn has_lane(&self, channel: ChannelId) -> bool {
        channel.0 < self.count
    }

    /// Number of lanes
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Build a channel function from a per-item hash
    pub fn hashed<T, F>(self, hash: F) -> ChannelFn<T>
    where
        F: Fn(&T) -> u64 + Send + Sync + 'static,
    {
        Arc::new(move |item| self.select(hash(item)))
    }

    /// Build a channel function from a per-item routing key
    pub fn keyed<T, K, F>(self, key: F) -> ChannelFn<T>
    where
        K: AsRef<[u8]>,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.hashed(move |item| key_hash(&key(item)))
    }
}

/// Hash of a routing key, fixed across builds and platforms
#[inline]
pub fn key_hash<K: AsRef<[u8]> + ?Sized>(key: &K) -> u64 {
    xxh3_64(key.as_ref())
}
