//! Item-level types shared by both pipelines

use std::fmt;
use std::sync::Arc;

/// Extracts the dedup identity of an item
pub type IdentityFn<T, K> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// Selects the outbound channel of an item
pub type ChannelFn<T> = Arc<dyn Fn(&T) -> ChannelId + Send + Sync>;

/// Items returned by one receive call plus the token that acknowledges them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<T, R> {
    pub items: Vec<T>,
    pub token: R,
    /// Messages consumed by the source but dropped before becoming items
    pub skipped: usize,
}

impl<T, R> Chunk<T, R> {
    pub fn new(items: Vec<T>, token: R) -> Self {
        Self {
            items,
            token,
            skipped: 0,
        }
    }

    /// Record messages the source consumed without yielding items
    pub fn with_skipped(mut self, skipped: usize) -> Self {
        self.skipped = skipped;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Outbound delivery lane identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Lane index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel:{}", self.0)
    }
}

impl From<u32> for ChannelId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
