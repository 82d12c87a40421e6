//! Collaborator traits
//!
//! The pipelines are generic over these four boundaries. Concrete broker,
//! database and serialization code lives behind them.

use async_trait::async_trait;
use std::time::Duration;

use crate::{ChannelId, Chunk, CollaboratorError};

/// Pull-based upstream message source (consumed by the inbound pipeline)
#[async_trait]
pub trait MessageSource<T>: Send + Sync {
    /// Opaque resume marker, e.g. per-partition offsets
    type Token: Send + Sync + 'static;

    /// Receive up to `max_items` items
    ///
    /// Must return within `timeout`. An empty chunk means nothing arrived.
    /// Items that fail to decode are dropped by the implementation and
    /// counted in [`Chunk::skipped`], so their token still gets acknowledged.
    async fn receive(
        &self,
        max_items: usize,
        timeout: Duration,
    ) -> Result<Chunk<T, Self::Token>, CollaboratorError>;

    /// Acknowledge consumption up to and including `token`
    ///
    /// Must be idempotent; a stale token is harmless.
    async fn acknowledge(&self, token: &Self::Token) -> Result<(), CollaboratorError>;
}

/// Downstream store the inbound pipeline applies batches to
#[async_trait]
pub trait ApplySink<T>: Send + Sync {
    /// Apply every item or fail the whole batch
    ///
    /// Must be idempotent per item identity; batches are retried.
    async fn apply_batch(&self, items: &[T]) -> Result<(), CollaboratorError>;
}

/// Store of pending rows (consumed by the outbound pipeline)
#[async_trait]
pub trait RowSource<T>: Send + Sync {
    /// Fetch one page of pending rows; an empty page ends the scan
    async fn fetch_page(&self, page: usize) -> Result<Vec<T>, CollaboratorError>;

    /// Mark rows as processed, returning how many rows were updated
    async fn commit_processed(&self, items: &[T]) -> Result<usize, CollaboratorError>;
}

/// Downstream publisher the outbound pipeline delivers through
#[async_trait]
pub trait MessageSender<T>: Send + Sync {
    /// Deliver `items` on `channel`
    ///
    /// Returns the indices (into `items`) of the items actually delivered.
    /// Everything else is retried later on the same channel.
    async fn send(&self, items: &[T], channel: ChannelId) -> Result<Vec<usize>, CollaboratorError>;
}
