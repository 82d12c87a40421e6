//! Metrics provider traits
//!
//! Pipelines expose their counters through these traits so the reporter
//! can collect them without knowing the concrete payload types.
//!
//! # Design
//!
//! - Providers are `Send + Sync` and read atomics through `&self`
//! - Snapshots are plain `Copy` structs, safe to keep across intervals

/// Point-in-time snapshot of an inbound (consume-and-apply) pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct InboundSnapshot {
    /// Non-empty chunks received from the message source
    pub chunks_received: u64,
    /// Items received (before deduplication)
    pub items_received: u64,
    /// Items skipped because their identity was seen recently
    pub duplicates_skipped: u64,
    /// Items handed to the sink in successful apply calls
    pub items_applied: u64,
    /// Successful apply calls
    pub apply_batches: u64,
    /// Failed apply calls
    pub apply_failures: u64,
    /// Resume tokens acknowledged to the source
    pub acks: u64,
    /// Failed receive or acknowledge calls
    pub source_failures: u64,
    /// Items currently owned by the pipeline (gauge)
    pub buffered: u64,
}

/// Point-in-time snapshot of an outbound (fetch-and-publish) pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct OutboundSnapshot {
    /// Rows fetched from storage (before deduplication)
    pub items_fetched: u64,
    /// Rows skipped because their identity was seen recently
    pub duplicates_skipped: u64,
    /// Items accepted by the sender
    pub items_sent: u64,
    /// Items offered but not accepted (re-queued)
    pub items_rejected: u64,
    /// Failed send calls
    pub send_failures: u64,
    /// Items acknowledged as processed in storage
    pub items_committed: u64,
    /// Items storage reported as not updated on commit
    pub commit_shortfall: u64,
    /// Failed fetch or commit calls
    pub storage_failures: u64,
    /// Items routed to a channel outside the expected range
    pub out_of_range: u64,
    /// Items whose channel has no lane
    pub unroutable: u64,
    /// Fetched items not yet committed (gauge)
    pub in_flight: u64,
}

/// Trait for inbound pipelines to provide metrics to the reporter
pub trait InboundMetricsProvider: Send + Sync {
    /// Unique identifier for this pipeline instance
    fn pipeline_id(&self) -> &str;

    /// Get a snapshot of current metrics
    fn snapshot(&self) -> InboundSnapshot;
}

/// Trait for outbound pipelines to provide metrics to the reporter
pub trait OutboundMetricsProvider: Send + Sync {
    /// Unique identifier for this pipeline instance
    fn pipeline_id(&self) -> &str;

    /// Get a snapshot of current metrics
    fn snapshot(&self) -> OutboundSnapshot;
}
