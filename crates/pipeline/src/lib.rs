//! Ferry - Pipeline
//!
//! Two generic engines that move change records between a pull-based
//! message source and a relational store, with at-least-once delivery.
//!
//! # Architecture
//!
//! ```text
//! Inbound:   MessageSource ──→ [receive] ──→ ChunkBuffer ──→ [commit] ──→ ApplySink
//!                 ▲                            (dedup)           │
//!                 └──────── acknowledge ◄── PendingAck ◄─────────┘
//!
//! Outbound:  RowSource ──→ [fetch] ──→ Lane per channel ──→ WorkerPool ──→ MessageSender
//!                 ▲        (dedup)                                             │
//!                 └────────── commit_processed ◄──── commit queue ◄────────────┘
//! ```
//!
//! # Key Design
//!
//! - **Injected identity**: dedup keys and channels come from caller closures
//! - **Bounded memory**: inbound receive pauses at half the buffer capacity,
//!   outbound fetch pauses at `max_fetch` uncommitted rows
//! - **Ack after apply**: a resume token is acknowledged only once every
//!   item of its chunk reached the sink
//! - **Cooperative lanes**: a channel yields its worker after
//!   `max_processing_chunk` items and rejoins the pool queue at the tail
//! - **Failure isolation**: a failing channel cools down without stalling
//!   the others; failed batches are retried as a whole
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ferry_pipeline::InboundPipeline;
//!
//! let pipeline = InboundPipeline::new(
//!     source,
//!     sink,
//!     Arc::new(|record: &Record| record.id),
//!     config.inbound.clone(),
//! )?;
//! let handle = pipeline.with_id("orders").start();
//!
//! // ... on shutdown
//! handle.stop().await?;
//! ```

mod ack;
mod buffer;
mod dedup;
mod error;
mod inbound;
mod item;
mod metrics;
mod outbound;
mod park;
mod rate_limited;
mod traits;

pub use ack::PendingAck;
pub use buffer::{ChunkBuffer, Drained};
pub use dedup::DedupCache;
pub use error::{BoxError, CollaboratorError, PipelineError, Result};
pub use inbound::{DynSource, InboundHandle, InboundPipeline};
pub use item::{ChannelFn, ChannelId, Chunk, IdentityFn};
pub use metrics::{InboundMetrics, InboundMetricsHandle, OutboundMetrics, OutboundMetricsHandle};
pub use outbound::{ChannelSelector, OutboundHandle, OutboundPipeline, key_hash};
pub use rate_limited::RateLimitedLogger;
pub use traits::{ApplySink, MessageSender, MessageSource, RowSource};
