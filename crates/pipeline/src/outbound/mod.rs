//! Outbound pipeline: page pending rows out of storage, publish per channel
//!
//! ```text
//!                       ┌─► Lane 0 ─┐
//! RowSource ─► [fetch] ─┼─► Lane 1 ─┼─► WorkerPool ─► MessageSender
//!     ▲        (dedup,  └─► Lane N ─┘        │
//!     │         route)                       ▼
//!     └──── commit_processed ◄──────── commit queue
//! ```
//!
//! A row is marked processed only after the sender accepted it. Rows the
//! sender did not accept go back to the tail of their lane. Ordering holds
//! per channel, modulo those retries.

mod channel;
mod fetcher;
mod lane;
mod pool;
mod worker;

pub use channel::{ChannelSelector, key_hash};

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;
use ferry_config::{OutboundConfig, validate_outbound};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics::{OutboundMetrics, OutboundMetricsHandle};
use crate::park::Parker;
use crate::{ChannelFn, IdentityFn, MessageSender, PipelineError, Result, RowSource};

use fetcher::Fetcher;
use lane::Lane;
use pool::WorkerPool;

/// State shared by the fetch loop and the channel workers
pub(crate) struct Shared<T> {
    id: String,
    config: OutboundConfig,
    selector: ChannelSelector,
    lanes: Vec<Lane<T>>,
    /// Items delivered but not yet marked processed
    commit_queue: SegQueue<T>,
    /// Items fetched but not yet marked processed
    in_flight: AtomicUsize,
    fetcher_wake: Parker,
    metrics: Arc<OutboundMetrics>,
    cancel: CancellationToken,
}

impl<T> Shared<T> {
    #[inline]
    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Outbound fetch-and-publish pipeline, ready to start
pub struct OutboundPipeline<T, K> {
    id: String,
    config: OutboundConfig,
    rows: Arc<dyn RowSource<T>>,
    sender: Arc<dyn MessageSender<T>>,
    identity: IdentityFn<T, K>,
    channel_of: ChannelFn<T>,
    metrics: Arc<OutboundMetrics>,
    cancel: CancellationToken,
}

impl<T, K> OutboundPipeline<T, K>
where
    T: Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Create a pipeline
    ///
    /// `channel_of` usually comes from [`ChannelSelector::hashed`] or
    /// [`ChannelSelector::keyed`] over the same channel layout.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if `config` fails validation.
    pub fn new(
        rows: Arc<dyn RowSource<T>>,
        sender: Arc<dyn MessageSender<T>>,
        identity: IdentityFn<T, K>,
        channel_of: ChannelFn<T>,
        config: OutboundConfig,
    ) -> Result<Self> {
        validate_outbound(&config)?;
        Ok(Self {
            id: "outbound".into(),
            config,
            rows,
            sender,
            identity,
            channel_of,
            metrics: Arc::new(OutboundMetrics::new()),
            cancel: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Stop when `cancel` fires, in addition to [`OutboundHandle::stop`]
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Selector for this pipeline's channel layout
    pub fn selector(&self) -> ChannelSelector {
        ChannelSelector::from_config(&self.config.channels)
    }

    pub fn metrics_handle(&self) -> OutboundMetricsHandle {
        OutboundMetricsHandle::new(self.id.clone(), Arc::clone(&self.metrics))
    }

    /// Spawn the worker pool and the fetch loop
    ///
    /// Must be called within a tokio runtime.
    pub fn start(self) -> OutboundHandle<T, K> {
        let selector = self.selector();
        let lanes = (0..selector.count()).map(|_| Lane::new()).collect();

        let shared = Arc::new(Shared {
            id: self.id,
            selector,
            lanes,
            commit_queue: SegQueue::new(),
            in_flight: AtomicUsize::new(0),
            fetcher_wake: Parker::new(),
            metrics: self.metrics,
            cancel: self.cancel,
            config: self.config,
        });

        tracing::info!(
            pipeline = %shared.id,
            channels = selector.count(),
            parallelism = shared.config.parallelism,
            max_fetch = shared.config.max_fetch,
            "starting outbound pipeline"
        );

        let job = {
            let shared = Arc::clone(&shared);
            let sender = self.sender;
            move |channel, submitter| {
                worker::process_lane(Arc::clone(&shared), Arc::clone(&sender), channel, submitter)
            }
        };
        let (pool, submitter) = WorkerPool::spawn(
            shared.config.parallelism,
            selector.count() as usize,
            shared.cancel.clone(),
            job,
        );

        let fetcher = Fetcher::new(
            Arc::clone(&shared),
            self.rows,
            self.identity,
            self.channel_of,
            submitter,
        );

        OutboundHandle {
            fetcher: tokio::spawn(fetcher.run()),
            pool,
            shared,
        }
    }
}

/// Running outbound pipeline
pub struct OutboundHandle<T, K> {
    shared: Arc<Shared<T>>,
    pool: WorkerPool,
    fetcher: JoinHandle<Fetcher<T, K>>,
}

impl<T, K> OutboundHandle<T, K>
where
    T: Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    pub fn metrics_handle(&self) -> OutboundMetricsHandle {
        OutboundMetricsHandle::new(self.shared.id.clone(), Arc::clone(&self.shared.metrics))
    }

    /// Items fetched but not yet marked processed
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight()
    }

    /// Items waiting in each channel lane, indexed by channel
    pub fn queued_per_channel(&self) -> Vec<usize> {
        self.shared.lanes.iter().map(Lane::len).collect()
    }

    /// Stop fetching and sending, then mark delivered rows processed
    ///
    /// Workers finish the sub-batch they are sending. Rows still queued
    /// stay pending in storage and are fetched again after restart.
    ///
    /// # Errors
    ///
    /// Returns a join failure or the final commit failure.
    pub async fn stop(self) -> Result<()> {
        self.shared.cancel.cancel();
        self.shared.fetcher_wake.unpark();

        let pool_result = self.pool.join().await;
        let mut fetcher = self.fetcher.await.map_err(PipelineError::Join)?;

        let committed = fetcher.commit().await;
        tracing::info!(
            pipeline = %self.shared.id,
            flushed = committed.as_ref().map_or(0, |n| *n),
            abandoned = self.shared.in_flight(),
            "outbound pipeline stopped"
        );

        pool_result?;
        committed.map(|_| ())
    }
}
