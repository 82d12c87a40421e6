//! Inbound pipeline: consume from a message source, apply to a sink
//!
//! ```text
//!                 ┌──────────── wake (buffered > sink_batch_size) ───────────┐
//!                 │                                                           ▼
//! MessageSource ──► [receive loop] ──► ChunkBuffer (+dedup) ──► [commit loop] ──► ApplySink
//!       ▲                 │                                           │
//!       └── acknowledge ──┴──────── PendingAck ◄──── token ───────────┘
//! ```
//!
//! Acknowledgment trails application by one receive cycle: a token is only
//! stored after the batch containing its chunk's items was applied, and is
//! only sent upstream on the receiver's next iteration.

mod committer;
mod receiver;

use std::hash::Hash;
use std::sync::Arc;

use ferry_config::{InboundConfig, validate_inbound};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ack::PendingAck;
use crate::buffer::ChunkBuffer;
use crate::metrics::{InboundMetrics, InboundMetricsHandle};
use crate::park::Parker;
use crate::{ApplySink, IdentityFn, MessageSource, PipelineError, Result};

use committer::Committer;
use receiver::Receiver;

/// Source of received chunks, tied to its token type
pub type DynSource<T, R> = Arc<dyn MessageSource<T, Token = R>>;

/// State shared by the receive and commit loops
pub(crate) struct Shared<T, K, R> {
    id: String,
    config: InboundConfig,
    buffer: ChunkBuffer<T, K, R>,
    pending_ack: PendingAck<R>,
    receiver_wake: Parker,
    committer_wake: Parker,
    metrics: Arc<InboundMetrics>,
    cancel: CancellationToken,
}

/// Inbound consume-and-apply pipeline, ready to start
pub struct InboundPipeline<T, K, R> {
    id: String,
    config: InboundConfig,
    source: DynSource<T, R>,
    sink: Arc<dyn ApplySink<T>>,
    identity: IdentityFn<T, K>,
    metrics: Arc<InboundMetrics>,
    cancel: CancellationToken,
}

impl<T, K, R> InboundPipeline<T, K, R>
where
    T: Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    /// Create a pipeline
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if `config` fails validation.
    pub fn new(
        source: DynSource<T, R>,
        sink: Arc<dyn ApplySink<T>>,
        identity: IdentityFn<T, K>,
        config: InboundConfig,
    ) -> Result<Self> {
        validate_inbound(&config)?;
        Ok(Self {
            id: "inbound".into(),
            config,
            source,
            sink,
            identity,
            metrics: Arc::new(InboundMetrics::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Set the name used in logs and metrics
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Stop when `cancel` fires, in addition to [`InboundHandle::stop`]
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn metrics_handle(&self) -> InboundMetricsHandle {
        InboundMetricsHandle::new(self.id.clone(), Arc::clone(&self.metrics))
    }

    /// Spawn the receive and commit loops
    ///
    /// Must be called within a tokio runtime.
    pub fn start(self) -> InboundHandle<T, K, R> {
        let shared = Arc::new(Shared {
            buffer: ChunkBuffer::new(self.identity, self.config.dedup_capacity),
            pending_ack: PendingAck::new(),
            receiver_wake: Parker::new(),
            committer_wake: Parker::new(),
            id: self.id,
            config: self.config,
            metrics: self.metrics,
            cancel: self.cancel,
        });

        tracing::info!(
            pipeline = %shared.id,
            sink_batch_size = shared.config.sink_batch_size,
            sink_batch_cap = shared.config.sink_batch_cap,
            buffer_capacity = shared.config.buffer_capacity,
            "starting inbound pipeline"
        );

        let receiver = Receiver::new(Arc::clone(&shared), Arc::clone(&self.source));
        let committer = Committer::new(Arc::clone(&shared), self.sink);

        let tasks = vec![
            tokio::spawn(receiver.run()),
            tokio::spawn(committer.run()),
        ];

        InboundHandle {
            shared,
            source: self.source,
            tasks,
        }
    }
}

/// Running inbound pipeline
pub struct InboundHandle<T, K, R> {
    shared: Arc<Shared<T, K, R>>,
    source: DynSource<T, R>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T, K, R> InboundHandle<T, K, R>
where
    T: Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn metrics_handle(&self) -> InboundMetricsHandle {
        InboundMetricsHandle::new(self.shared.id.clone(), Arc::clone(&self.shared.metrics))
    }

    /// Items currently owned by the pipeline
    pub fn buffered(&self) -> usize {
        self.shared.buffer.buffered()
    }

    /// True if an applied token is still waiting to be acknowledged
    pub fn has_pending_ack(&self) -> bool {
        !self.shared.pending_ack.is_empty()
    }

    /// Stop both loops and acknowledge work that was already applied
    ///
    /// Items still buffered are not applied; the source redelivers them.
    ///
    /// # Errors
    ///
    /// Returns the first loop join failure, or the final acknowledge
    /// failure.
    pub async fn stop(self) -> Result<()> {
        self.shared.cancel.cancel();
        self.shared.receiver_wake.unpark();
        self.shared.committer_wake.unpark();

        let mut first_error = None;
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(pipeline = %self.shared.id, error = %e, "inbound task failed");
                first_error.get_or_insert(PipelineError::Join(e));
            }
        }

        if let Some(token) = self.shared.pending_ack.current() {
            match self.source.acknowledge(&token).await {
                Ok(()) => {
                    self.shared.pending_ack.clear_if(&token);
                    self.shared.metrics.record_ack();
                }
                Err(e) => {
                    tracing::warn!(pipeline = %self.shared.id, error = %e, "final acknowledge failed");
                    self.shared.metrics.record_source_failure();
                    first_error.get_or_insert(PipelineError::Acknowledge(e));
                }
            }
        }

        tracing::info!(
            pipeline = %self.shared.id,
            abandoned = self.shared.buffer.buffered(),
            "inbound pipeline stopped"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
