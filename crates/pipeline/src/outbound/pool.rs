//! Worker pool shared by all channel lanes
//!
//! `parallelism` long-lived tasks pull channel ids from a bounded MPMC
//! queue and run one processing slice per id. A lane that still has work
//! after its slice is resubmitted at the tail, so every scheduled channel
//! gets pool time before any channel runs twice.

use std::future::Future;

use crossfire::{MAsyncRx, MAsyncTx, TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{ChannelId, PipelineError, Result};

/// Enqueues channel ids for the pool
#[derive(Clone)]
pub(crate) struct Submitter {
    tx: MAsyncTx<ChannelId>,
}

impl Submitter {
    /// Schedule `channel`; never blocks
    ///
    /// Returns false if the queue refused it. The caller must then mark the
    /// lane idle so it is rescheduled later.
    pub fn submit(&self, channel: ChannelId) -> bool {
        match self.tx.try_send(channel) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%channel, "worker queue full, channel left for reschedule");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

pub(crate) struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `parallelism` workers running `job` for each submitted channel
    ///
    /// `capacity` bounds the queue; with one outstanding schedule per lane
    /// the lane count is sufficient.
    pub fn spawn<F, Fut>(
        parallelism: usize,
        capacity: usize,
        cancel: CancellationToken,
        job: F,
    ) -> (Self, Submitter)
    where
        F: Fn(ChannelId, Submitter) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = crossfire::mpmc::bounded_async::<ChannelId>(capacity.max(1));
        let submitter = Submitter { tx };

        let workers = (0..parallelism)
            .map(|worker_id| {
                let rx = rx.clone();
                let submitter = submitter.clone();
                let cancel = cancel.clone();
                let job = job.clone();
                tokio::spawn(worker_loop(worker_id, rx, submitter, cancel, job))
            })
            .collect();

        (Self { workers }, submitter)
    }

    /// Wait for every worker to exit
    ///
    /// # Errors
    ///
    /// Returns the first worker join failure.
    pub async fn join(self) -> Result<()> {
        let mut first_error = None;
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "channel worker failed");
                first_error.get_or_insert(PipelineError::Join(e));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

async fn worker_loop<F, Fut>(
    worker_id: usize,
    rx: MAsyncRx<ChannelId>,
    submitter: Submitter,
    cancel: CancellationToken,
    job: F,
) where
    F: Fn(ChannelId, Submitter) -> Fut,
    Fut: Future<Output = ()>,
{
    tracing::trace!(worker_id, "channel worker started");
    loop {
        let channel = tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(channel) => channel,
                Err(_) => break,
            },
        };
        job(channel, submitter.clone()).await;
    }
    tracing::trace!(worker_id, "channel worker stopped");
}
