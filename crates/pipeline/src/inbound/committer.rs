//! Inbound commit loop
//!
//! Drains the chunk buffer into batches of at most `sink_batch_cap`
//! distinct items, applies them, and hands the resume token to the
//! receive loop for acknowledgment.

use std::hash::Hash;
use std::sync::Arc;
use tokio::time::Instant;

use super::Shared;
use crate::buffer::Drained;
use crate::park::cooldown;
use crate::{ApplySink, PipelineError, Result};

pub(super) struct Committer<T, K, R> {
    shared: Arc<Shared<T, K, R>>,
    sink: Arc<dyn ApplySink<T>>,
    /// Batch whose apply failed; retried before anything new is drained
    retry: Option<Drained<T, R>>,
    last_commit: Instant,
}

impl<T, K, R> Committer<T, K, R>
where
    T: Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new(shared: Arc<Shared<T, K, R>>, sink: Arc<dyn ApplySink<T>>) -> Self {
        Self {
            shared,
            sink,
            retry: None,
            last_commit: Instant::now(),
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(pipeline = %self.shared.id, "commit loop started");

        while !self.shared.cancel.is_cancelled() {
            match self.iteration().await {
                Ok(()) => {
                    self.shared
                        .committer_wake
                        .park(self.shared.config.idle_interval, &self.shared.cancel)
                        .await;
                }
                Err(e) => {
                    tracing::error!(pipeline = %self.shared.id, error = %e, "commit loop error");
                    if !cooldown(self.shared.config.error_cooldown, &self.shared.cancel).await {
                        break;
                    }
                }
            }
        }

        if let Some(batch) = &self.retry {
            tracing::warn!(
                pipeline = %self.shared.id,
                items = batch.items.len(),
                "abandoning unapplied batch on shutdown"
            );
        }
        tracing::debug!(pipeline = %self.shared.id, "commit loop stopped");
    }

    /// Drain and apply until nothing qualifies
    async fn iteration(&mut self) -> Result<()> {
        if let Some(batch) = self.retry.take() {
            self.apply(batch).await?;
        }

        while !self.shared.cancel.is_cancelled() && self.should_commit() {
            let batch = self.shared.buffer.drain(self.shared.config.sink_batch_cap);
            if batch.consumed == 0 && batch.token.is_none() {
                break;
            }
            self.shared.metrics.record_duplicates(batch.duplicates);
            self.apply(batch).await?;
        }

        Ok(())
    }

    fn should_commit(&self) -> bool {
        let buffered = self.shared.buffer.buffered();
        if buffered == 0 {
            // Tokens of item-less chunks queued behind the last batch
            let pending_ack = &self.shared.pending_ack;
            self.shared.buffer.settle_token(|token| pending_ack.store(token));
            self.shared.receiver_wake.unpark();
            return false;
        }
        buffered > self.shared.config.sink_batch_size
            || self.last_commit.elapsed() >= self.shared.config.commit_interval
    }

    async fn apply(&mut self, batch: Drained<T, R>) -> Result<()> {
        let shared = &self.shared;

        if batch.items.is_empty() {
            tracing::trace!(
                pipeline = %shared.id,
                duplicates = batch.duplicates,
                "batch fully deduplicated, skipping apply"
            );
            shared.receiver_wake.unpark();
        } else if let Err(source) = self.sink.apply_batch(&batch.items).await {
            shared.metrics.record_apply_failure();
            let items = batch.items.len();
            self.retry = Some(batch);
            return Err(PipelineError::Apply { items, source });
        } else {
            shared.metrics.record_applied(batch.items.len());
            tracing::debug!(pipeline = %shared.id, items = batch.items.len(), "batch applied");
        }

        if let Some(token) = batch.token {
            shared.pending_ack.store(token);
        }

        let remaining = shared.buffer.release(batch.consumed);
        shared.metrics.set_buffered(remaining);
        if remaining < shared.config.low_watermark() {
            shared.receiver_wake.unpark();
        }
        self.last_commit = Instant::now();
        Ok(())
    }
}
