//! Inbound receive loop
//!
//! Acknowledges the pending token, then receives chunks in bursts while
//! the buffer is below its low watermark.

use std::hash::Hash;
use std::sync::Arc;

use super::{DynSource, Shared};
use crate::park::cooldown;
use crate::{Chunk, PipelineError, Result};

pub(super) struct Receiver<T, K, R> {
    shared: Arc<Shared<T, K, R>>,
    source: DynSource<T, R>,
}

impl<T, K, R> Receiver<T, K, R>
where
    T: Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new(shared: Arc<Shared<T, K, R>>, source: DynSource<T, R>) -> Self {
        Self { shared, source }
    }

    pub async fn run(self) {
        let shared = &self.shared;
        tracing::debug!(pipeline = %shared.id, "receive loop started");

        while !shared.cancel.is_cancelled() {
            match self.iteration().await {
                Ok(true) => {}
                Ok(false) => {
                    shared
                        .receiver_wake
                        .park(shared.config.idle_interval, &shared.cancel)
                        .await;
                }
                Err(e) => {
                    tracing::error!(pipeline = %shared.id, error = %e, "receive loop error");
                    shared.metrics.record_source_failure();
                    if !cooldown(shared.config.error_cooldown, &shared.cancel).await {
                        break;
                    }
                }
            }
        }

        tracing::debug!(pipeline = %shared.id, "receive loop stopped");
    }

    /// One acknowledge-then-receive pass
    ///
    /// Returns whether any items were received.
    async fn iteration(&self) -> Result<bool> {
        self.acknowledge_pending().await?;

        let shared = &self.shared;
        let low_watermark = shared.config.low_watermark();
        let max_items = shared.config.effective_receive_max_items();
        let mut received_any = false;

        for _ in 0..shared.config.receive_burst {
            if shared.cancel.is_cancelled() || shared.buffer.buffered() >= low_watermark {
                break;
            }

            let chunk = self
                .source
                .receive(max_items, shared.config.receive_timeout)
                .await
                .map_err(PipelineError::Receive)?;

            if chunk.is_empty() {
                if chunk.skipped > 0 {
                    self.settle_skipped(chunk);
                }
                break;
            }
            // Not acknowledged, so the source redelivers it after restart
            if shared.cancel.is_cancelled() {
                tracing::debug!(
                    pipeline = %shared.id,
                    items = chunk.len(),
                    "discarding chunk received during shutdown"
                );
                break;
            }

            let items = chunk.len();
            let buffered = shared.buffer.push(chunk);
            shared.metrics.record_received(items, buffered);
            received_any = true;

            tracing::trace!(pipeline = %shared.id, items, buffered, "chunk buffered");

            if buffered > shared.config.sink_batch_size {
                shared.committer_wake.unpark();
            }
        }

        Ok(received_any)
    }

    /// Order the token of an item-less chunk behind the items still owned
    fn settle_skipped(&self, chunk: Chunk<T, R>) {
        let shared = &self.shared;
        let settled = shared
            .buffer
            .push_token(chunk.token, |token| shared.pending_ack.store(token));
        tracing::debug!(
            pipeline = %shared.id,
            skipped = chunk.skipped,
            settled,
            "chunk yielded no items"
        );
    }

    async fn acknowledge_pending(&self) -> Result<()> {
        let shared = &self.shared;
        let Some(token) = shared.pending_ack.current() else {
            return Ok(());
        };

        self.source
            .acknowledge(&token)
            .await
            .map_err(PipelineError::Acknowledge)?;

        shared.pending_ack.clear_if(&token);
        shared.metrics.record_ack();
        Ok(())
    }
}
