//! Channel worker slice
//!
//! Sends up to `max_processing_chunk` items of one lane in sub-batches,
//! then yields the worker back to the pool.

use std::sync::Arc;

use super::Shared;
use super::lane::LaneState;
use super::pool::Submitter;
use crate::{ChannelId, MessageSender, PipelineError};

pub(super) async fn process_lane<T>(
    shared: Arc<Shared<T>>,
    sender: Arc<dyn MessageSender<T>>,
    channel: ChannelId,
    submitter: Submitter,
) where
    T: Send + Sync + 'static,
{
    let Some(lane) = shared.lanes.get(channel.index()) else {
        tracing::error!(pipeline = %shared.id, %channel, "scheduled channel has no lane");
        return;
    };

    let mut processed = 0;
    let mut failed = false;

    while processed < shared.config.max_processing_chunk && !shared.cancel.is_cancelled() {
        let batch = lane.take(shared.config.send_batch_size);
        if batch.is_empty() {
            break;
        }
        processed += batch.len();

        let accepted = match sender.send(&batch, channel).await {
            Ok(accepted) => accepted,
            Err(source) => {
                let err = PipelineError::Send {
                    channel,
                    items: batch.len(),
                    source,
                };
                tracing::error!(pipeline = %shared.id, error = %err, "channel send failed");
                shared.metrics.record_send_failure();
                lane.requeue(batch);
                failed = true;
                break;
            }
        };

        let offered = batch.len();
        let (sent, rejected) = split_accepted(batch, &accepted, channel);
        let (sent_count, rejected_count) = (sent.len(), rejected.len());

        for item in sent {
            shared.commit_queue.push(item);
        }
        lane.requeue(rejected);
        shared.metrics.record_sent(sent_count, rejected_count);

        // No progress: cool the lane down like a failed send
        if sent_count == 0 {
            tracing::warn!(pipeline = %shared.id, %channel, offered, "sender accepted nothing");
            failed = true;
            break;
        }
        if rejected_count > 0 {
            tracing::debug!(
                pipeline = %shared.id,
                %channel,
                sent = sent_count,
                offered,
                "partial send, requeued the rest"
            );
        }
    }

    match lane.finish(failed) {
        LaneState::Resubmit => {
            if !submitter.submit(channel) {
                lane.stall();
            }
        }
        LaneState::Idle => shared.fetcher_wake.unpark(),
    }
}

/// Partition `batch` into (accepted, rejected) by the sender's indices
///
/// Out-of-bounds and repeated indices are ignored.
fn split_accepted<T>(batch: Vec<T>, accepted: &[usize], channel: ChannelId) -> (Vec<T>, Vec<T>) {
    let mut is_accepted = vec![false; batch.len()];
    let mut invalid = 0usize;
    for &index in accepted {
        match is_accepted.get_mut(index) {
            Some(slot) if !*slot => *slot = true,
            _ => invalid += 1,
        }
    }
    if invalid > 0 {
        tracing::warn!(%channel, invalid, offered = batch.len(), "sender returned invalid accepted indices");
    }

    let mut sent = Vec::with_capacity(accepted.len().min(batch.len()));
    let mut rejected = Vec::new();
    for (item, ok) in batch.into_iter().zip(is_accepted) {
        if ok {
            sent.push(item);
        } else {
            rejected.push(item);
        }
    }
    (sent, rejected)
}
