//! Per-channel topics
//!
//! Every channel publishes into its own topic. A reject predicate can turn
//! individual items away to simulate partial delivery.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ferry_pipeline::{ChannelId, CollaboratorError, MessageSender};
use parking_lot::Mutex;

use crate::SimulatedFailure;

/// Decides whether an item is turned away on this send
pub type RejectFn<T> = Arc<dyn Fn(&T, ChannelId) -> bool + Send + Sync>;

/// One recorded `send` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendCall {
    pub channel: ChannelId,
    pub offered: usize,
    pub accepted: usize,
}

pub struct MemoryTopicSender<T> {
    topics: Mutex<BTreeMap<ChannelId, Vec<T>>>,
    calls: Mutex<Vec<SendCall>>,
    reject: Option<RejectFn<T>>,
    failures: SimulatedFailure,
}

impl<T: Clone> MemoryTopicSender<T> {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            reject: None,
            failures: SimulatedFailure::new(),
        }
    }

    /// Turn away items for which `reject` returns true
    #[must_use]
    pub fn with_reject(mut self, reject: RejectFn<T>) -> Self {
        self.reject = Some(reject);
        self
    }

    /// Items published on `channel`, in publish order
    pub fn topic(&self, channel: ChannelId) -> Vec<T> {
        self.topics.lock().get(&channel).cloned().unwrap_or_default()
    }

    /// Channels that received at least one item
    pub fn channels(&self) -> Vec<ChannelId> {
        self.topics.lock().keys().copied().collect()
    }

    /// Items published over all channels
    pub fn published(&self) -> usize {
        self.topics.lock().values().map(Vec::len).sum()
    }

    pub fn calls(&self) -> Vec<SendCall> {
        self.calls.lock().clone()
    }

    pub fn failures(&self) -> &SimulatedFailure {
        &self.failures
    }
}

impl<T: Clone> Default for MemoryTopicSender<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> MessageSender<T> for MemoryTopicSender<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn send(&self, items: &[T], channel: ChannelId) -> Result<Vec<usize>, CollaboratorError> {
        self.failures.check("send")?;

        let accepted: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| !self.reject.as_ref().is_some_and(|reject| reject(*item, channel)))
            .map(|(index, _)| index)
            .collect();

        self.topics
            .lock()
            .entry(channel)
            .or_default()
            .extend(accepted.iter().map(|&index| items[index].clone()));
        self.calls.lock().push(SendCall {
            channel,
            offered: items.len(),
            accepted: accepted.len(),
        });
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publishes_per_channel() {
        let sender = MemoryTopicSender::<u32>::new();
        let accepted = sender.send(&[1, 2, 3], ChannelId(0)).await.unwrap();
        sender.send(&[4], ChannelId(2)).await.unwrap();

        assert_eq!(accepted, vec![0, 1, 2]);
        assert_eq!(sender.topic(ChannelId(0)), vec![1, 2, 3]);
        assert_eq!(sender.channels(), vec![ChannelId(0), ChannelId(2)]);
        assert_eq!(sender.published(), 4);
    }

    #[tokio::test]
    async fn test_reject_predicate() {
        let sender =
            MemoryTopicSender::new().with_reject(Arc::new(|item: &u32, _: ChannelId| item % 2 == 0));
        let accepted = sender.send(&[1, 2, 3, 4], ChannelId(1)).await.unwrap();

        assert_eq!(accepted, vec![0, 2]);
        assert_eq!(sender.topic(ChannelId(1)), vec![1, 3]);
        assert_eq!(
            sender.calls(),
            vec![SendCall {
                channel: ChannelId(1),
                offered: 4,
                accepted: 2
            }]
        );
    }

    #[tokio::test]
    async fn test_failure_records_nothing() {
        let sender = MemoryTopicSender::<u32>::new();
        sender.failures().fail_next(1);
        assert!(sender.send(&[1], ChannelId(0)).await.is_err());
        assert!(sender.calls().is_empty());
        assert_eq!(sender.published(), 0);
    }
}
