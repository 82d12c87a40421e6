//! Partitioned in-memory message log
//!
//! [`MemoryLog`] is the broker; [`MemoryLogSource`] is one consumer of it
//! with its own read positions and committed offsets. Acknowledging a
//! [`LogPosition`] commits offsets; [`MemoryLogSource::redeliver_uncommitted`]
//! rewinds reads to the committed offsets the way a consumer restart would.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferry_pipeline::{Chunk, CollaboratorError, MessageSource};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::SimulatedFailure;

/// Turns a raw log message into an item; errors drop the message
pub type Decoder<M, T> = Arc<dyn Fn(&M) -> Result<T, String> + Send + Sync>;

/// Next offset to read, per partition
///
/// Positions only move forward, so a later position covers every earlier
/// one and acknowledging it is enough.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPosition(pub BTreeMap<u32, u64>);

impl LogPosition {
    fn from_offsets(offsets: &[u64]) -> Self {
        Self(
            offsets
                .iter()
                .enumerate()
                .map(|(partition, offset)| (partition as u32, *offset))
                .collect(),
        )
    }

    /// Offset for `partition`, 0 if absent
    pub fn offset(&self, partition: u32) -> u64 {
        self.0.get(&partition).copied().unwrap_or(0)
    }
}

/// Append-only partitioned log
pub struct MemoryLog<M> {
    partitions: Mutex<Vec<Vec<M>>>,
    appended: Notify,
}

impl<M: Clone> MemoryLog<M> {
    /// Create a log with `partitions` partitions (minimum 1)
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: Mutex::new(vec![Vec::new(); partitions.max(1) as usize]),
            appended: Notify::new(),
        }
    }

    pub fn partition_count(&self) -> u32 {
        self.partitions.lock().len() as u32
    }

    /// Append to `partition` (taken modulo the partition count)
    ///
    /// Returns the message offset.
    pub fn append(&self, partition: u32, message: M) -> u64 {
        let offset = {
            let mut partitions = self.partitions.lock();
            let count = partitions.len();
            let log = &mut partitions[partition as usize % count];
            log.push(message);
            log.len() as u64 - 1
        };
        self.appended.notify_waiters();
        offset
    }

    /// Offset one past the last message of every partition
    pub fn end_offsets(&self) -> Vec<u64> {
        self.partitions
            .lock()
            .iter()
            .map(|log| log.len() as u64)
            .collect()
    }

    /// Messages from `positions` onwards, at most `max` in total
    ///
    /// Advances `positions` past every returned message.
    fn read(&self, positions: &mut [u64], max: usize) -> Vec<(u32, u64, M)> {
        let partitions = self.partitions.lock();
        let mut out = Vec::new();

        for (partition, log) in partitions.iter().enumerate() {
            let Some(position) = positions.get_mut(partition) else {
                break;
            };
            while out.len() < max {
                let Some(message) = log.get(*position as usize) else {
                    break;
                };
                out.push((partition as u32, *position, message.clone()));
                *position += 1;
            }
        }
        out
    }
}

/// Consumer of a [`MemoryLog`]
pub struct MemoryLogSource<M, T> {
    log: Arc<MemoryLog<M>>,
    decode: Decoder<M, T>,
    positions: Mutex<Vec<u64>>,
    committed: Mutex<Vec<u64>>,
    receive_failures: SimulatedFailure,
    ack_failures: SimulatedFailure,
}

impl<M> MemoryLogSource<M, M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Consumer that delivers messages as-is
    pub fn new(log: Arc<MemoryLog<M>>) -> Self {
        Self::with_decoder(log, Arc::new(|message: &M| Ok::<M, String>(message.clone())))
    }
}

impl<M: Clone, T> MemoryLogSource<M, T> {
    /// Consumer that decodes each message, dropping the ones that fail
    pub fn with_decoder(log: Arc<MemoryLog<M>>, decode: Decoder<M, T>) -> Self {
        let partitions = log.partition_count() as usize;
        Self {
            log,
            decode,
            positions: Mutex::new(vec![0; partitions]),
            committed: Mutex::new(vec![0; partitions]),
            receive_failures: SimulatedFailure::new(),
            ack_failures: SimulatedFailure::new(),
        }
    }

    /// Offsets committed so far
    pub fn committed(&self) -> LogPosition {
        LogPosition::from_offsets(&self.committed.lock())
    }

    /// Messages appended but not yet committed, over all partitions
    pub fn lag(&self) -> u64 {
        let committed = self.committed.lock();
        self.log
            .end_offsets()
            .iter()
            .zip(committed.iter())
            .map(|(end, done)| end.saturating_sub(*done))
            .sum()
    }

    /// Rewind read positions to the committed offsets
    pub fn redeliver_uncommitted(&self) {
        let committed = self.committed.lock().clone();
        tracing::debug!(?committed, "rewinding consumer to committed offsets");
        *self.positions.lock() = committed;
    }

    pub fn receive_failures(&self) -> &SimulatedFailure {
        &self.receive_failures
    }

    pub fn ack_failures(&self) -> &SimulatedFailure {
        &self.ack_failures
    }

    /// Read and decode; None if the log had nothing new
    fn poll(&self, max_items: usize) -> Option<Chunk<T, LogPosition>> {
        let mut positions = self.positions.lock();
        let messages = self.log.read(&mut positions, max_items);
        if messages.is_empty() {
            return None;
        }

        let mut items = Vec::with_capacity(messages.len());
        let mut skipped = 0;
        for (partition, offset, message) in messages {
            match (self.decode)(&message) {
                Ok(item) => items.push(item),
                Err(error) => {
                    tracing::warn!(partition, offset, %error, "dropping undecodable message");
                    skipped += 1;
                }
            }
        }
        Some(Chunk::new(items, LogPosition::from_offsets(&positions)).with_skipped(skipped))
    }
}

#[async_trait]
impl<M, T> MessageSource<T> for MemoryLogSource<M, T>
where
    M: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    type Token = LogPosition;

    async fn receive(
        &self,
        max_items: usize,
        timeout: Duration,
    ) -> Result<Chunk<T, LogPosition>, CollaboratorError> {
        self.receive_failures.check("receive")?;
        let deadline = Instant::now() + timeout;

        loop {
            // Registered before polling so an append in between is not missed
            let appended = self.log.appended.notified();
            if let Some(chunk) = self.poll(max_items) {
                return Ok(chunk);
            }
            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                let position = LogPosition::from_offsets(&self.positions.lock());
                return Ok(Chunk::new(Vec::new(), position));
            }
        }
    }

    async fn acknowledge(&self, token: &LogPosition) -> Result<(), CollaboratorError> {
        self.ack_failures.check("acknowledge")?;
        let mut committed = self.committed.lock();
        for (partition, offset) in &token.0 {
            if let Some(current) = committed.get_mut(*partition as usize) {
                *current = (*current).max(*offset);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(partitions: u32, per_partition: u64) -> Arc<MemoryLog<u64>> {
        let log = Arc::new(MemoryLog::new(partitions));
        for p in 0..partitions {
            for i in 0..per_partition {
                log.append(p, u64::from(p) * 1000 + i);
            }
        }
        log
    }

    #[tokio::test]
    async fn test_receive_respects_max_items() {
        let source = MemoryLogSource::new(log_with(2, 5));

        let chunk = source.receive(7, Duration::from_millis(10)).await.unwrap();
        assert_eq!(chunk.len(), 7);
        assert_eq!(chunk.token.offset(0), 5);
        assert_eq!(chunk.token.offset(1), 2);

        let chunk = source.receive(7, Duration::from_millis(10)).await.unwrap();
        assert_eq!(chunk.items, vec![1002, 1003, 1004]);
    }

    #[tokio::test]
    async fn test_empty_receive_waits_for_timeout() {
        let source = MemoryLogSource::new(Arc::new(MemoryLog::<u64>::new(1)));
        let started = Instant::now();
        let chunk = source.receive(10, Duration::from_millis(20)).await.unwrap();
        assert!(chunk.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_receive_wakes_on_append() {
        let log = Arc::new(MemoryLog::new(1));
        let source = MemoryLogSource::new(Arc::clone(&log));

        let appender = {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                log.append(0, 42u64);
            })
        };

        let chunk = source.receive(10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(chunk.items, vec![42]);
        appender.await.unwrap();
    }

    #[tokio::test]
    async fn test_acknowledge_is_monotonic() {
        let source = MemoryLogSource::new(log_with(1, 10));
        let first = source.receive(4, Duration::ZERO).await.unwrap();
        let second = source.receive(4, Duration::ZERO).await.unwrap();

        source.acknowledge(&second.token).await.unwrap();
        source.acknowledge(&first.token).await.unwrap();
        assert_eq!(source.committed().offset(0), 8);
        assert_eq!(source.lag(), 2);
    }

    #[tokio::test]
    async fn test_redeliver_uncommitted() {
        let source = MemoryLogSource::new(log_with(1, 6));
        let first = source.receive(3, Duration::ZERO).await.unwrap();
        source.acknowledge(&first.token).await.unwrap();
        let _lost = source.receive(3, Duration::ZERO).await.unwrap();

        source.redeliver_uncommitted();
        let again = source.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(again.items, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_decoder_drops_bad_messages() {
        let log = Arc::new(MemoryLog::new(1));
        for raw in ["1", "two", "3"] {
            log.append(0, raw.to_string());
        }
        let source: MemoryLogSource<String, u32> = MemoryLogSource::with_decoder(
            log,
            Arc::new(|raw: &String| raw.parse::<u32>().map_err(|e| e.to_string())),
        );

        let chunk = source.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(chunk.items, vec![1, 3]);
        assert_eq!(chunk.skipped, 1);
        // The bad message still advances the position
        assert_eq!(chunk.token.offset(0), 3);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let source = MemoryLogSource::new(log_with(1, 1));
        source.receive_failures().fail_next(1);
        assert!(source.receive(1, Duration::ZERO).await.is_err());
        assert!(source.receive(1, Duration::ZERO).await.is_ok());
    }
}
