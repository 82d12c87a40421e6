//! Outbound fetch loop
//!
//! Each iteration marks delivered rows processed, reschedules lanes whose
//! cooldown has passed, then pages pending rows into the lanes until the
//! in-flight limit is reached.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::Shared;
use super::pool::Submitter;
use crate::park::cooldown;
use crate::{
    ChannelFn, ChannelId, DedupCache, IdentityFn, PipelineError, RateLimitedLogger, Result,
    RowSource,
};

pub(crate) struct Fetcher<T, K> {
    shared: Arc<Shared<T>>,
    rows: Arc<dyn RowSource<T>>,
    identity: IdentityFn<T, K>,
    channel_of: ChannelFn<T>,
    /// Only this task touches the cache, so it needs no lock
    dedup: DedupCache<K>,
    submitter: Submitter,
    /// Commit sub-batch that failed; retried before the queue is drained
    retry_commit: Option<Vec<T>>,
    unroutable_log: RateLimitedLogger,
    out_of_range_log: RateLimitedLogger,
}

impl<T, K> Fetcher<T, K>
where
    T: Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    pub fn new(
        shared: Arc<Shared<T>>,
        rows: Arc<dyn RowSource<T>>,
        identity: IdentityFn<T, K>,
        channel_of: ChannelFn<T>,
        submitter: Submitter,
    ) -> Self {
        Self {
            dedup: DedupCache::new(shared.config.dedup_capacity),
            shared,
            rows,
            identity,
            channel_of,
            submitter,
            retry_commit: None,
            unroutable_log: RateLimitedLogger::default(),
            out_of_range_log: RateLimitedLogger::default(),
        }
    }

    /// Run until cancelled; hands itself back for the final commit
    pub async fn run(mut self) -> Self {
        tracing::debug!(pipeline = %self.shared.id, "fetch loop started");

        while !self.shared.cancel.is_cancelled() {
            match self.iteration().await {
                Ok(true) => {}
                Ok(false) => {
                    self.shared
                        .fetcher_wake
                        .park(self.shared.config.idle_interval, &self.shared.cancel)
                        .await;
                }
                Err(e) => {
                    tracing::error!(pipeline = %self.shared.id, error = %e, "fetch loop error");
                    self.shared.metrics.record_storage_failure();
                    if !cooldown(self.shared.config.error_cooldown, &self.shared.cancel).await {
                        break;
                    }
                }
            }
        }

        tracing::debug!(pipeline = %self.shared.id, "fetch loop stopped");
        self
    }

    /// Returns whether anything was committed or accepted
    async fn iteration(&mut self) -> Result<bool> {
        let committed = self.commit().await?;
        self.reschedule_stalled();
        let accepted = self.fetch().await?;
        Ok(committed > 0 || accepted > 0)
    }

    /// Mark every delivered row processed
    ///
    /// Returns the number of rows committed.
    pub async fn commit(&mut self) -> Result<usize> {
        let mut committed = 0;

        if let Some(batch) = self.retry_commit.take() {
            committed += self.commit_batch(batch).await?;
        }

        let batch_size = self.shared.config.commit_batch_size;
        loop {
            let batch: Vec<T> = std::iter::from_fn(|| self.shared.commit_queue.pop())
                .take(batch_size)
                .collect();
            if batch.is_empty() {
                break;
            }
            committed += self.commit_batch(batch).await?;
        }

        Ok(committed)
    }

    async fn commit_batch(&mut self, batch: Vec<T>) -> Result<usize> {
        let requested = batch.len();
        let affected = match self.rows.commit_processed(&batch).await {
            Ok(affected) => affected,
            Err(source) => {
                self.retry_commit = Some(batch);
                return Err(PipelineError::Commit {
                    items: requested,
                    source,
                });
            }
        };

        if affected < requested {
            tracing::debug!(
                pipeline = %self.shared.id,
                requested,
                affected,
                "fewer rows updated than expected"
            );
        }

        let in_flight = self.shared.in_flight.fetch_sub(requested, Ordering::AcqRel) - requested;
        self.shared.metrics.record_committed(requested, affected);
        self.shared.metrics.set_in_flight(in_flight);
        Ok(requested)
    }

    fn reschedule_stalled(&self) {
        let cooldown = self.shared.config.error_cooldown;
        for (index, lane) in self.shared.lanes.iter().enumerate() {
            if lane.reschedule_if_stalled(cooldown) {
                let channel = ChannelId(index as u32);
                tracing::debug!(pipeline = %self.shared.id, %channel, "rescheduling stalled channel");
                if !self.submitter.submit(channel) {
                    lane.stall();
                }
            }
        }
    }

    /// Page rows into lanes until a page comes back empty or the
    /// in-flight limit is reached
    ///
    /// Returns the number of rows accepted into lanes.
    async fn fetch(&mut self) -> Result<usize> {
        let mut accepted = 0;
        let mut page = 0;

        while !self.shared.cancel.is_cancelled()
            && self.shared.in_flight() < self.shared.config.max_fetch
        {
            let rows = self
                .rows
                .fetch_page(page)
                .await
                .map_err(|source| PipelineError::Fetch { page, source })?;
            if rows.is_empty() {
                break;
            }

            self.shared.metrics.record_fetched(rows.len());
            accepted += self.route(rows);
            page += 1;
        }

        if accepted > 0 {
            tracing::debug!(
                pipeline = %self.shared.id,
                accepted,
                pages = page,
                in_flight = self.shared.in_flight(),
                "rows routed"
            );
        }
        Ok(accepted)
    }

    fn route(&mut self, rows: Vec<T>) -> usize {
        let shared = &self.shared;
        let mut groups: BTreeMap<ChannelId, Vec<T>> = BTreeMap::new();

        for row in rows {
            let channel = (self.channel_of)(&row);

            // Stays pending in storage; no lane could ever deliver it
            if !shared.selector.has_lane(channel) {
                self.unroutable_log.error("channel has no lane, row left pending", &channel);
                shared.metrics.record_unroutable();
                continue;
            }

            if !self.dedup.test_and_add((self.identity)(&row)) {
                shared.metrics.record_duplicate();
                continue;
            }

            if !shared.selector.in_range(channel) {
                self.out_of_range_log.warn("channel outside configured range", &channel);
                shared.metrics.record_out_of_range();
            }

            groups.entry(channel).or_default().push(row);
        }

        let mut accepted = 0;
        for (channel, items) in groups {
            let count = items.len();
            accepted += count;

            let in_flight = shared.in_flight.fetch_add(count, Ordering::AcqRel) + count;
            shared.metrics.set_in_flight(in_flight);

            let lane = &shared.lanes[channel.index()];
            if lane.push_all(items) && !self.submitter.submit(channel) {
                lane.stall();
            }
        }
        accepted
    }
}
