//! Per-channel queue with its scheduling state
//!
//! A lane is either idle or scheduled. Only the party that flips it from
//! idle to scheduled submits it to the worker pool, so a channel has at
//! most one outstanding schedule and is never sent from two workers.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// What the worker must do after a processing slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LaneState {
    /// Items remain; submit the lane again
    Resubmit,
    /// The lane is idle (empty, or cooling down after a failure)
    Idle,
}

struct Inner<T> {
    queue: VecDeque<T>,
    scheduled: bool,
    failed_at: Option<Instant>,
}

pub(crate) struct Lane<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Lane<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                scheduled: false,
                failed_at: None,
            }),
        }
    }

    /// Append items; returns true if the caller must submit the lane
    ///
    /// A lane cooling down after a failure is left for
    /// [`reschedule_if_stalled`](Self::reschedule_if_stalled).
    pub fn push_all(&self, items: impl IntoIterator<Item = T>) -> bool {
        let mut inner = self.inner.lock();
        inner.queue.extend(items);
        if inner.scheduled || inner.failed_at.is_some() || inner.queue.is_empty() {
            return false;
        }
        inner.scheduled = true;
        true
    }

    /// Remove up to `max` items from the front
    pub fn take(&self, max: usize) -> Vec<T> {
        let mut inner = self.inner.lock();
        let n = max.min(inner.queue.len());
        inner.queue.drain(..n).collect()
    }

    /// Append unsent items to the tail
    pub fn requeue(&self, items: impl IntoIterator<Item = T>) {
        self.inner.lock().queue.extend(items);
    }

    /// End a processing slice
    pub fn finish(&self, failed: bool) -> LaneState {
        let mut inner = self.inner.lock();
        if failed {
            inner.scheduled = false;
            inner.failed_at = Some(Instant::now());
            LaneState::Idle
        } else if inner.queue.is_empty() {
            inner.scheduled = false;
            inner.failed_at = None;
            LaneState::Idle
        } else {
            LaneState::Resubmit
        }
    }

    /// Mark a scheduled lane idle after its submission was refused
    pub fn stall(&self) {
        let mut inner = self.inner.lock();
        inner.scheduled = false;
        inner.failed_at.get_or_insert_with(Instant::now);
    }

    /// Flip an idle, non-empty lane whose cooldown has passed to scheduled
    ///
    /// Returns true if the caller must submit the lane.
    pub fn reschedule_if_stalled(&self, cooldown: Duration) -> bool {
        let mut inner = self.inner.lock();
        if inner.scheduled || inner.queue.is_empty() {
            return false;
        }
        if inner.failed_at.is_some_and(|at| at.elapsed() < cooldown) {
            return false;
        }
        inner.scheduled = true;
        inner.failed_at = None;
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    #[cfg(test)]
    pub fn is_scheduled(&self) -> bool {
        self.inner.lock().scheduled
    }
}
