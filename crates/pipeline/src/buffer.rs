//! Chunk buffer
//!
//! Queue of received chunks between the inbound receive and commit loops.
//! The buffered count covers every item the pipeline still owns, including
//! items drained into a batch that has not been applied yet, so receive
//! backpressure accounts for in-flight work.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Chunk, DedupCache, IdentityFn};

/// A chunk whose items are consumed from the front
struct Buffered<T, R> {
    items: std::vec::IntoIter<T>,
    token: R,
}

struct Inner<T, K, R> {
    chunks: VecDeque<Buffered<T, R>>,
    dedup: DedupCache<K>,
}

/// Result of one drain pass
#[derive(Debug)]
pub struct Drained<T, R> {
    /// Items that passed dedup, in receive order
    pub items: Vec<T>,
    /// Items removed from the buffer, duplicates included
    pub consumed: usize,
    /// Items dropped as duplicates
    pub duplicates: usize,
    /// Token of the last chunk drained completely in this pass
    pub token: Option<R>,
}

/// Buffered chunks plus the dedup gate that filters them
pub struct ChunkBuffer<T, K, R> {
    inner: Mutex<Inner<T, K, R>>,
    buffered: AtomicUsize,
    identity: IdentityFn<T, K>,
}

impl<T, K: Hash + Eq + Clone, R> ChunkBuffer<T, K, R> {
    pub fn new(identity: IdentityFn<T, K>, dedup_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                chunks: VecDeque::new(),
                dedup: DedupCache::new(dedup_capacity),
            }),
            buffered: AtomicUsize::new(0),
            identity,
        }
    }

    /// Append a chunk; empty chunks are dropped
    ///
    /// Returns the buffered count after the append.
    pub fn push(&self, chunk: Chunk<T, R>) -> usize {
        let len = chunk.len();
        if len == 0 {
            return self.buffered();
        }

        let mut inner = self.inner.lock();
        inner.chunks.push_back(Buffered {
            items: chunk.items.into_iter(),
            token: chunk.token,
        });
        self.buffered.fetch_add(len, Ordering::AcqRel) + len
    }

    /// Pop items until `cap` distinct items are collected or the buffer is empty
    ///
    /// A chunk consumed only partially stays at the front with its token.
    /// The buffered count is not reduced; call [`release`](Self::release)
    /// once the batch has been applied.
    pub fn drain(&self, cap: usize) -> Drained<T, R> {
        let mut guard = self.inner.lock();
        let Inner { chunks, dedup } = &mut *guard;

        let mut drained = Drained {
            items: Vec::with_capacity(cap.min(self.buffered())),
            consumed: 0,
            duplicates: 0,
            token: None,
        };

        while drained.items.len() < cap {
            let Some(front) = chunks.front_mut() else {
                break;
            };

            while drained.items.len() < cap {
                let Some(item) = front.items.next() else {
                    break;
                };
                drained.consumed += 1;
                if dedup.test_and_add((self.identity)(&item)) {
                    drained.items.push(item);
                } else {
                    drained.duplicates += 1;
                }
            }

            if !front.items.as_slice().is_empty() {
                break;
            }
            if let Some(done) = chunks.pop_front() {
                drained.token = Some(done.token);
            }
        }

        while chunks.front().is_some_and(|c| c.items.as_slice().is_empty()) {
            if let Some(done) = chunks.pop_front() {
                drained.token = Some(done.token);
            }
        }

        drained
    }

    /// Queue the token of a chunk that yielded no items
    ///
    /// The token is ordered behind every item the pipeline still owns.
    /// When nothing is owned it supersedes any queued token-only entries
    /// and is handed to `settle` at once, under the buffer lock.
    ///
    /// Returns whether the token was settled.
    pub fn push_token(&self, token: R, settle: impl FnOnce(R)) -> bool {
        let mut inner = self.inner.lock();
        if self.buffered() == 0 {
            inner.chunks.clear();
            settle(token);
            return true;
        }
        inner.chunks.push_back(Buffered {
            items: Vec::new().into_iter(),
            token,
        });
        false
    }

    /// Hand the newest queued token to `settle` once every owned item
    /// has been released
    pub fn settle_token(&self, settle: impl FnOnce(R)) -> bool {
        let mut inner = self.inner.lock();
        if self.buffered() != 0 {
            return false;
        }
        match inner.chunks.drain(..).last() {
            Some(done) => {
                settle(done.token);
                true
            }
            None => false,
        }
    }

    /// Give back buffer space for `consumed` items
    ///
    /// Returns the buffered count after the release.
    pub fn release(&self, consumed: usize) -> usize {
        let previous = self.buffered.fetch_sub(consumed, Ordering::AcqRel);
        debug_assert!(previous >= consumed, "released more than buffered");
        previous.saturating_sub(consumed)
    }

    /// Items owned by the pipeline (queued or in an unapplied batch)
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    /// Chunks waiting to be drained
    pub fn chunk_count(&self) -> usize {
        self.inner.lock().chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn buffer(dedup_capacity: usize) -> ChunkBuffer<u32, u32, &'static str> {
        ChunkBuffer::new(Arc::new(|item: &u32| *item), dedup_capacity)
    }

    #[test]
    fn test_push_counts_items() {
        let buf = buffer(100);
        assert_eq!(buf.push(Chunk::new(vec![1, 2, 3], "a")), 3);
        assert_eq!(buf.push(Chunk::new(vec![], "empty")), 3);
        assert_eq!(buf.push(Chunk::new(vec![4, 5], "b")), 5);
        assert_eq!(buf.chunk_count(), 2);
    }

    #[test]
    fn test_drain_all_returns_last_token() {
        let buf = buffer(100);
        buf.push(Chunk::new(vec![1, 2, 3], "a"));
        buf.push(Chunk::new(vec![4, 5], "b"));

        let drained = buf.drain(10);
        assert_eq!(drained.items, vec![1, 2, 3, 4, 5]);
        assert_eq!(drained.consumed, 5);
        assert_eq!(drained.token, Some("b"));

        // Still owned until released
        assert_eq!(buf.buffered(), 5);
        assert_eq!(buf.release(drained.consumed), 0);
    }

    #[test]
    fn test_drain_respects_cap_and_splits_chunk() {
        let buf = buffer(100);
        buf.push(Chunk::new(vec![1, 2, 3], "a"));
        buf.push(Chunk::new(vec![4, 5, 6, 7], "b"));

        let first = buf.drain(5);
        assert_eq!(first.items, vec![1, 2, 3, 4, 5]);
        // Chunk "b" is only partially drained; its token must wait
        assert_eq!(first.token, Some("a"));
        assert_eq!(buf.chunk_count(), 1);
        buf.release(first.consumed);

        let second = buf.drain(5);
        assert_eq!(second.items, vec![6, 7]);
        assert_eq!(second.token, Some("b"));
        assert_eq!(buf.release(second.consumed), 0);
    }

    #[test]
    fn test_partial_drain_without_complete_chunk() {
        let buf = buffer(100);
        buf.push(Chunk::new((0..10).collect(), "big"));

        let drained = buf.drain(4);
        assert_eq!(drained.items.len(), 4);
        assert_eq!(drained.token, None);
    }

    #[test]
    fn test_duplicates_filtered_across_chunks() {
        let buf = buffer(100);
        buf.push(Chunk::new(vec![1, 2, 3], "a"));
        buf.push(Chunk::new(vec![3, 4, 1], "b"));

        let drained = buf.drain(10);
        assert_eq!(drained.items, vec![1, 2, 3, 4]);
        assert_eq!(drained.duplicates, 2);
        assert_eq!(drained.consumed, 6);
        assert_eq!(drained.token, Some("b"));
    }

    #[test]
    fn test_duplicates_do_not_count_toward_cap() {
        let buf = buffer(100);
        buf.push(Chunk::new(vec![1, 1, 1, 2, 3], "a"));

        let drained = buf.drain(2);
        assert_eq!(drained.items, vec![1, 2]);
        assert_eq!(drained.consumed, 4);
        assert_eq!(drained.token, None);
    }

    #[test]
    fn test_all_duplicates_yields_empty_batch_with_token() {
        let buf = buffer(100);
        buf.push(Chunk::new(vec![1, 2], "a"));
        let first = buf.drain(10);
        buf.release(first.consumed);

        buf.push(Chunk::new(vec![2, 1], "b"));
        let second = buf.drain(10);
        assert!(second.items.is_empty());
        assert_eq!(second.duplicates, 2);
        assert_eq!(second.token, Some("b"));
    }

    #[test]
    fn test_token_settled_when_nothing_owned() {
        let buf = buffer(100);
        let mut settled = None;
        assert!(buf.push_token("skipped", |t| settled = Some(t)));
        assert_eq!(settled, Some("skipped"));
        assert_eq!(buf.chunk_count(), 0);
    }

    #[test]
    fn test_token_queued_behind_items() {
        let buf = buffer(100);
        buf.push(Chunk::new(vec![1, 2], "a"));
        assert!(!buf.push_token("skipped", |_| panic!("items still owned")));
        assert!(!buf.settle_token(|_| panic!("items still owned")));

        let drained = buf.drain(10);
        assert_eq!(drained.items, vec![1, 2]);
        assert_eq!(drained.token, Some("skipped"));
        assert_eq!(buf.chunk_count(), 0);
    }

    #[test]
    fn test_token_after_full_batch_follows_drain() {
        let buf = buffer(100);
        buf.push(Chunk::new(vec![1, 2], "a"));
        buf.push_token("skipped", |_| {});

        // Cap reached exactly at the end of chunk "a"
        let drained = buf.drain(2);
        assert_eq!(drained.token, Some("skipped"));
    }

    #[test]
    fn test_token_settles_after_in_flight_batch() {
        let buf = buffer(100);
        buf.push(Chunk::new(vec![1, 2], "a"));
        let in_flight = buf.drain(10);

        assert!(!buf.push_token("skipped", |_| {}));
        assert!(!buf.settle_token(|_| {}));

        buf.release(in_flight.consumed);
        let mut settled = None;
        assert!(buf.settle_token(|t| settled = Some(t)));
        assert_eq!(settled, Some("skipped"));
        assert!(!buf.settle_token(|_| {}));
    }

    #[test]
    fn test_drain_empty_buffer() {
        let buf = buffer(100);
        let drained = buf.drain(10);
        assert!(drained.items.is_empty());
        assert_eq!(drained.consumed, 0);
        assert!(drained.token.is_none());
    }
}
