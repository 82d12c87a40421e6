//! Idempotent keyed apply store

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use ferry_pipeline::{ApplySink, CollaboratorError, IdentityFn};
use parking_lot::Mutex;

use crate::SimulatedFailure;

/// Keyed store; applying an item replaces the row with the same identity
pub struct MemoryApplyStore<T, K> {
    identity: IdentityFn<T, K>,
    rows: Mutex<HashMap<K, T>>,
    /// Size of every successful apply call, in order
    batches: Mutex<Vec<usize>>,
    failures: SimulatedFailure,
}

impl<T: Clone, K: Hash + Eq> MemoryApplyStore<T, K> {
    pub fn new(identity: IdentityFn<T, K>) -> Self {
        Self {
            identity,
            rows: Mutex::new(HashMap::new()),
            batches: Mutex::new(Vec::new()),
            failures: SimulatedFailure::new(),
        }
    }

    /// Distinct rows stored
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    pub fn get(&self, key: &K) -> Option<T> {
        self.rows.lock().get(key).cloned()
    }

    /// Sizes of the successful apply calls, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }

    /// Items applied over all calls, replays included
    pub fn items_applied(&self) -> usize {
        self.batches.lock().iter().sum()
    }

    pub fn failures(&self) -> &SimulatedFailure {
        &self.failures
    }
}

#[async_trait]
impl<T, K> ApplySink<T> for MemoryApplyStore<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Hash + Eq + Send + Sync + 'static,
{
    async fn apply_batch(&self, items: &[T]) -> Result<(), CollaboratorError> {
        self.failures.check("apply")?;

        let mut rows = self.rows.lock();
        for item in items {
            rows.insert((self.identity)(item), item.clone());
        }
        self.batches.lock().push(items.len());
        Ok(())
    }
}
