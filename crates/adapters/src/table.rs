//! Table of pending rows with offset pagination
//!
//! Rows are pending until committed. Pages are taken over the pending rows
//! in insertion order, so committing rows shifts later pages forward the
//! way `LIMIT/OFFSET` over a filtered query does.

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use ferry_pipeline::{CollaboratorError, IdentityFn, RowSource};
use parking_lot::Mutex;

use crate::SimulatedFailure;

struct Row<T> {
    value: T,
    pending: bool,
}

struct Inner<T, K> {
    rows: Vec<Row<T>>,
    index: HashMap<K, usize>,
}

pub struct MemoryRowTable<T, K> {
    identity: IdentityFn<T, K>,
    page_size: usize,
    inner: Mutex<Inner<T, K>>,
    fetch_failures: SimulatedFailure,
    commit_failures: SimulatedFailure,
}

impl<T: Clone, K: Hash + Eq> MemoryRowTable<T, K> {
    /// Create a table serving pages of `page_size` rows (minimum 1)
    pub fn new(identity: IdentityFn<T, K>, page_size: usize) -> Self {
        Self {
            identity,
            page_size: page_size.max(1),
            inner: Mutex::new(Inner {
                rows: Vec::new(),
                index: HashMap::new(),
            }),
            fetch_failures: SimulatedFailure::new(),
            commit_failures: SimulatedFailure::new(),
        }
    }

    /// Insert a pending row, replacing any row with the same identity
    pub fn insert(&self, value: T) {
        let key = (self.identity)(&value);
        let mut inner = self.inner.lock();
        match inner.index.get(&key) {
            Some(&position) => {
                inner.rows[position] = Row {
                    value,
                    pending: true,
                };
            }
            None => {
                let position = inner.rows.len();
                inner.rows.push(Row {
                    value,
                    pending: true,
                });
                inner.index.insert(key, position);
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().rows.iter().filter(|r| r.pending).count()
    }

    pub fn processed(&self) -> usize {
        self.inner.lock().rows.iter().filter(|r| !r.pending).count()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        let inner = self.inner.lock();
        inner
            .index
            .get(key)
            .is_some_and(|&position| inner.rows[position].pending)
    }

    pub fn fetch_failures(&self) -> &SimulatedFailure {
        &self.fetch_failures
    }

    pub fn commit_failures(&self) -> &SimulatedFailure {
        &self.commit_failures
    }
}

#[async_trait]
impl<T, K> RowSource<T> for MemoryRowTable<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Hash + Eq + Send + Sync + 'static,
{
    async fn fetch_page(&self, page: usize) -> Result<Vec<T>, CollaboratorError> {
        self.fetch_failures.check("fetch")?;

        let inner = self.inner.lock();
        Ok(inner
            .rows
            .iter()
            .filter(|row| row.pending)
            .skip(page.saturating_mul(self.page_size))
            .take(self.page_size)
            .map(|row| row.value.clone())
            .collect())
    }

    async fn commit_processed(&self, items: &[T]) -> Result<usize, CollaboratorError> {
        self.commit_failures.check("commit")?;

        let mut inner = self.inner.lock();
        let mut affected = 0;
        for item in items {
            let Some(&position) = inner.index.get(&(self.identity)(item)) else {
                continue;
            };
            let row = &mut inner.rows[position];
            if row.pending {
                row.pending = false;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn table(rows: u32, page_size: usize) -> MemoryRowTable<u32, u32> {
        let table = MemoryRowTable::new(Arc::new(|row: &u32| *row), page_size);
        for row in 0..rows {
            table.insert(row);
        }
        table
    }

    #[tokio::test]
    async fn test_pages_until_empty() {
        let table = table(90, 40);
        assert_eq!(table.fetch_page(0).await.unwrap().len(), 40);
        assert_eq!(table.fetch_page(1).await.unwrap().len(), 40);
        assert_eq!(table.fetch_page(2).await.unwrap(), (80..90).collect::<Vec<_>>());
        assert!(table.fetch_page(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_marks_processed() {
        let table = table(10, 4);
        let affected = table.commit_processed(&[0, 1, 2]).await.unwrap();
        assert_eq!(affected, 3);
        assert_eq!(table.pending(), 7);
        assert!(!table.is_pending(&1));

        // Already processed and unknown rows are not counted
        assert_eq!(table.commit_processed(&[2, 3, 99]).await.unwrap(), 1);
        assert_eq!(table.fetch_page(0).await.unwrap(), vec![4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_reinsert_makes_row_pending_again() {
        let table = table(3, 10);
        table.commit_processed(&[1]).await.unwrap();
        table.insert(1);
        assert!(table.is_pending(&1));
        assert_eq!(table.processed(), 0);
    }
}
