//! `HashMap`-backed projection store.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracker_core::projection::{ProjectionStore, Result, Upsert};

/// In-memory projection store.
///
/// The map key is the uniqueness constraint idempotent upserts rely on.
/// Cloning the store shares the underlying table.
///
/// # Example
///
/// ```
/// use tracker_core::projection::{ProjectionStore, Upsert};
/// use tracker_projections::InMemoryProjectionStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryProjectionStore::<u32, &str>::new();
///
/// assert_eq!(store.upsert(1, "alice@example.com").await?, Upsert::Inserted);
/// assert!(store.upsert(1, "alice@example.com").await?.replaced());
/// assert_eq!(store.count().await?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryProjectionStore<K, R> {
    rows: Arc<RwLock<HashMap<K, R>>>,
}

impl<K, R> InMemoryProjectionStore<K, R> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Remove every row.
    pub async fn clear(&self) {
        self.rows.write().await.clear();
    }
}

impl<K, R: Clone> InMemoryProjectionStore<K, R> {
    /// Copy of every row, in no particular order.
    pub async fn rows(&self) -> Vec<R> {
        self.rows.read().await.values().cloned().collect()
    }
}

impl<K, R> Clone for InMemoryProjectionStore<K, R> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<K, R> Default for InMemoryProjectionStore<K, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, R> ProjectionStore<K, R> for InMemoryProjectionStore<K, R>
where
    K: Eq + Hash + Send + Sync,
    R: Clone + Send + Sync,
{
    async fn upsert(&self, key: K, row: R) -> Result<Upsert<R>> {
        let previous = self.rows.write().await.insert(key, row);
        Ok(previous.map_or(Upsert::Inserted, Upsert::Replaced))
    }

    async fn get(&self, key: &K) -> Result<Option<R>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &K) -> Result<usize> {
        Ok(usize::from(self.rows.write().await.remove(key).is_some()))
    }

    async fn delete_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&R) -> bool + Send,
    {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, row| !predicate(row));
        Ok(before - rows.len())
    }

    async fn find<F>(&self, predicate: F) -> Result<Vec<R>>
    where
        F: Fn(&R) -> bool + Send,
    {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|row| predicate(row))
            .cloned()
            .collect())
    }

    async fn update_where<F, U>(&self, predicate: F, update: U) -> Result<usize>
    where
        F: Fn(&R) -> bool + Send,
        U: Fn(&mut R) + Send,
    {
        let mut rows = self.rows.write().await;
        let mut updated = 0;
        for row in rows.values_mut().filter(|row| predicate(row)) {
            update(row);
            updated += 1;
        }
        Ok(updated)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.read().await.len())
    }

    async fn exists(&self, key: &K) -> Result<bool> {
        Ok(self.rows.read().await.contains_key(key))
    }
}
