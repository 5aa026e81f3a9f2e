//! Projection stores: local, eventually-consistent caches of foreign entities.
//!
//! # Overview
//!
//! A context that needs to validate against data owned by another context
//! does not query it. It keeps a small keyed table of the foreign facts it
//! needs and maintains that table from the owning context's events.
//!
//! ```text
//! Owning context            Consuming context
//! ┌──────────────┐          ┌────────────────────────┐
//! │ Project repo │          │ ProjectProjection      │
//! │  (source of  │  events  │  project_id → row      │
//! │    truth)    │ ───────► │  (advisory, may lag)   │
//! └──────────────┘          └────────────────────────┘
//! ```
//!
//! ## Philosophy
//!
//! - **Advisory**: rows exist only to validate commands locally
//! - **Idempotent upsert**: the key is a uniqueness constraint; replaying a
//!   create overwrites instead of duplicating
//! - **Best-effort delete**: removing a row that is not there is reported,
//!   not raised
//! - **Log, don't crash**: a stale row degrades validation precision, never
//!   the owning entity's correctness

use crate::event_bus::HandlerError;
use std::future::Future;

/// Error type for projection operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Event processing error
    #[error("Event processing error: {0}")]
    EventProcessing(String),
}

impl From<ProjectionError> for HandlerError {
    fn from(error: ProjectionError) -> Self {
        Self::new(error.to_string())
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// What an upsert did to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Upsert<R> {
    /// No row existed for the key.
    Inserted,
    /// A row existed and was overwritten; carries the previous row.
    Replaced(R),
}

impl<R> Upsert<R> {
    /// Whether an existing row was overwritten.
    #[must_use]
    pub const fn replaced(&self) -> bool {
        matches!(self, Self::Replaced(_))
    }
}

/// Keyed table of projection rows.
///
/// Each consuming context owns its stores exclusively; no other context
/// writes to them.
///
/// # Example
///
/// ```ignore
/// let outcome = match store.upsert(project_id, ProjectRow { project_id }).await? {
///     Upsert::Inserted => Outcome::Applied,
///     Upsert::Replaced(_) => Outcome::anomaly("duplicate ProjectCreated"),
/// };
/// ```
pub trait ProjectionStore<K, R>: Send + Sync
where
    K: Send + Sync,
    R: Clone + Send + Sync,
{
    /// Insert or overwrite the row stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the backend fails.
    fn upsert(&self, key: K, row: R) -> impl Future<Output = Result<Upsert<R>>> + Send;

    /// Row stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the backend fails.
    fn get(&self, key: &K) -> impl Future<Output = Result<Option<R>>> + Send;

    /// Remove the row stored under `key`, returning how many rows were removed.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the backend fails.
    fn delete(&self, key: &K) -> impl Future<Output = Result<usize>> + Send;

    /// Remove every row matching `predicate` (delete-by-foreign-key).
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the backend fails.
    fn delete_where<F>(&self, predicate: F) -> impl Future<Output = Result<usize>> + Send
    where
        F: Fn(&R) -> bool + Send;

    /// Rows matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the backend fails.
    fn find<F>(&self, predicate: F) -> impl Future<Output = Result<Vec<R>>> + Send
    where
        F: Fn(&R) -> bool + Send;

    /// Apply `update` to every row matching `predicate`, returning the count.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the backend fails.
    fn update_where<F, U>(&self, predicate: F, update: U) -> impl Future<Output = Result<usize>> + Send
    where
        F: Fn(&R) -> bool + Send,
        U: Fn(&mut R) + Send;

    /// Number of rows.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the backend fails.
    fn count(&self) -> impl Future<Output = Result<usize>> + Send;

    /// Whether a row exists under `key`.
    ///
    /// Default implementation uses [`ProjectionStore::get`].
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the backend fails.
    fn exists(&self, key: &K) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }
}
