//! Idempotent upsert and best-effort delete, shared by every consumer.
//!
//! A duplicate create or a delete that finds nothing is a symptom of a race
//! between the owning context and this projection. Neither aborts the
//! handler: the write still happens (or is a no-op) and the caller gets an
//! [`Outcome::Anomaly`] that the bus logs and counts.

use std::fmt::Display;
use tracing::debug;
use tracker_core::CorrelationContext;
use tracker_core::Outcome;
use tracker_core::projection::{ProjectionStore, Result, Upsert};

/// Insert or overwrite `row` under `key`.
///
/// Returns [`Outcome::Applied`] on a fresh insert and [`Outcome::Anomaly`]
/// when a row already existed (it is overwritten either way).
///
/// # Errors
///
/// Propagates storage failures from the store.
pub async fn apply_upsert<K, R, S>(
    store_name: &'static str,
    store: &S,
    key: K,
    row: R,
    ctx: &CorrelationContext,
) -> Result<Outcome>
where
    K: Display + Send + Sync,
    R: Clone + Send + Sync,
    S: ProjectionStore<K, R>,
{
    let label = key.to_string();
    match store.upsert(key, row).await? {
        Upsert::Inserted => {
            debug!(
                store = store_name,
                key = %label,
                correlation_id = %ctx.correlation_id(),
                "Projection row inserted"
            );
            Ok(Outcome::Applied)
        }
        Upsert::Replaced(_) => Ok(Outcome::anomaly(format!(
            "{store_name}: row {label} already existed and was overwritten"
        ))),
    }
}

/// Overwrite the row under `key`, treating a missing row as the anomaly.
///
/// Used for patch-style events, where the row is expected to exist already.
///
/// # Errors
///
/// Propagates storage failures from the store.
pub async fn apply_replace<K, R, S>(
    store_name: &'static str,
    store: &S,
    key: K,
    row: R,
    ctx: &CorrelationContext,
) -> Result<Outcome>
where
    K: Display + Send + Sync,
    R: Clone + Send + Sync,
    S: ProjectionStore<K, R>,
{
    let label = key.to_string();
    match store.upsert(key, row).await? {
        Upsert::Replaced(_) => {
            debug!(
                store = store_name,
                key = %label,
                correlation_id = %ctx.correlation_id(),
                "Projection row replaced"
            );
            Ok(Outcome::Applied)
        }
        Upsert::Inserted => Ok(Outcome::anomaly(format!(
            "{store_name}: row {label} was missing and has been inserted"
        ))),
    }
}

/// Remove the row under `key`.
///
/// Exactly one removed row is [`Outcome::Applied`]; anything else is an
/// [`Outcome::Anomaly`].
///
/// # Errors
///
/// Propagates storage failures from the store.
pub async fn apply_delete<K, R, S>(
    store_name: &'static str,
    store: &S,
    key: &K,
    ctx: &CorrelationContext,
) -> Result<Outcome>
where
    K: Display + Send + Sync,
    R: Clone + Send + Sync,
    S: ProjectionStore<K, R>,
{
    match store.delete(key).await? {
        1 => {
            debug!(
                store = store_name,
                key = %key,
                correlation_id = %ctx.correlation_id(),
                "Projection row deleted"
            );
            Ok(Outcome::Applied)
        }
        0 => Ok(Outcome::anomaly(format!(
            "{store_name}: no row {key} to delete"
        ))),
        n => Ok(Outcome::anomaly(format!(
            "{store_name}: {n} rows deleted for {key}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::InMemoryProjectionStore;
    use tracker_testing::SequentialIds;

    fn ctx() -> CorrelationContext {
        CorrelationContext::new_request(&SequentialIds::new())
    }

    #[tokio::test]
    async fn duplicate_create_is_an_anomaly_but_still_written() {
        let store = InMemoryProjectionStore::new();
        let ctx = ctx();

        let first = apply_upsert("users", &store, 7_u32, "a@x.io", &ctx).await.unwrap();
        let second = apply_upsert("users", &store, 7_u32, "b@x.io", &ctx).await.unwrap();

        assert_eq!(first, Outcome::Applied);
        assert!(second.is_anomaly());
        assert_eq!(store.get(&7).await.unwrap(), Some("b@x.io"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replaying_the_same_create_yields_the_same_row() {
        let once = InMemoryProjectionStore::new();
        let twice = InMemoryProjectionStore::new();
        let ctx = ctx();

        apply_upsert("users", &once, 1_u32, "a@x.io", &ctx).await.unwrap();
        apply_upsert("users", &twice, 1_u32, "a@x.io", &ctx).await.unwrap();
        apply_upsert("users", &twice, 1_u32, "a@x.io", &ctx).await.unwrap();

        assert_eq!(once.rows().await, twice.rows().await);
    }

    #[tokio::test]
    async fn patch_of_missing_row_is_an_anomaly() {
        let store = InMemoryProjectionStore::new();
        let ctx = ctx();

        let outcome = apply_replace("users", &store, 3_u32, "c@x.io", &ctx).await.unwrap();

        assert!(outcome.is_anomaly());
        assert!(store.exists(&3).await.unwrap());
        let outcome = apply_replace("users", &store, 3_u32, "d@x.io", &ctx).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);
    }

    #[tokio::test]
    async fn deleting_a_missing_row_is_an_anomaly() {
        let store = InMemoryProjectionStore::<u32, &str>::new();
        let ctx = ctx();
        store.upsert(1, "a@x.io").await.unwrap();

        assert_eq!(apply_delete("users", &store, &1, &ctx).await.unwrap(), Outcome::Applied);
        assert!(apply_delete("users", &store, &1, &ctx).await.unwrap().is_anomaly());
    }
}
