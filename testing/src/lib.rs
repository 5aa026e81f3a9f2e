//! # Tracker Testing
//!
//! Testing utilities and helpers for the tracker.
//!
//! This crate provides:
//! - Deterministic environment implementations (`FixedClock`, `SequentialIds`)
//! - [`EventRecorder`]: a handler that captures every envelope it receives
//! - [`init_test_tracing`]: idempotent log setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use tracker_testing::{EventRecorder, test_clock};
//!
//! #[tokio::test]
//! async fn records_phase_events() {
//!     let recorder = Arc::new(EventRecorder::new("recorder"));
//!     bus.register_sync(EventKind::PhaseCreated, recorder.clone()).await;
//!
//!     phases.create_phase(project, "QA", None, &ctx).await?;
//!
//!     assert_eq!(recorder.len(), 1);
//! }
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities panic only on poisoned locks

use chrono::{DateTime, Utc};
use tracker_core::environment::{Clock, IdGenerator};

/// Handler that records delivered envelopes
pub mod recorder;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};
    use uuid::Uuid;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tracker_testing::mocks::FixedClock;
    /// use tracker_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable ids: `00000000-0000-0000-0000-000000000001`, `...02`, ...
    ///
    /// # Example
    ///
    /// ```
    /// use tracker_testing::mocks::SequentialIds;
    /// use tracker_core::environment::IdGenerator;
    ///
    /// let ids = SequentialIds::new();
    /// assert_eq!(ids.next_id().as_u128(), 1);
    /// assert_eq!(ids.next_id().as_u128(), 2);
    /// ```
    #[derive(Debug, Default)]
    pub struct SequentialIds {
        next: AtomicU64,
    }

    impl SequentialIds {
        /// Start counting at 1
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> Uuid {
            Uuid::from_u128(u128::from(self.next.fetch_add(1, Ordering::SeqCst)) + 1)
        }
    }
}

/// Install a `fmt` subscriber writing through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
/// Honors `RUST_LOG`, defaulting to `warn`.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, SequentialIds, test_clock};
pub use recorder::EventRecorder;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn sequential_ids_are_ordered() {
        let ids = SequentialIds::new();
        let first = ids.next_id();
        let second = ids.next_id();
        assert!(first < second);
        assert_eq!(second.as_u128(), 2);
    }
}
