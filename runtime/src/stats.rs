//! Aggregated handler outcomes.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracker_core::{HandlerError, Outcome};

/// Running totals of everything the bus dispatched.
///
/// Anomalies are the operator-visible signal for projection drift: they are
/// counted here and in the `event_bus_handler_outcomes_total` metric, never
/// reconciled automatically.
#[derive(Debug, Default)]
pub struct DispatchStats {
    published: AtomicU64,
    applied: AtomicU64,
    skipped: AtomicU64,
    anomalies: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
    /// Events published
    pub published: u64,
    /// Handler invocations that applied a change
    pub applied: u64,
    /// Handler invocations that skipped the event
    pub skipped: u64,
    /// Handler invocations that detected an inconsistency
    pub anomalies: u64,
    /// Handler invocations that failed or panicked
    pub failures: u64,
}

impl DispatchSnapshot {
    /// Total handler invocations that finished.
    #[must_use]
    pub const fn handled(&self) -> u64 {
        self.applied + self.skipped + self.anomalies + self.failures
    }
}

impl DispatchStats {
    /// Count one published event.
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one finished handler invocation.
    pub fn record_result(&self, result: &Result<Outcome, HandlerError>) {
        let counter = match result {
            Ok(Outcome::Applied) => &self.applied,
            Ok(Outcome::Skipped(_)) => &self.skipped,
            Ok(Outcome::Anomaly(_)) => &self.anomalies,
            Err(_) => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current totals.
    #[must_use]
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            published: self.published.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
