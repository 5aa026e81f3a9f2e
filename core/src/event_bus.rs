//! Event bus abstraction for cross-context communication.
//!
//! Bounded contexts never call each other directly. A context commits a local
//! change, wraps the resulting fact in an [`Envelope`] and publishes it; every
//! handler registered for that event's kind receives it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Service   │  1. commit local write
//! └──────┬──────┘
//!        │ 2. publish(envelope)
//!        ▼
//! ┌─────────────────┐
//! │    Event Bus    │
//! └───┬─────────┬───┘
//!     │ inline  │ worker pool
//!     ▼         ▼
//! ┌───────┐ ┌───────┐
//! │ Sync  │ │ Async │ ──► may publish follow-up events
//! │handler│ │handler│     under CorrelationContext::caused_by
//! └───────┘ └───────┘
//! ```
//!
//! # Key Principles
//!
//! - **Commit first**: events describe writes that already happened
//! - **At-least-once**: handlers may see duplicates and must be idempotent
//! - **Isolation**: a failing handler never aborts delivery to the others
//! - **Explicit outcomes**: every handler reports an [`Outcome`] instead of
//!   only logging
//!
//! # Dyn Compatibility
//!
//! The traits return `Pin<Box<dyn Future>>` rather than using `async fn` so
//! they can be stored as `Arc<dyn EventHandler<E>>` and
//! `Arc<dyn EventPublisher<E>>`.

use crate::event::{CorrelationContext, Envelope, Event};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by the dyn-compatible traits in this module.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a handler processing one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The event changed local state as intended.
    Applied,
    /// The event was deliberately ignored (not relevant, already applied).
    Skipped(String),
    /// The event was processed best-effort but revealed an inconsistency
    /// (duplicate create, missing row on delete). Never fails the caller.
    Anomaly(String),
}

impl Outcome {
    /// Build a skipped outcome.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }

    /// Build an anomaly outcome.
    #[must_use]
    pub fn anomaly(reason: impl Into<String>) -> Self {
        Self::Anomaly(reason.into())
    }

    /// Metric label for this outcome.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped(_) => "skipped",
            Self::Anomaly(_) => "anomaly",
        }
    }

    /// Whether this outcome is an anomaly.
    #[must_use]
    pub const fn is_anomaly(&self) -> bool {
        matches!(self, Self::Anomaly(_))
    }

    /// Combine two outcomes of the same handler invocation.
    ///
    /// Anomalies dominate, then applied, then skipped.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (a @ Self::Anomaly(_), _) | (_, a @ Self::Anomaly(_)) => a,
            (Self::Applied, _) | (_, Self::Applied) => Self::Applied,
            (s @ Self::Skipped(_), Self::Skipped(_)) => s,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::Anomaly(reason) => write!(f, "anomaly: {reason}"),
        }
    }
}

/// Failure raised by a handler.
///
/// Logged by the bus with the triggering event's correlation id. Not retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error from any displayable message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// How a handler is executed relative to the publisher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// Runs inline before `publish` returns.
    Sync,
    /// Runs on the bus worker pool; `publish` does not wait for it.
    Async,
}

impl DeliveryMode {
    /// Metric/log label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
        }
    }
}

/// Consumer of published events.
///
/// The bus passes `CorrelationContext::caused_by(envelope)` as `ctx`; any event
/// the handler emits must be created under that context so the causal chain
/// remains traceable.
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    /// Stable handler name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when processing fails. The bus logs the error
    /// and keeps delivering to the other handlers.
    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope<E>,
        ctx: CorrelationContext,
    ) -> BoxFuture<'a, Result<Outcome, HandlerError>>;
}

/// Summary of one `publish` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Outcomes of the synchronous handlers, in execution order.
    pub sync_outcomes: Vec<(&'static str, Result<Outcome, HandlerError>)>,
    /// Number of asynchronous handler jobs submitted to the worker pool.
    pub async_dispatched: usize,
}

impl PublishReport {
    /// Whether any synchronous handler failed.
    #[must_use]
    pub fn has_sync_failures(&self) -> bool {
        self.sync_outcomes.iter().any(|(_, result)| result.is_err())
    }

    /// Total number of handlers the event was delivered to.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.sync_outcomes.len() + self.async_dispatched
    }
}

/// Publishing side of the bus, as seen by the services that emit events.
pub trait EventPublisher<E: Event>: Send + Sync {
    /// Deliver `envelope` to every handler registered for its kind.
    ///
    /// Synchronous handlers have completed when the returned future resolves;
    /// asynchronous ones have been queued.
    fn publish(&self, envelope: Envelope<E>) -> BoxFuture<'_, PublishReport>;
}
