//! # Tracker Core
//!
//! Core traits and types for the tracker's event-propagation protocol.
//!
//! The tracker is split into bounded contexts (User, Project, Membership,
//! Phase, Ticket, Notification). Each context owns one primary entity and
//! keeps local, eventually-consistent projections of the foreign data it
//! needs. Contexts talk to each other exclusively through domain events.
//!
//! ## Core Concepts
//!
//! - **Envelope**: immutable event wrapper with id, timestamp and correlation
//! - **Correlation Context**: explicit causal link threaded through every call
//!   that can emit an event
//! - **Event Handler**: consumer registered on the bus per event kind,
//!   reporting an explicit [`event_bus::Outcome`]
//! - **Projection Store**: keyed table of foreign facts, idempotent upsert and
//!   best-effort delete
//! - **Environment**: injected clock and id generator
//!
//! ## Architecture Principles
//!
//! - Commit locally, then publish
//! - No cross-context reads or writes, only events
//! - Detect and log inconsistency windows, do not prevent them
//! - Explicit context passing, no ambient state

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

/// Event trait, correlation context and envelope
pub mod event;

/// Handler and publisher traits, handler outcomes
pub mod event_bus;

/// Projection store trait
pub mod projection;

/// Environment module - Injected dependencies
///
/// Anything non-deterministic (time, identity) comes in through these traits
/// so tests can pin it down.
pub mod environment {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    /// Clock trait for getting current time
    ///
    /// Allows for deterministic testing by injecting fixed time.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of identifiers for entities, envelopes and transactions.
    ///
    /// Identifiers are allocated before an entity is linked to anything, so
    /// nothing ever references an entity that lacks a stable id.
    pub trait IdGenerator: Send + Sync {
        /// Produce a fresh identifier.
        fn next_id(&self) -> Uuid;
    }

    /// Random (v4) UUIDs.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidGenerator;

    impl IdGenerator for UuidGenerator {
        fn next_id(&self) -> Uuid {
            Uuid::new_v4()
        }
    }
}

pub use event::{CorrelationContext, Envelope, Event};
pub use event_bus::{
    BoxFuture, DeliveryMode, EventHandler, EventPublisher, HandlerError, Outcome, PublishReport,
};
