//! Event trait, correlation context and the immutable event envelope.
//!
//! Every domain event travels wrapped in an [`Envelope`]. The envelope carries
//! the event's identity, its creation time and its [`CorrelationContext`]: the
//! causal link back to either the external request that rooted the chain or
//! the event whose handler emitted it.
//!
//! # Correlation
//!
//! ```text
//! request ──► Envelope{ Request{tx=T} }            correlation_id = T
//!                 │ handler
//!                 ▼
//!             Envelope{ Reaction{parent=T} }       correlation_id = T
//!                 │ handler
//!                 ▼
//!             Envelope{ Reaction{parent=T} }       correlation_id = T
//! ```
//!
//! The context is passed explicitly to every call that can emit an event.
//! There is no ambient transaction state.
//!
//! # Example
//!
//! ```
//! use tracker_core::environment::{SystemClock, UuidGenerator};
//! use tracker_core::event::{CorrelationContext, Envelope, Event};
//!
//! #[derive(Clone, Debug)]
//! enum OrderEvent {
//!     Placed { order_id: u32 },
//! }
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
//! enum OrderEventKind {
//!     Placed,
//! }
//!
//! impl Event for OrderEvent {
//!     type Kind = OrderEventKind;
//!
//!     fn kind(&self) -> OrderEventKind {
//!         OrderEventKind::Placed
//!     }
//!
//!     fn event_type(&self) -> &'static str {
//!         "OrderPlaced.v1"
//!     }
//! }
//!
//! let ids = UuidGenerator;
//! let ctx = CorrelationContext::new_request(&ids);
//! let envelope = Envelope::new(OrderEvent::Placed { order_id: 7 }, &ctx, &SystemClock, &ids);
//!
//! assert_eq!(envelope.correlation_id(), ctx.correlation_id());
//! assert_eq!(envelope.transaction_id(), ctx.transaction_id());
//! assert!(envelope.parent_transaction_id().is_none());
//! ```

use crate::environment::{Clock, IdGenerator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use uuid::Uuid;

/// A domain event that can be published on the bus.
///
/// Events are closed enums. [`Event::Kind`] is the fieldless mirror of the
/// enum used as the handler registry key, so handler routing is checked at
/// compile time instead of matching on runtime type names.
///
/// # Event Naming Convention
///
/// `event_type()` returns a stable, versioned identifier used in logs and
/// metric labels, e.g. `"PhaseCreated.v1"`.
pub trait Event: Clone + Debug + Send + Sync + 'static {
    /// Fieldless discriminant of the event, used to route to handlers.
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Returns the routing kind of this event.
    fn kind(&self) -> Self::Kind;

    /// Returns the versioned event type identifier.
    fn event_type(&self) -> &'static str;
}

/// Causal origin of an event.
///
/// An event is either rooted in a fresh external request (it carries a
/// transaction id) or emitted in reaction to another event (it carries the
/// parent transaction id). Exactly one of the two is present, which the enum
/// makes unrepresentable to violate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrelationContext {
    /// The event originates inside an external request.
    Request {
        /// Transaction id minted for the request.
        transaction_id: Uuid,
    },
    /// The event is emitted while handling another event.
    Reaction {
        /// Correlation id of the triggering event.
        parent_transaction_id: Uuid,
    },
}

impl CorrelationContext {
    /// Start a new request-rooted chain with a freshly generated transaction id.
    #[must_use]
    pub fn new_request(ids: &dyn IdGenerator) -> Self {
        Self::Request {
            transaction_id: ids.next_id(),
        }
    }

    /// Request-rooted context with a caller-provided transaction id.
    #[must_use]
    pub const fn request(transaction_id: Uuid) -> Self {
        Self::Request { transaction_id }
    }

    /// Context for events emitted while handling `envelope`.
    ///
    /// The parent transaction id is the triggering event's correlation id, so
    /// a whole causal chain shares the id of the request that rooted it.
    #[must_use]
    pub fn caused_by<E: Event>(envelope: &Envelope<E>) -> Self {
        Self::Reaction {
            parent_transaction_id: envelope.correlation_id(),
        }
    }

    /// Transaction id, set only for request-rooted contexts.
    #[must_use]
    pub const fn transaction_id(&self) -> Option<Uuid> {
        match self {
            Self::Request { transaction_id } => Some(*transaction_id),
            Self::Reaction { .. } => None,
        }
    }

    /// Parent transaction id, set only for event-rooted contexts.
    #[must_use]
    pub const fn parent_transaction_id(&self) -> Option<Uuid> {
        match self {
            Self::Request { .. } => None,
            Self::Reaction {
                parent_transaction_id,
            } => Some(*parent_transaction_id),
        }
    }

    /// Whichever of the two ids is present.
    #[must_use]
    pub const fn correlation_id(&self) -> Uuid {
        match self {
            Self::Request { transaction_id } => *transaction_id,
            Self::Reaction {
                parent_transaction_id,
            } => *parent_transaction_id,
        }
    }
}

impl fmt::Display for CorrelationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request { transaction_id } => write!(f, "tx:{transaction_id}"),
            Self::Reaction {
                parent_transaction_id,
            } => write!(f, "parent:{parent_transaction_id}"),
        }
    }
}

/// Immutable wrapper around a published event.
///
/// Envelopes are created at publish time, never persisted, and may be
/// consumed by any number of handlers.
#[derive(Clone, Debug)]
pub struct Envelope<E> {
    id: Uuid,
    occurred_at: DateTime<Utc>,
    correlation: CorrelationContext,
    payload: E,
}

impl<E: Event> Envelope<E> {
    /// Wrap `payload` for publication under `ctx`.
    #[must_use]
    pub fn new(
        payload: E,
        ctx: &CorrelationContext,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> Self {
        Self {
            id: ids.next_id(),
            occurred_at: clock.now(),
            correlation: *ctx,
            payload,
        }
    }

    /// Unique id of this envelope.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// When the event was created.
    #[must_use]
    pub const fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// The wrapped domain event.
    #[must_use]
    pub const fn payload(&self) -> &E {
        &self.payload
    }

    /// Routing kind of the wrapped event.
    #[must_use]
    pub fn kind(&self) -> E::Kind {
        self.payload.kind()
    }

    /// Versioned type identifier of the wrapped event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    /// The causal context this event was emitted under.
    #[must_use]
    pub const fn correlation(&self) -> &CorrelationContext {
        &self.correlation
    }

    /// Transaction id if this event is request-rooted.
    #[must_use]
    pub const fn transaction_id(&self) -> Option<Uuid> {
        self.correlation.transaction_id()
    }

    /// Parent transaction id if this event is event-rooted.
    #[must_use]
    pub const fn parent_transaction_id(&self) -> Option<Uuid> {
        self.correlation.parent_transaction_id()
    }

    /// `transaction_id ?? parent_transaction_id`.
    #[must_use]
    pub const fn correlation_id(&self) -> Uuid {
        self.correlation.correlation_id()
    }
}

impl<E: Event> fmt::Display for Envelope<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Envelope {{ type: {}, id: {}, {} }}",
            self.event_type(),
            self.id,
            self.correlation
        )
    }
}
