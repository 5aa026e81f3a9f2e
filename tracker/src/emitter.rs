//! Publishing side shared by every application service.

use crate::events::TrackerEvent;
use std::sync::Arc;
use tracing::debug;
use tracker_core::environment::{Clock, IdGenerator};
use tracker_core::{CorrelationContext, Envelope, EventPublisher, PublishReport, Uuid};

/// Wraps domain events in envelopes and hands them to the bus.
///
/// Also the single source of ids, so entity ids, envelope ids and
/// transaction ids come from the same injected generator.
#[derive(Clone)]
pub struct Emitter {
    bus: Arc<dyn EventPublisher<TrackerEvent>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Emitter {
    /// Create an emitter publishing to `bus`.
    #[must_use]
    pub fn new(
        bus: Arc<dyn EventPublisher<TrackerEvent>>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { bus, clock, ids }
    }

    /// Fresh identifier.
    #[must_use]
    pub fn next_id(&self) -> Uuid {
        self.ids.next_id()
    }

    /// Root a new causal chain for an external request.
    #[must_use]
    pub fn request_context(&self) -> CorrelationContext {
        CorrelationContext::new_request(self.ids.as_ref())
    }

    /// Publish `event` under `ctx`.
    ///
    /// Synchronous handlers have run when this returns.
    pub async fn emit(&self, event: TrackerEvent, ctx: &CorrelationContext) -> PublishReport {
        let envelope = Envelope::new(event, ctx, self.clock.as_ref(), self.ids.as_ref());
        debug!(
            event_type = envelope.event_type(),
            event_id = %envelope.id(),
            correlation_id = %ctx.correlation_id(),
            "Emitting event"
        );
        self.bus.publish(envelope).await
    }

    /// Publish `events` in order under `ctx`.
    pub async fn emit_all(
        &self,
        events: impl IntoIterator<Item = TrackerEvent>,
        ctx: &CorrelationContext,
    ) {
        for event in events {
            self.emit(event, ctx).await;
        }
    }
}
