use std::sync::{Arc, Mutex};
use tracker_core::{BoxFuture, CorrelationContext, Envelope, Event, EventHandler, HandlerError, Outcome};

/// Handler that captures every envelope delivered to it, in delivery order.
///
/// Register it synchronously to observe exact publication order, or
/// asynchronously to observe what the worker pool delivers.
///
/// # Example
///
/// ```ignore
/// let recorder = Arc::new(EventRecorder::new("recorder"));
/// for kind in EventKind::ALL {
///     bus.register_sync(kind, recorder.clone()).await;
/// }
///
/// // ... drive the system ...
///
/// let types: Vec<_> = recorder.event_types();
/// assert_eq!(types, ["PhasePositionUpdated.v1", "PhaseCreated.v1"]);
/// ```
pub struct EventRecorder<E: Event> {
    name: &'static str,
    received: Arc<Mutex<Vec<(Envelope<E>, CorrelationContext)>>>,
}

impl<E: Event> EventRecorder<E> {
    /// Create an empty recorder.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every envelope received so far.
    #[must_use]
    pub fn envelopes(&self) -> Vec<Envelope<E>> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(envelope, _)| envelope.clone())
            .collect()
    }

    /// Payloads received so far.
    #[must_use]
    pub fn events(&self) -> Vec<E> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(envelope, _)| envelope.payload().clone())
            .collect()
    }

    /// Versioned type names received so far.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(envelope, _)| envelope.event_type())
            .collect()
    }

    /// Contexts the bus handed to this handler, one per delivery.
    #[must_use]
    pub fn contexts(&self) -> Vec<CorrelationContext> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(_, ctx)| *ctx)
            .collect()
    }

    /// Number of envelopes received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    /// Whether nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.received.lock().unwrap().is_empty()
    }

    /// Forget everything received so far.
    pub fn clear(&self) {
        self.received.lock().unwrap().clear();
    }
}

impl<E: Event> EventHandler<E> for EventRecorder<E> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope<E>,
        ctx: CorrelationContext,
    ) -> BoxFuture<'a, Result<Outcome, HandlerError>> {
        Box::pin(async move {
            self.received.lock().unwrap().push((envelope.clone(), ctx));
            Ok(Outcome::Applied)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SequentialIds, test_clock};

    #[derive(Clone, Debug, PartialEq)]
    struct Ping(u8);

    impl Event for Ping {
        type Kind = ();

        fn kind(&self) {}

        fn event_type(&self) -> &'static str {
            "Ping.v1"
        }
    }

    #[tokio::test]
    async fn records_envelopes_and_contexts() {
        let ids = SequentialIds::new();
        let ctx = CorrelationContext::new_request(&ids);
        let envelope = Envelope::new(Ping(1), &ctx, &test_clock(), &ids);
        let recorder = EventRecorder::new("recorder");

        let outcome = recorder
            .handle(&envelope, CorrelationContext::caused_by(&envelope))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(recorder.events(), vec![Ping(1)]);
        assert_eq!(recorder.event_types(), vec!["Ping.v1"]);
        assert_eq!(
            recorder.contexts()[0].parent_transaction_id(),
            Some(ctx.correlation_id())
        );

        recorder.clear();
        assert!(recorder.is_empty());
    }
}
