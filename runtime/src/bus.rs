//! In-process publish/subscribe dispatcher.
//!
//! # Delivery
//!
//! ```text
//! publish(envelope)
//!   │
//!   ├─► sync handlers      run inline, in registration order
//!   │
//!   └─► async handlers     one job each ──► bounded queue ──► worker pool
//!                                        (send waits when full)
//! ```
//!
//! - Handlers are keyed by the event's closed `Kind`.
//! - Each handler receives `CorrelationContext::caused_by(envelope)`, so
//!   events it emits carry the triggering event's correlation id as their
//!   parent transaction id.
//! - A handler that fails or panics is logged with the correlation id and
//!   counted; delivery to the other handlers continues. No retries.
//! - Ordering across different events is only guaranteed among synchronous
//!   handlers on the same publishing task.

use crate::config::BusConfig;
use crate::metrics::EventBusMetrics;
use crate::stats::{DispatchSnapshot, DispatchStats};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};
use tracker_core::{
    BoxFuture, CorrelationContext, DeliveryMode, Envelope, Event, EventHandler, EventPublisher,
    HandlerError, Outcome, PublishReport,
};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Errors from bus lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus has been shut down and no longer accepts asynchronous jobs.
    #[error("Event bus is shut down")]
    ShutDown,
}

struct Registration<E: Event> {
    mode: DeliveryMode,
    handler: Arc<dyn EventHandler<E>>,
}

impl<E: Event> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self {
            mode: self.mode,
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Counts queued plus running asynchronous jobs.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn begin(&self) -> usize {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn end(&self) -> usize {
        let remaining = self.count.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.idle.notify_waiters();
        }
        remaining
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// In-process event bus with a bounded worker pool.
///
/// # Example
///
/// ```ignore
/// let bus = InProcessEventBus::<TrackerEvent>::new(BusConfig::default());
/// bus.register_async(EventKind::ProjectCreated, phase_consumer).await;
/// bus.register_sync(EventKind::PhaseCreated, ticket_phase_consumer).await;
///
/// let report = bus.publish(envelope).await;
/// bus.wait_idle().await;
/// ```
pub struct InProcessEventBus<E: Event> {
    registry: RwLock<HashMap<E::Kind, Vec<Registration<E>>>>,
    queue: RwLock<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<InFlight>,
    stats: Arc<DispatchStats>,
    config: BusConfig,
}

impl<E: Event> InProcessEventBus<E> {
    /// Create a bus and spawn its worker pool.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime (workers are spawned eagerly).
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(config.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.workers)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        let job = { receiver.lock().await.recv().await };
                        match job {
                            Some(job) => job.await,
                            None => break,
                        }
                    }
                    trace!(worker, "Event bus worker stopped");
                })
            })
            .collect();

        debug!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Event bus started"
        );

        Self {
            registry: RwLock::new(HashMap::new()),
            queue: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            in_flight: Arc::new(InFlight::default()),
            stats: Arc::new(DispatchStats::default()),
            config,
        }
    }

    /// Configuration the bus was started with.
    #[must_use]
    pub const fn config(&self) -> BusConfig {
        self.config
    }

    /// Register `handler` for events of `kind`.
    pub async fn register(
        &self,
        kind: E::Kind,
        mode: DeliveryMode,
        handler: Arc<dyn EventHandler<E>>,
    ) {
        debug!(?kind, handler = handler.name(), mode = mode.label(), "Handler registered");
        self.registry
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(Registration { mode, handler });
    }

    /// Register a handler that runs inline before `publish` returns.
    pub async fn register_sync(&self, kind: E::Kind, handler: Arc<dyn EventHandler<E>>) {
        self.register(kind, DeliveryMode::Sync, handler).await;
    }

    /// Register a handler that runs on the worker pool.
    pub async fn register_async(&self, kind: E::Kind, handler: Arc<dyn EventHandler<E>>) {
        self.register(kind, DeliveryMode::Async, handler).await;
    }

    /// Number of handlers registered for `kind`.
    pub async fn handler_count(&self, kind: E::Kind) -> usize {
        self.registry.read().await.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `envelope` to every handler registered for its kind.
    ///
    /// Synchronous handlers have finished when this returns; asynchronous
    /// handlers have been queued. Waits for queue capacity when the pool is
    /// saturated.
    pub async fn publish(&self, envelope: Envelope<E>) -> PublishReport {
        let registrations = {
            let registry = self.registry.read().await;
            registry.get(&envelope.kind()).cloned().unwrap_or_default()
        };

        self.stats.record_published();
        EventBusMetrics::record_publish(envelope.event_type());
        debug!(
            event_type = envelope.event_type(),
            event_id = %envelope.id(),
            correlation_id = %envelope.correlation_id(),
            handlers = registrations.len(),
            "Publishing event"
        );

        let envelope = Arc::new(envelope);
        let mut report = PublishReport::default();

        for registration in registrations.iter().filter(|r| r.mode == DeliveryMode::Sync) {
            let result = run_handler(
                registration.handler.as_ref(),
                &envelope,
                DeliveryMode::Sync,
                &self.stats,
            )
            .await;
            report
                .sync_outcomes
                .push((registration.handler.name(), result));
        }

        for registration in registrations
            .into_iter()
            .filter(|r| r.mode == DeliveryMode::Async)
        {
            match self.submit(registration.handler, Arc::clone(&envelope)).await {
                Ok(()) => report.async_dispatched += 1,
                Err(e) => {
                    let failure = Err(HandlerError::new(e.to_string()));
                    self.stats.record_result(&failure);
                    error!(
                        event_type = envelope.event_type(),
                        correlation_id = %envelope.correlation_id(),
                        error = %e,
                        "Dropped asynchronous delivery"
                    );
                }
            }
        }

        report
    }

    async fn submit(
        &self,
        handler: Arc<dyn EventHandler<E>>,
        envelope: Arc<Envelope<E>>,
    ) -> Result<(), BusError> {
        let sender = self.queue.read().await.clone().ok_or(BusError::ShutDown)?;

        let depth = self.in_flight.begin();
        EventBusMetrics::record_queue_depth(depth);

        let in_flight = Arc::clone(&self.in_flight);
        let stats = Arc::clone(&self.stats);
        let job: Job = Box::pin(async move {
            run_handler(handler.as_ref(), &envelope, DeliveryMode::Async, &stats).await;
            EventBusMetrics::record_queue_depth(in_flight.end());
        });

        if sender.send(job).await.is_err() {
            self.in_flight.end();
            return Err(BusError::ShutDown);
        }
        Ok(())
    }

    /// Resolve once no asynchronous job is queued or running.
    ///
    /// Jobs enqueued by running handlers are counted before the enqueuing job
    /// finishes, so this waits for whole causal chains.
    pub async fn wait_idle(&self) {
        self.in_flight.wait_idle().await;
    }

    /// Totals of everything dispatched so far.
    #[must_use]
    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting asynchronous jobs, drain the queue and join the workers.
    pub async fn shutdown(&self) {
        self.queue.write().await.take();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Event bus worker terminated abnormally");
            }
        }
        debug!("Event bus shut down");
    }
}

impl<E: Event> EventPublisher<E> for InProcessEventBus<E> {
    fn publish(&self, envelope: Envelope<E>) -> BoxFuture<'_, PublishReport> {
        Box::pin(Self::publish(self, envelope))
    }
}

/// Invoke one handler, isolating failures and panics, and record the result.
async fn run_handler<E: Event>(
    handler: &dyn EventHandler<E>,
    envelope: &Envelope<E>,
    mode: DeliveryMode,
    stats: &DispatchStats,
) -> Result<Outcome, HandlerError> {
    let name = handler.name();
    let ctx = CorrelationContext::caused_by(envelope);
    let started = Instant::now();

    // `handle` itself may panic before returning its future.
    let result = AssertUnwindSafe(async move { handler.handle(envelope, ctx).await })
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(HandlerError::new(format!("handler {name} panicked"))));
    let elapsed = started.elapsed();

    match &result {
        Ok(Outcome::Anomaly(reason)) => {
            warn!(
                handler = name,
                mode = mode.label(),
                event_type = envelope.event_type(),
                correlation_id = %envelope.correlation_id(),
                reason = %reason,
                "Possible race condition detected while handling event"
            );
        }
        Ok(outcome) => {
            debug!(
                handler = name,
                mode = mode.label(),
                event_type = envelope.event_type(),
                correlation_id = %envelope.correlation_id(),
                %outcome,
                "Event handled"
            );
        }
        Err(e) => {
            error!(
                handler = name,
                mode = mode.label(),
                event_type = envelope.event_type(),
                event_id = %envelope.id(),
                correlation_id = %envelope.correlation_id(),
                error = %e,
                "Event handler failed"
            );
        }
    }

    match &result {
        Ok(outcome) => EventBusMetrics::record_outcome(name, outcome.label(), elapsed),
        Err(_) => EventBusMetrics::record_failure(name, elapsed),
    }
    stats.record_result(&result);

    result
}
