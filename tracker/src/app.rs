//! Wiring: one bus, every bounded context and their consumers.

use crate::config::TrackerConfig;
use crate::emitter::Emitter;
use crate::events::{EventKind, TrackerEvent};
use crate::membership::{MembershipConsumer, MembershipService};
use crate::notification::{NotificationConsumer, NotificationOutbox};
use crate::phase::{PhaseConsumer, PhaseService};
use crate::project::{ProjectConsumer, ProjectService};
use crate::ticket::{TicketConsumer, TicketPhaseProjection, TicketService};
use crate::user::UserService;
use std::sync::Arc;
use tracing::info;
use tracker_core::environment::{Clock, IdGenerator, SystemClock, UuidGenerator};
use tracker_core::{CorrelationContext, EventHandler};
use tracker_runtime::metrics::{MetricsError, MetricsServer};
use tracker_runtime::{DispatchSnapshot, InProcessEventBus};

/// A running tracker: the event bus plus every bounded context.
///
/// # Example
///
/// ```ignore
/// let tracker = Tracker::start(&TrackerConfig::from_env()).await?;
/// let ctx = tracker.request_context();
///
/// let ada = tracker.users().create_user("ada@example.com", "Ada", &ctx).await?;
/// tracker.wait_idle().await; // default project, owner membership, phases
/// ```
pub struct Tracker {
    bus: Arc<InProcessEventBus<TrackerEvent>>,
    emitter: Emitter,
    users: Arc<UserService>,
    projects: Arc<ProjectService>,
    memberships: Arc<MembershipService>,
    phases: Arc<PhaseService>,
    tickets: Arc<TicketService>,
    notifications: Arc<NotificationOutbox>,
    metrics: Option<MetricsServer>,
}

impl Tracker {
    /// Start a tracker with the system clock and random ids.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if metrics are enabled and the recorder
    /// cannot be installed.
    pub async fn start(config: &TrackerConfig) -> Result<Self, MetricsError> {
        Self::with_environment(config, Arc::new(SystemClock), Arc::new(UuidGenerator)).await
    }

    /// Start a tracker with an injected clock and id generator.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if metrics are enabled and the recorder
    /// cannot be installed.
    pub async fn with_environment(
        config: &TrackerConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, MetricsError> {
        let metrics = if config.metrics_enabled {
            let mut server = MetricsServer::new(config.metrics_addr);
            server.start()?;
            Some(server)
        } else {
            None
        };

        let bus = Arc::new(InProcessEventBus::new(config.bus));
        let emitter = Emitter::new(bus.clone(), clock, ids);

        let tracker = Self {
            users: Arc::new(UserService::new(emitter.clone())),
            projects: Arc::new(ProjectService::new(
                emitter.clone(),
                config.default_project_name.clone(),
            )),
            memberships: Arc::new(MembershipService::new(emitter.clone())),
            phases: Arc::new(PhaseService::new(emitter.clone())),
            tickets: Arc::new(TicketService::new(emitter.clone())),
            notifications: Arc::new(NotificationOutbox::new(emitter.clone())),
            bus,
            emitter,
            metrics,
        };
        tracker.register_consumers().await;

        info!(
            workers = config.bus.workers,
            queue_capacity = config.bus.queue_capacity,
            metrics = config.metrics_enabled,
            "Tracker started"
        );
        Ok(tracker)
    }

    async fn register_consumers(&self) {
        let bus = &self.bus;

        let phase_projection: Arc<dyn EventHandler<TrackerEvent>> =
            Arc::new(TicketPhaseProjection::new(Arc::clone(&self.tickets)));
        for kind in TicketPhaseProjection::KINDS {
            bus.register_sync(kind, Arc::clone(&phase_projection)).await;
        }

        let consumers: [(&[EventKind], Arc<dyn EventHandler<TrackerEvent>>); 5] = [
            (
                &ProjectConsumer::KINDS,
                Arc::new(ProjectConsumer::new(Arc::clone(&self.projects))),
            ),
            (
                &MembershipConsumer::KINDS,
                Arc::new(MembershipConsumer::new(Arc::clone(&self.memberships))),
            ),
            (
                &PhaseConsumer::KINDS,
                Arc::new(PhaseConsumer::new(Arc::clone(&self.phases))),
            ),
            (
                &TicketConsumer::KINDS,
                Arc::new(TicketConsumer::new(Arc::clone(&self.tickets))),
            ),
            (
                &NotificationConsumer::KINDS,
                Arc::new(NotificationConsumer::new(Arc::clone(&self.notifications))),
            ),
        ];
        for (kinds, handler) in consumers {
            for &kind in kinds {
                bus.register_async(kind, Arc::clone(&handler)).await;
            }
        }
    }

    /// Root a new causal chain for an external request.
    #[must_use]
    pub fn request_context(&self) -> CorrelationContext {
        self.emitter.request_context()
    }

    /// User context.
    #[must_use]
    pub const fn users(&self) -> &Arc<UserService> {
        &self.users
    }

    /// Project context.
    #[must_use]
    pub const fn projects(&self) -> &Arc<ProjectService> {
        &self.projects
    }

    /// Membership context.
    #[must_use]
    pub const fn memberships(&self) -> &Arc<MembershipService> {
        &self.memberships
    }

    /// Phase context.
    #[must_use]
    pub const fn phases(&self) -> &Arc<PhaseService> {
        &self.phases
    }

    /// Ticket context.
    #[must_use]
    pub const fn tickets(&self) -> &Arc<TicketService> {
        &self.tickets
    }

    /// Notification outbox.
    #[must_use]
    pub const fn notifications(&self) -> &Arc<NotificationOutbox> {
        &self.notifications
    }

    /// The event bus every context publishes on.
    #[must_use]
    pub const fn bus(&self) -> &Arc<InProcessEventBus<TrackerEvent>> {
        &self.bus
    }

    /// Prometheus text exposition, when metrics are enabled.
    #[must_use]
    pub fn render_metrics(&self) -> Option<String> {
        self.metrics.as_ref().and_then(MetricsServer::render)
    }

    /// Wait until every asynchronous handler job, including the ones they
    /// published in turn, has finished.
    pub async fn wait_idle(&self) {
        self.bus.wait_idle().await;
    }

    /// Aggregated handler outcomes so far.
    #[must_use]
    pub fn stats(&self) -> DispatchSnapshot {
        self.bus.stats()
    }

    /// Drain the worker pool and stop accepting asynchronous work.
    pub async fn shutdown(&self) {
        self.bus.shutdown().await;
        info!(stats = ?self.bus.stats(), "Tracker stopped");
    }
}
