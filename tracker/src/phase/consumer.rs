//! Event consumer of the phase context: project lifecycle and ticket counts.

use super::service::PhaseService;
use crate::events::{EventKind, TrackerEvent};
use crate::rows::ProjectRow;
use std::sync::Arc;
use tracing::info;
use tracker_core::{BoxFuture, CorrelationContext, Envelope, EventHandler, HandlerError, Outcome};
use tracker_projections::{apply_delete, apply_upsert};

/// Keeps the project projection, the default pipeline and every phase's
/// ticket counter up to date.
pub struct PhaseConsumer {
    service: Arc<PhaseService>,
}

impl PhaseConsumer {
    /// Kinds this consumer is registered for.
    pub const KINDS: [EventKind; 6] = [
        EventKind::ProjectCreated,
        EventKind::DefaultProjectCreated,
        EventKind::ProjectDeleted,
        EventKind::TicketCreated,
        EventKind::TicketPhaseUpdated,
        EventKind::TicketDeleted,
    ];

    /// Consumer backed by `service`.
    #[must_use]
    pub const fn new(service: Arc<PhaseService>) -> Self {
        Self { service }
    }

    async fn apply(
        &self,
        event: &TrackerEvent,
        ctx: &CorrelationContext,
    ) -> Result<Outcome, HandlerError> {
        let service = &self.service;
        let outcome = match event {
            TrackerEvent::ProjectCreated { project_id, .. }
            | TrackerEvent::DefaultProjectCreated { project_id, .. } => {
                let row = ProjectRow {
                    project_id: *project_id,
                };
                let projected =
                    apply_upsert("phase.projects", service.projects(), *project_id, row, ctx)
                        .await?;
                projected.merge(service.bootstrap(*project_id, ctx).await?)
            }
            TrackerEvent::ProjectDeleted { project_id } => {
                let outcome =
                    apply_delete("phase.projects", service.projects(), project_id, ctx).await?;
                let dropped = service.drop_project(*project_id).await;
                info!(%project_id, dropped, correlation_id = %ctx.correlation_id(), "Phases of deleted project dropped");
                outcome
            }
            TrackerEvent::TicketCreated { phase_id, .. } => service.ticket_added(*phase_id).await,
            TrackerEvent::TicketPhaseUpdated {
                old_phase_id,
                new_phase_id,
                ..
            } => service.ticket_moved(*old_phase_id, *new_phase_id).await,
            TrackerEvent::TicketDeleted { phase_id, .. } => service.ticket_removed(*phase_id).await?,
            _ => Outcome::skipped("not relevant to phases"),
        };
        Ok(outcome)
    }
}

impl EventHandler<TrackerEvent> for PhaseConsumer {
    fn name(&self) -> &'static str {
        "phase.consumer"
    }

    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope<TrackerEvent>,
        ctx: CorrelationContext,
    ) -> BoxFuture<'a, Result<Outcome, HandlerError>> {
        Box::pin(async move { self.apply(envelope.payload(), &ctx).await })
    }
}
