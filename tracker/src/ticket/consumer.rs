//! Event consumers of the ticket context.
//!
//! The phase projection is registered synchronously: a ticket created right
//! after a structural phase change must see the new head.

use super::service::TicketService;
use crate::events::{EventKind, TrackerEvent};
use crate::rows::{MembershipRow, PhaseRow, ProjectRow};
use std::sync::Arc;
use tracing::{debug, info};
use tracker_core::projection::ProjectionStore;
use tracker_core::{BoxFuture, CorrelationContext, Envelope, EventHandler, HandlerError, Outcome};
use tracker_projections::{apply_delete, apply_replace, apply_upsert};

/// Mirrors the phase chain into the ticket context's phase projection.
pub struct TicketPhaseProjection {
    service: Arc<TicketService>,
}

impl TicketPhaseProjection {
    /// Kinds this projection is registered for, synchronously.
    pub const KINDS: [EventKind; 3] = [
        EventKind::PhaseCreated,
        EventKind::PhasePositionUpdated,
        EventKind::PhaseDeleted,
    ];

    /// Projection backed by `service`'s phase store.
    #[must_use]
    pub const fn new(service: Arc<TicketService>) -> Self {
        Self { service }
    }

    async fn apply(
        &self,
        event: &TrackerEvent,
        ctx: &CorrelationContext,
    ) -> Result<Outcome, HandlerError> {
        let phases = self.service.phases();
        let outcome = match event {
            TrackerEvent::PhaseCreated {
                phase_id,
                project_id,
                previous_phase_id,
            } => {
                let row = PhaseRow {
                    phase_id: *phase_id,
                    previous_phase_id: *previous_phase_id,
                    project_id: *project_id,
                };
                apply_upsert("ticket.phases", phases, *phase_id, row, ctx).await?
            }
            TrackerEvent::PhasePositionUpdated {
                phase_id,
                project_id,
                previous_phase_id,
            } => {
                let row = PhaseRow {
                    phase_id: *phase_id,
                    previous_phase_id: *previous_phase_id,
                    project_id: *project_id,
                };
                apply_replace("ticket.phases", phases, *phase_id, row, ctx).await?
            }
            TrackerEvent::PhaseDeleted { phase_id, .. } => {
                let deleted = *phase_id;
                let removed = phases.get(&deleted).await?;
                let outcome = apply_delete("ticket.phases", phases, &deleted, ctx).await?;
                if let Some(removed) = removed {
                    // The successor now follows the deleted phase's predecessor.
                    let predecessor = removed.previous_phase_id;
                    let relinked = phases
                        .update_where(
                            move |row| row.previous_phase_id == Some(deleted),
                            move |row| row.previous_phase_id = predecessor,
                        )
                        .await?;
                    debug!(phase_id = %deleted, relinked, "Successor relinked");
                }
                outcome
            }
            _ => Outcome::skipped("not a phase event"),
        };
        Ok(outcome)
    }
}

impl EventHandler<TrackerEvent> for TicketPhaseProjection {
    fn name(&self) -> &'static str {
        "ticket.phase_projection"
    }

    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope<TrackerEvent>,
        ctx: CorrelationContext,
    ) -> BoxFuture<'a, Result<Outcome, HandlerError>> {
        Box::pin(async move { self.apply(envelope.payload(), &ctx).await })
    }
}

/// Keeps the project and membership projections of the ticket context up to
/// date, and reacts to removed projects and members.
pub struct TicketConsumer {
    service: Arc<TicketService>,
}

impl TicketConsumer {
    /// Kinds this consumer is registered for.
    pub const KINDS: [EventKind; 5] = [
        EventKind::ProjectCreated,
        EventKind::DefaultProjectCreated,
        EventKind::ProjectDeleted,
        EventKind::MembershipAccepted,
        EventKind::MembershipDeleted,
    ];

    /// Consumer backed by `service`.
    #[must_use]
    pub const fn new(service: Arc<TicketService>) -> Self {
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
                apply_upsert("ticket.projects", service.projects(), *project_id, row, ctx).await?
            }
            TrackerEvent::ProjectDeleted { project_id } => {
                let project_id = *project_id;
                let outcome =
                    apply_delete("ticket.projects", service.projects(), &project_id, ctx).await?;
                let tickets = service.purge_project(project_id).await;
                let phases = service
                    .phases()
                    .delete_where(move |row| row.project_id == project_id)
                    .await?;
                let members = service
                    .memberships()
                    .delete_where(move |row| row.project_id == project_id)
                    .await?;
                info!(
                    %project_id,
                    tickets,
                    phases,
                    members,
                    correlation_id = %ctx.correlation_id(),
                    "Ticket context purged for deleted project"
                );
                outcome
            }
            TrackerEvent::MembershipAccepted {
                membership_id,
                user_id,
                project_id,
            } => {
                let row = MembershipRow {
                    membership_id: *membership_id,
                    user_id: *user_id,
                    project_id: *project_id,
                };
                apply_upsert("ticket.memberships", service.memberships(), *membership_id, row, ctx)
                    .await?
            }
            TrackerEvent::MembershipDeleted {
                membership_id,
                was_accepted,
                ..
            } => {
                let outcome = if *was_accepted {
                    apply_delete("ticket.memberships", service.memberships(), membership_id, ctx)
                        .await?
                } else {
                    Outcome::skipped("membership was never accepted")
                };
                service.unassign_member(*membership_id, ctx).await;
                outcome
            }
            _ => Outcome::skipped("not relevant to tickets"),
        };
        Ok(outcome)
    }
}

impl EventHandler<TrackerEvent> for TicketConsumer {
    fn name(&self) -> &'static str {
        "ticket.consumer"
    }

    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope<TrackerEvent>,
        ctx: CorrelationContext,
    ) -> BoxFuture<'a, Result<Outcome, HandlerError>> {
        Box::pin(async move { self.apply(envelope.payload(), &ctx).await })
    }
}
