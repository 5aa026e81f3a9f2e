//! Ticket application service.

use crate::emitter::Emitter;
use crate::error::{Result, TrackerError};
use crate::events::TrackerEvent;
use crate::rows::{MembershipProjection, MembershipRow, PhaseProjection, ProjectProjection};
use crate::types::{MembershipId, PhaseId, ProjectId, TicketId, non_empty};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;
use tracker_core::CorrelationContext;
use tracker_core::projection::ProjectionStore;

/// A unit of work moving through its project's phases.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Identity
    pub id: TicketId,
    /// Owning project
    pub project_id: ProjectId,
    /// Current phase
    pub phase_id: PhaseId,
    /// Title
    pub title: String,
    /// Assigned membership, if any
    pub assignee: Option<MembershipId>,
}

/// Partial update of a ticket. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TicketPatch {
    /// New title
    pub title: Option<String>,
    /// Phase to move to
    pub phase_id: Option<PhaseId>,
    /// `Some(None)` unassigns, `Some(Some(m))` assigns `m`
    pub assignee: Option<Option<MembershipId>>,
}

impl TicketPatch {
    /// Rename the ticket.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Move the ticket to `phase_id`.
    #[must_use]
    pub const fn move_to(mut self, phase_id: PhaseId) -> Self {
        self.phase_id = Some(phase_id);
        self
    }

    /// Assign the ticket to `membership_id`.
    #[must_use]
    pub const fn assign(mut self, membership_id: MembershipId) -> Self {
        self.assignee = Some(Some(membership_id));
        self
    }

    /// Remove the current assignee.
    #[must_use]
    pub const fn unassign(mut self) -> Self {
        self.assignee = Some(None);
        self
    }
}

/// Application service of the ticket context.
///
/// Validation reads this context's own projections only: projects,
/// accepted memberships and the phase chain.
pub struct TicketService {
    tickets: Mutex<HashMap<TicketId, Ticket>>,
    projects: ProjectProjection,
    memberships: MembershipProjection,
    phases: PhaseProjection,
    emitter: Emitter,
}

impl TicketService {
    /// Create an empty ticket context.
    #[must_use]
    pub fn new(emitter: Emitter) -> Self {
        Self {
            tickets: Mutex::new(HashMap::new()),
            projects: ProjectProjection::new(),
            memberships: MembershipProjection::new(),
            phases: PhaseProjection::new(),
            emitter,
        }
    }

    /// Projected projects, as seen by this context.
    #[must_use]
    pub const fn projects(&self) -> &ProjectProjection {
        &self.projects
    }

    /// Projected accepted memberships, as seen by this context.
    #[must_use]
    pub const fn memberships(&self) -> &MembershipProjection {
        &self.memberships
    }

    /// Projected phase chain, as seen by this context.
    #[must_use]
    pub const fn phases(&self) -> &PhaseProjection {
        &self.phases
    }

    /// Create a ticket in the head phase of `project_id` and publish
    /// `TicketCreated`.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::Validation`] for a blank title
    /// - [`TrackerError::NotFound`] when the project is not projected
    /// - [`TrackerError::Invariant`] when the projected chain has no head or
    ///   more than one
    pub async fn add_ticket(
        &self,
        project_id: ProjectId,
        title: &str,
        ctx: &CorrelationContext,
    ) -> Result<Ticket> {
        let title = non_empty("title", title)?;
        if !self.projects.exists(&project_id).await? {
            return Err(TrackerError::not_found("Project", project_id));
        }
        let phase_id = self.head_phase(project_id).await?;

        let ticket = Ticket {
            id: TicketId::from_uuid(self.emitter.next_id()),
            project_id,
            phase_id,
            title,
            assignee: None,
        };
        self.tickets.lock().await.insert(ticket.id, ticket.clone());

        info!(
            ticket_id = %ticket.id,
            %project_id,
            %phase_id,
            correlation_id = %ctx.correlation_id(),
            "Ticket created"
        );
        self.emitter
            .emit(
                TrackerEvent::TicketCreated {
                    ticket_id: ticket.id,
                    project_id,
                    phase_id,
                },
                ctx,
            )
            .await;
        Ok(ticket)
    }

    /// Apply `patch` to a ticket.
    ///
    /// Every field is validated before anything changes. A phase change
    /// publishes `TicketPhaseUpdated`; an assignee change publishes
    /// `TicketAssigned` or `TicketUnassigned`. Fields equal to the current
    /// value are ignored.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::NotFound`] for an unknown ticket or phase
    /// - [`TrackerError::Validation`] for a blank title
    /// - [`TrackerError::UnrelatedPhase`] when the phase belongs to another
    ///   project
    /// - [`TrackerError::InvalidProjectMembers`] when the assignee is not an
    ///   accepted member of the ticket's project
    pub async fn patch_ticket(
        &self,
        id: TicketId,
        patch: TicketPatch,
        ctx: &CorrelationContext,
    ) -> Result<Ticket> {
        let title = patch
            .title
            .as_deref()
            .map(|title| non_empty("title", title))
            .transpose()?;
        let current = self
            .ticket(id)
            .await
            .ok_or_else(|| TrackerError::not_found("Ticket", id))?;

        let phase_id = match patch.phase_id {
            Some(phase_id) if phase_id != current.phase_id => {
                self.require_phase(phase_id, current.project_id).await?;
                Some(phase_id)
            }
            _ => None,
        };
        let assignee = match patch.assignee {
            Some(Some(membership_id)) if current.assignee != Some(membership_id) => Some(Some(
                self.require_member(membership_id, current.project_id).await?,
            )),
            Some(None) if current.assignee.is_some() => Some(None),
            _ => None,
        };

        let mut events: SmallVec<[TrackerEvent; 2]> = SmallVec::new();
        let ticket = {
            let mut tickets = self.tickets.lock().await;
            let ticket = tickets
                .get_mut(&id)
                .ok_or_else(|| TrackerError::not_found("Ticket", id))?;
            if let Some(title) = title {
                ticket.title = title;
            }
            if let Some(new_phase_id) = phase_id {
                events.push(TrackerEvent::TicketPhaseUpdated {
                    ticket_id: id,
                    old_phase_id: ticket.phase_id,
                    new_phase_id,
                });
                ticket.phase_id = new_phase_id;
            }
            match assignee {
                Some(Some(member)) => {
                    events.push(TrackerEvent::TicketAssigned {
                        ticket_id: id,
                        membership_id: member.membership_id,
                        user_id: member.user_id,
                        project_id: member.project_id,
                    });
                    ticket.assignee = Some(member.membership_id);
                }
                Some(None) => {
                    if let Some(membership_id) = ticket.assignee.take() {
                        events.push(TrackerEvent::TicketUnassigned {
                            ticket_id: id,
                            membership_id,
                        });
                    }
                }
                None => {}
            }
            ticket.clone()
        };

        info!(ticket_id = %id, changes = events.len(), correlation_id = %ctx.correlation_id(), "Ticket patched");
        self.emitter.emit_all(events, ctx).await;
        Ok(ticket)
    }

    /// Delete a ticket and publish `TicketDeleted`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] for an unknown ticket.
    pub async fn delete_ticket_by_id(&self, id: TicketId, ctx: &CorrelationContext) -> Result<()> {
        let ticket = self
            .tickets
            .lock()
            .await
            .remove(&id)
            .ok_or_else(|| TrackerError::not_found("Ticket", id))?;

        info!(ticket_id = %id, correlation_id = %ctx.correlation_id(), "Ticket deleted");
        self.emitter
            .emit(
                TrackerEvent::TicketDeleted {
                    ticket_id: id,
                    phase_id: ticket.phase_id,
                },
                ctx,
            )
            .await;
        Ok(())
    }

    /// Look a ticket up.
    pub async fn ticket(&self, id: TicketId) -> Option<Ticket> {
        self.tickets.lock().await.get(&id).cloned()
    }

    /// Tickets of `project_id`, ordered by id.
    pub async fn tickets_of_project(&self, project_id: ProjectId) -> Vec<Ticket> {
        let mut found: Vec<_> = self
            .tickets
            .lock()
            .await
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        found.sort_by_key(|t| t.id);
        found
    }

    /// Clear `membership_id` from every ticket it is assigned to and publish
    /// one `TicketUnassigned` per ticket.
    pub(crate) async fn unassign_member(
        &self,
        membership_id: MembershipId,
        ctx: &CorrelationContext,
    ) -> usize {
        let mut unassigned: Vec<TicketId> = {
            let mut tickets = self.tickets.lock().await;
            tickets
                .values_mut()
                .filter(|t| t.assignee == Some(membership_id))
                .map(|t| {
                    t.assignee = None;
                    t.id
                })
                .collect()
        };
        unassigned.sort();

        let count = unassigned.len();
        if count > 0 {
            info!(%membership_id, count, correlation_id = %ctx.correlation_id(), "Tickets of removed member unassigned");
        }
        self.emitter
            .emit_all(
                unassigned
                    .into_iter()
                    .map(|ticket_id| TrackerEvent::TicketUnassigned {
                        ticket_id,
                        membership_id,
                    }),
                ctx,
            )
            .await;
        count
    }

    /// Forget every ticket of a deleted project. Publishes nothing.
    pub(crate) async fn purge_project(&self, project_id: ProjectId) -> usize {
        let mut tickets = self.tickets.lock().await;
        let before = tickets.len();
        tickets.retain(|_, t| t.project_id != project_id);
        before - tickets.len()
    }

    async fn head_phase(&self, project_id: ProjectId) -> Result<PhaseId> {
        let heads = self
            .phases
            .find(move |row| row.project_id == project_id && row.previous_phase_id.is_none())
            .await?;
        match heads.as_slice() {
            [head] => Ok(head.phase_id),
            [] => Err(TrackerError::invariant(format!(
                "project {project_id} has no head phase"
            ))),
            many => Err(TrackerError::invariant(format!(
                "project {project_id} has {} head phases",
                many.len()
            ))),
        }
    }

    async fn require_phase(&self, phase_id: PhaseId, project_id: ProjectId) -> Result<()> {
        let row = self
            .phases
            .get(&phase_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Phase", phase_id))?;
        if row.project_id == project_id {
            Ok(())
        } else {
            Err(TrackerError::UnrelatedPhase {
                phase_id,
                project_id,
            })
        }
    }

    async fn require_member(
        &self,
        membership_id: MembershipId,
        project_id: ProjectId,
    ) -> Result<MembershipRow> {
        self.memberships
            .get(&membership_id)
            .await?
            .filter(|row| row.project_id == project_id)
            .ok_or(TrackerError::InvalidProjectMembers {
                membership_id,
                project_id,
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::rows::{PhaseRow, ProjectRow};
    use crate::testkit::recording_emitter;
    use crate::types::UserId;
    use std::sync::Arc;
    use tracker_testing::EventRecorder;

    struct Fixture {
        service: TicketService,
        recorder: Arc<EventRecorder<TrackerEvent>>,
        emitter: Emitter,
        project_id: ProjectId,
        backlog: PhaseId,
        doing: PhaseId,
    }

    async fn project(service: &TicketService, emitter: &Emitter) -> (ProjectId, PhaseId, PhaseId) {
        let project_id = ProjectId::from_uuid(emitter.next_id());
        let backlog = PhaseId::from_uuid(emitter.next_id());
        let doing = PhaseId::from_uuid(emitter.next_id());
        service
            .projects
            .upsert(project_id, ProjectRow { project_id })
            .await
            .unwrap();
        for (phase_id, previous_phase_id) in [(backlog, None), (doing, Some(backlog))] {
            service
                .phases
                .upsert(
                    phase_id,
                    PhaseRow {
                        phase_id,
                        previous_phase_id,
                        project_id,
                    },
                )
                .await
                .unwrap();
        }
        (project_id, backlog, doing)
    }

    async fn fixture() -> Fixture {
        let (emitter, recorder) = recording_emitter().await;
        let service = TicketService::new(emitter.clone());
        let (project_id, backlog, doing) = project(&service, &emitter).await;
        Fixture {
            service,
            recorder,
            emitter,
            project_id,
            backlog,
            doing,
        }
    }

    impl Fixture {
        async fn member(&self, project_id: ProjectId) -> MembershipRow {
            let row = MembershipRow {
                membership_id: MembershipId::from_uuid(self.emitter.next_id()),
                user_id: UserId::from_uuid(self.emitter.next_id()),
                project_id,
            };
            self.service
                .memberships
                .upsert(row.membership_id, row)
                .await
                .unwrap();
            row
        }
    }

    #[tokio::test]
    async fn new_ticket_enters_at_the_head_phase() {
        let f = fixture().await;
        let ctx = f.emitter.request_context();

        let ticket = f.service.add_ticket(f.project_id, "Write docs", &ctx).await.unwrap();

        assert_eq!(ticket.phase_id, f.backlog);
        assert_eq!(
            f.recorder.events(),
            vec![TrackerEvent::TicketCreated {
                ticket_id: ticket.id,
                project_id: f.project_id,
                phase_id: f.backlog,
            }]
        );
    }

    #[tokio::test]
    async fn unknown_project_is_rejected() {
        let f = fixture().await;
        let ctx = f.emitter.request_context();
        let unknown = ProjectId::from_uuid(f.emitter.next_id());

        let result = f.service.add_ticket(unknown, "Orphan", &ctx).await;

        assert!(matches!(result, Err(TrackerError::NotFound { entity: "Project", .. })));
        assert!(f.recorder.is_empty());
    }

    #[tokio::test]
    async fn missing_or_forked_head_is_an_invariant_violation() {
        let f = fixture().await;
        let ctx = f.emitter.request_context();
        let bare = ProjectId::from_uuid(f.emitter.next_id());
        f.service
            .projects
            .upsert(bare, ProjectRow { project_id: bare })
            .await
            .unwrap();

        let no_head = f.service.add_ticket(bare, "Nowhere", &ctx).await.unwrap_err();
        assert!(matches!(no_head, TrackerError::Invariant(_)));

        let second_head = PhaseId::from_uuid(f.emitter.next_id());
        f.service
            .phases
            .upsert(
                second_head,
                PhaseRow {
                    phase_id: second_head,
                    previous_phase_id: None,
                    project_id: f.project_id,
                },
            )
            .await
            .unwrap();
        let forked = f.service.add_ticket(f.project_id, "Fork", &ctx).await.unwrap_err();
        assert!(matches!(forked, TrackerError::Invariant(_)));
        assert!(f.recorder.is_empty());
    }

    #[tokio::test]
    async fn moving_to_a_foreign_phase_is_unrelated() {
        let f = fixture().await;
        let ctx = f.emitter.request_context();
        let (_, foreign, _) = project(&f.service, &f.emitter).await;
        let ticket = f.service.add_ticket(f.project_id, "Stay", &ctx).await.unwrap();
        f.recorder.clear();

        let result = f
            .service
            .patch_ticket(ticket.id, TicketPatch::default().move_to(foreign), &ctx)
            .await;

        assert_eq!(
            result,
            Err(TrackerError::UnrelatedPhase {
                phase_id: foreign,
                project_id: f.project_id,
            })
        );
        assert!(f.recorder.is_empty());
        assert_eq!(f.service.ticket(ticket.id).await.unwrap().phase_id, f.backlog);
    }

    #[tokio::test]
    async fn assigning_a_foreign_member_changes_nothing() {
        let f = fixture().await;
        let ctx = f.emitter.request_context();
        let (other_project, _, _) = project(&f.service, &f.emitter).await;
        let outsider = f.member(other_project).await;
        let ticket = f.service.add_ticket(f.project_id, "Guarded", &ctx).await.unwrap();
        f.recorder.clear();

        // The move is valid but must not be applied alongside the bad assignee.
        let patch = TicketPatch::default()
            .move_to(f.doing)
            .assign(outsider.membership_id);
        let result = f.service.patch_ticket(ticket.id, patch, &ctx).await;

        assert_eq!(
            result,
            Err(TrackerError::InvalidProjectMembers {
                membership_id: outsider.membership_id,
                project_id: f.project_id,
            })
        );
        assert!(f.recorder.is_empty());
        assert_eq!(f.service.ticket(ticket.id).await.unwrap(), ticket);
    }

    #[tokio::test]
    async fn patch_publishes_one_event_per_change() {
        let f = fixture().await;
        let ctx = f.emitter.request_context();
        let member = f.member(f.project_id).await;
        let ticket = f.service.add_ticket(f.project_id, "Ship", &ctx).await.unwrap();
        f.recorder.clear();

        let patch = TicketPatch::default()
            .title("Ship it")
            .move_to(f.doing)
            .assign(member.membership_id);
        let patched = f.service.patch_ticket(ticket.id, patch, &ctx).await.unwrap();

        assert_eq!(patched.title, "Ship it");
        assert_eq!(patched.assignee, Some(member.membership_id));
        assert_eq!(
            f.recorder.events(),
            vec![
                TrackerEvent::TicketPhaseUpdated {
                    ticket_id: ticket.id,
                    old_phase_id: f.backlog,
                    new_phase_id: f.doing,
                },
                TrackerEvent::TicketAssigned {
                    ticket_id: ticket.id,
                    membership_id: member.membership_id,
                    user_id: member.user_id,
                    project_id: f.project_id,
                },
            ]
        );

        f.recorder.clear();
        let unchanged = TicketPatch::default()
            .move_to(f.doing)
            .assign(member.membership_id);
        f.service.patch_ticket(ticket.id, unchanged, &ctx).await.unwrap();
        assert!(f.recorder.is_empty());

        f.service
            .patch_ticket(ticket.id, TicketPatch::default().unassign(), &ctx)
            .await
            .unwrap();
        assert_eq!(
            f.recorder.events(),
            vec![TrackerEvent::TicketUnassigned {
                ticket_id: ticket.id,
                membership_id: member.membership_id,
            }]
        );
    }

    #[tokio::test]
    async fn delete_reports_the_phase_the_ticket_left() {
        let f = fixture().await;
        let ctx = f.emitter.request_context();
        let ticket = f.service.add_ticket(f.project_id, "Gone", &ctx).await.unwrap();
        f.service
            .patch_ticket(ticket.id, TicketPatch::default().move_to(f.doing), &ctx)
            .await
            .unwrap();
        f.recorder.clear();

        f.service.delete_ticket_by_id(ticket.id, &ctx).await.unwrap();

        assert_eq!(
            f.recorder.events(),
            vec![TrackerEvent::TicketDeleted {
                ticket_id: ticket.id,
                phase_id: f.doing,
            }]
        );
        assert!(f.service.ticket(ticket.id).await.is_none());
        assert!(matches!(
            f.service.delete_ticket_by_id(ticket.id, &ctx).await,
            Err(TrackerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn removed_member_is_unassigned_everywhere() {
        let f = fixture().await;
        let ctx = f.emitter.request_context();
        let member = f.member(f.project_id).await;
        for title in ["One", "Two"] {
            let ticket = f.service.add_ticket(f.project_id, title, &ctx).await.unwrap();
            f.service
                .patch_ticket(ticket.id, TicketPatch::default().assign(member.membership_id), &ctx)
                .await
                .unwrap();
        }
        f.recorder.clear();

        let count = f.service.unassign_member(member.membership_id, &ctx).await;

        assert_eq!(count, 2);
        assert_eq!(f.recorder.event_types(), vec!["TicketUnassigned.v1"; 2]);
        assert!(
            f.service
                .tickets_of_project(f.project_id)
                .await
                .iter()
                .all(|t| t.assignee.is_none())
        );
    }
}
