//! Membership context and its invariant enforcer.
//!
//! # Invariants
//!
//! - `OPEN → ACCEPTED` only.
//! - A project with at least one accepted member has at least one accepted
//!   admin. Deleting the sole accepted admin promotes another accepted
//!   member first; demoting the sole accepted admin is rejected.
//! - When the last accepted member leaves, `LastProjectMemberDeleted` follows
//!   the `MembershipDeleted` event and the project context deletes the
//!   project.

use crate::emitter::Emitter;
use crate::error::{Result, TrackerError};
use crate::events::{EventKind, TrackerEvent};
use crate::rows::{ProjectProjection, ProjectRow, UserProjection, UserRow};
use crate::types::{MembershipId, MembershipRole, MembershipState, ProjectId, UserId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use tracker_core::projection::ProjectionStore;
use tracker_core::{BoxFuture, CorrelationContext, Envelope, EventHandler, HandlerError, Outcome};
use tracker_projections::{apply_delete, apply_replace, apply_upsert};

/// A user's membership of a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Identity
    pub id: MembershipId,
    /// Member
    pub user_id: UserId,
    /// Project
    pub project_id: ProjectId,
    /// Invitation state
    pub state: MembershipState,
    /// Role inside the project
    pub role: MembershipRole,
}

impl Membership {
    /// Accepted with the admin role.
    #[must_use]
    pub fn is_accepted_admin(&self) -> bool {
        self.state == MembershipState::Accepted && self.role == MembershipRole::Admin
    }
}

/// Application service of the membership context.
pub struct MembershipService {
    memberships: Mutex<HashMap<MembershipId, Membership>>,
    users: UserProjection,
    projects: ProjectProjection,
    emitter: Emitter,
}

impl MembershipService {
    /// Create an empty membership context.
    #[must_use]
    pub fn new(emitter: Emitter) -> Self {
        Self {
            memberships: Mutex::new(HashMap::new()),
            users: UserProjection::new(),
            projects: ProjectProjection::new(),
            emitter,
        }
    }

    /// Projected users, as seen by this context.
    #[must_use]
    pub const fn users(&self) -> &UserProjection {
        &self.users
    }

    /// Projected projects, as seen by this context.
    #[must_use]
    pub const fn projects(&self) -> &ProjectProjection {
        &self.projects
    }

    /// Invite `user_id` to `project_id` as an open member and publish
    /// `MembershipUnacceptedCreated`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] when the user or project is not projected,
    /// [`TrackerError::Validation`] when the user already has a membership.
    pub async fn invite_member(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        ctx: &CorrelationContext,
    ) -> Result<Membership> {
        if !self.users.exists(&user_id).await? {
            return Err(TrackerError::not_found("User", user_id));
        }
        if !self.projects.exists(&project_id).await? {
            return Err(TrackerError::not_found("Project", project_id));
        }

        let membership = {
            let mut memberships = self.memberships.lock().await;
            if memberships
                .values()
                .any(|m| m.user_id == user_id && m.project_id == project_id)
            {
                return Err(TrackerError::Validation(format!(
                    "user {user_id} already has a membership in project {project_id}"
                )));
            }
            let membership = Membership {
                id: MembershipId::from_uuid(self.emitter.next_id()),
                user_id,
                project_id,
                state: MembershipState::Open,
                role: MembershipRole::Member,
            };
            memberships.insert(membership.id, membership);
            membership
        };

        info!(membership_id = %membership.id, %project_id, correlation_id = %ctx.correlation_id(), "Member invited");
        self.emitter
            .emit(
                TrackerEvent::MembershipUnacceptedCreated {
                    membership_id: membership.id,
                    user_id,
                    project_id,
                },
                ctx,
            )
            .await;
        Ok(membership)
    }

    /// Move a membership to `state`, publishing `MembershipAccepted` on
    /// `OPEN → ACCEPTED`. Requesting the current state is a no-op.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] for an unknown membership,
    /// [`TrackerError::InvalidStateTransition`] for `ACCEPTED → OPEN`.
    pub async fn update_membership_state(
        &self,
        id: MembershipId,
        state: MembershipState,
        ctx: &CorrelationContext,
    ) -> Result<Membership> {
        let membership = {
            let mut memberships = self.memberships.lock().await;
            let membership = memberships
                .get_mut(&id)
                .ok_or_else(|| TrackerError::not_found("Membership", id))?;
            match (membership.state, state) {
                (current, requested) if current == requested => return Ok(*membership),
                (MembershipState::Open, MembershipState::Accepted) => {
                    membership.state = MembershipState::Accepted;
                }
                (from, to) => {
                    return Err(TrackerError::InvalidStateTransition {
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
            }
            *membership
        };

        info!(membership_id = %id, correlation_id = %ctx.correlation_id(), "Membership accepted");
        self.emitter
            .emit(
                TrackerEvent::MembershipAccepted {
                    membership_id: id,
                    user_id: membership.user_id,
                    project_id: membership.project_id,
                },
                ctx,
            )
            .await;
        Ok(membership)
    }

    /// Change a membership's role. Publishes nothing.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] for an unknown membership,
    /// [`TrackerError::AlreadyLastAdmin`] when demoting the project's only
    /// accepted admin.
    pub async fn update_membership_role(
        &self,
        id: MembershipId,
        role: MembershipRole,
        ctx: &CorrelationContext,
    ) -> Result<Membership> {
        let mut memberships = self.memberships.lock().await;
        let current = *memberships
            .get(&id)
            .ok_or_else(|| TrackerError::not_found("Membership", id))?;

        if current.is_accepted_admin()
            && role != MembershipRole::Admin
            && !memberships
                .values()
                .any(|m| m.id != id && m.project_id == current.project_id && m.is_accepted_admin())
        {
            return Err(TrackerError::AlreadyLastAdmin { membership_id: id });
        }

        let membership = memberships
            .get_mut(&id)
            .ok_or_else(|| TrackerError::invariant(format!("membership {id} vanished under lock")))?;
        membership.role = role;
        info!(membership_id = %id, %role, correlation_id = %ctx.correlation_id(), "Membership role updated");
        Ok(*membership)
    }

    /// Delete a membership, enforcing the admin invariant.
    ///
    /// Publishes `MembershipDeleted`, followed by `LastProjectMemberDeleted`
    /// when no accepted member remains in the project.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] for an unknown membership.
    pub async fn delete_membership_by_id(
        &self,
        id: MembershipId,
        ctx: &CorrelationContext,
    ) -> Result<()> {
        let mut events: SmallVec<[TrackerEvent; 2]> = SmallVec::new();
        {
            let mut memberships = self.memberships.lock().await;
            let deleted = memberships
                .remove(&id)
                .ok_or_else(|| TrackerError::not_found("Membership", id))?;
            let was_accepted = deleted.state == MembershipState::Accepted;

            let mut remaining: Vec<&mut Membership> = memberships
                .values_mut()
                .filter(|m| {
                    m.project_id == deleted.project_id && m.state == MembershipState::Accepted
                })
                .collect();
            remaining.sort_by_key(|m| m.id);

            if deleted.is_accepted_admin()
                && !remaining.is_empty()
                && !remaining.iter().any(|m| m.role == MembershipRole::Admin)
            {
                let promoted = &mut remaining[0];
                promoted.role = MembershipRole::Admin;
                info!(
                    membership_id = %promoted.id,
                    project_id = %deleted.project_id,
                    correlation_id = %ctx.correlation_id(),
                    "Member promoted to admin"
                );
            }

            events.push(TrackerEvent::MembershipDeleted {
                membership_id: id,
                user_id: deleted.user_id,
                project_id: deleted.project_id,
                was_accepted,
            });
            if was_accepted && remaining.is_empty() {
                events.push(TrackerEvent::LastProjectMemberDeleted {
                    project_id: deleted.project_id,
                });
            }
        }

        info!(membership_id = %id, correlation_id = %ctx.correlation_id(), "Membership deleted");
        self.emitter.emit_all(events, ctx).await;
        Ok(())
    }

    /// Create the accepted admin membership of a new project's owner and
    /// publish `MembershipAccepted`.
    ///
    /// Returns `None` when the owner already has a membership there.
    pub async fn add_owner(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        ctx: &CorrelationContext,
    ) -> Option<Membership> {
        let membership = {
            let mut memberships = self.memberships.lock().await;
            if memberships
                .values()
                .any(|m| m.user_id == user_id && m.project_id == project_id)
            {
                return None;
            }
            let membership = Membership {
                id: MembershipId::from_uuid(self.emitter.next_id()),
                user_id,
                project_id,
                state: MembershipState::Accepted,
                role: MembershipRole::Admin,
            };
            memberships.insert(membership.id, membership);
            membership
        };

        self.emitter
            .emit(
                TrackerEvent::MembershipAccepted {
                    membership_id: membership.id,
                    user_id,
                    project_id,
                },
                ctx,
            )
            .await;
        Some(membership)
    }

    /// Look a membership up.
    pub async fn membership(&self, id: MembershipId) -> Option<Membership> {
        self.memberships.lock().await.get(&id).copied()
    }

    /// Every membership of `project_id`.
    pub async fn memberships_of_project(&self, project_id: ProjectId) -> Vec<Membership> {
        let mut found: Vec<_> = self
            .memberships
            .lock()
            .await
            .values()
            .filter(|m| m.project_id == project_id)
            .copied()
            .collect();
        found.sort_by_key(|m| m.id);
        found
    }

    async fn memberships_of_user(&self, user_id: UserId) -> Vec<MembershipId> {
        let mut found: Vec<_> = self
            .memberships
            .lock()
            .await
            .values()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.id)
            .collect();
        found.sort();
        found
    }

    async fn purge_project(&self, project_id: ProjectId) -> usize {
        let mut memberships = self.memberships.lock().await;
        let before = memberships.len();
        memberships.retain(|_, m| m.project_id != project_id);
        before - memberships.len()
    }
}

/// Event consumer of the membership context.
pub struct MembershipConsumer {
    service: Arc<MembershipService>,
}

impl MembershipConsumer {
    /// Kinds this consumer is registered for.
    pub const KINDS: [EventKind; 6] = [
        EventKind::UserCreated,
        EventKind::UserPatched,
        EventKind::UserDeleted,
        EventKind::ProjectCreated,
        EventKind::DefaultProjectCreated,
        EventKind::ProjectDeleted,
    ];

    /// Consumer backed by `service`.
    #[must_use]
    pub const fn new(service: Arc<MembershipService>) -> Self {
        Self { service }
    }

    async fn apply(
        &self,
        event: &TrackerEvent,
        ctx: &CorrelationContext,
    ) -> std::result::Result<Outcome, HandlerError> {
        let service = &self.service;
        let outcome = match event {
            TrackerEvent::UserCreated { user_id, email } => {
                let row = UserRow {
                    user_id: *user_id,
                    email: email.clone(),
                };
                apply_upsert("membership.users", &service.users, *user_id, row, ctx).await?
            }
            TrackerEvent::UserPatched { user_id, email } => {
                let row = UserRow {
                    user_id: *user_id,
                    email: email.clone(),
                };
                apply_replace("membership.users", &service.users, *user_id, row, ctx).await?
            }
            TrackerEvent::UserDeleted { user_id } => {
                let mut outcome =
                    apply_delete("membership.users", &service.users, user_id, ctx).await?;
                for id in service.memberships_of_user(*user_id).await {
                    match service.delete_membership_by_id(id, ctx).await {
                        Ok(()) => {}
                        Err(TrackerError::NotFound { .. }) => {
                            outcome = outcome.merge(Outcome::anomaly(format!(
                                "membership {id} deleted concurrently"
                            )));
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                outcome
            }
            TrackerEvent::ProjectCreated {
                project_id,
                owner_id,
            }
            | TrackerEvent::DefaultProjectCreated {
                project_id,
                owner_id,
            } => {
                let row = ProjectRow {
                    project_id: *project_id,
                };
                let projected =
                    apply_upsert("membership.projects", &service.projects, *project_id, row, ctx)
                        .await?;
                match service.add_owner(*owner_id, *project_id, ctx).await {
                    Some(_) => projected,
                    None => projected.merge(Outcome::anomaly(format!(
                        "owner {owner_id} already member of {project_id}"
                    ))),
                }
            }
            TrackerEvent::ProjectDeleted { project_id } => {
                let outcome =
                    apply_delete("membership.projects", &service.projects, project_id, ctx).await?;
                let purged = service.purge_project(*project_id).await;
                if purged > 0 {
                    info!(
                        %project_id,
                        purged,
                        correlation_id = %ctx.correlation_id(),
                        "Memberships of deleted project purged"
                    );
                }
                outcome
            }
            _ => Outcome::skipped("not relevant to memberships"),
        };
        Ok(outcome)
    }
}

impl EventHandler<TrackerEvent> for MembershipConsumer {
    fn name(&self) -> &'static str {
        "membership.consumer"
    }

    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope<TrackerEvent>,
        ctx: CorrelationContext,
    ) -> BoxFuture<'a, std::result::Result<Outcome, HandlerError>> {
        Box::pin(async move { self.apply(envelope.payload(), &ctx).await })
    }
}
