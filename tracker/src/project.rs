//! Project context: owns projects, reacts to user lifecycle and to the
//! disappearance of a project's last member.

use crate::emitter::Emitter;
use crate::error::{Result, TrackerError};
use crate::events::{EventKind, TrackerEvent};
use crate::rows::{UserProjection, UserRow};
use crate::types::{ProjectId, UserId, non_empty};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use tracker_core::projection::ProjectionStore;
use tracker_core::{BoxFuture, CorrelationContext, Envelope, EventHandler, HandlerError, Outcome};
use tracker_projections::{apply_delete, apply_replace, apply_upsert};

/// A project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Identity
    pub id: ProjectId,
    /// Creating user
    pub owner_id: UserId,
    /// Display name
    pub name: String,
}

/// Application service of the project context.
pub struct ProjectService {
    projects: Mutex<HashMap<ProjectId, Project>>,
    users: UserProjection,
    emitter: Emitter,
    default_project_name: String,
}

impl ProjectService {
    /// Create an empty project context.
    #[must_use]
    pub fn new(emitter: Emitter, default_project_name: impl Into<String>) -> Self {
        Self {
            projects: Mutex::new(HashMap::new()),
            users: UserProjection::new(),
            emitter,
            default_project_name: default_project_name.into(),
        }
    }

    /// Projected users, as seen by this context.
    #[must_use]
    pub const fn users(&self) -> &UserProjection {
        &self.users
    }

    /// Create a project owned by `owner_id` and publish `ProjectCreated`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Validation`] for a blank name,
    /// [`TrackerError::NotFound`] when the owner is not (yet) projected.
    pub async fn create_project(
        &self,
        owner_id: UserId,
        name: &str,
        ctx: &CorrelationContext,
    ) -> Result<Project> {
        let name = non_empty("name", name)?;
        if !self.users.exists(&owner_id).await? {
            return Err(TrackerError::not_found("User", owner_id));
        }
        let project = self.insert(owner_id, name).await;

        info!(project_id = %project.id, owner_id = %owner_id, correlation_id = %ctx.correlation_id(), "Project created");
        self.emitter
            .emit(
                TrackerEvent::ProjectCreated {
                    project_id: project.id,
                    owner_id,
                },
                ctx,
            )
            .await;
        Ok(project)
    }

    /// Create the personal project of a newly registered user and publish
    /// `DefaultProjectCreated`.
    pub async fn create_default_project(
        &self,
        owner_id: UserId,
        ctx: &CorrelationContext,
    ) -> Project {
        let project = self
            .insert(owner_id, self.default_project_name.clone())
            .await;

        info!(project_id = %project.id, owner_id = %owner_id, correlation_id = %ctx.correlation_id(), "Default project created");
        self.emitter
            .emit(
                TrackerEvent::DefaultProjectCreated {
                    project_id: project.id,
                    owner_id,
                },
                ctx,
            )
            .await;
        project
    }

    async fn insert(&self, owner_id: UserId, name: String) -> Project {
        let project = Project {
            id: ProjectId::from_uuid(self.emitter.next_id()),
            owner_id,
            name,
        };
        self.projects
            .lock()
            .await
            .insert(project.id, project.clone());
        project
    }

    /// Remove a project and publish `ProjectDeleted`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] for an unknown project.
    pub async fn delete_project(&self, id: ProjectId, ctx: &CorrelationContext) -> Result<()> {
        self.projects
            .lock()
            .await
            .remove(&id)
            .ok_or_else(|| TrackerError::not_found("Project", id))?;

        info!(project_id = %id, correlation_id = %ctx.correlation_id(), "Project deleted");
        self.emitter
            .emit(TrackerEvent::ProjectDeleted { project_id: id }, ctx)
            .await;
        Ok(())
    }

    /// Look a project up.
    pub async fn project(&self, id: ProjectId) -> Option<Project> {
        self.projects.lock().await.get(&id).cloned()
    }

    /// Projects owned by `owner_id`, ordered by id.
    pub async fn projects_of(&self, owner_id: UserId) -> Vec<Project> {
        let mut owned: Vec<_> = self
            .projects
            .lock()
            .await
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by_key(|p| p.id);
        owned
    }
}

/// Event consumer of the project context.
pub struct ProjectConsumer {
    service: Arc<ProjectService>,
}

impl ProjectConsumer {
    /// Kinds this consumer is registered for.
    pub const KINDS: [EventKind; 4] = [
        EventKind::UserCreated,
        EventKind::UserPatched,
        EventKind::UserDeleted,
        EventKind::LastProjectMemberDeleted,
    ];

    /// Consumer backed by `service`.
    #[must_use]
    pub const fn new(service: Arc<ProjectService>) -> Self {
        Self { service }
    }

    async fn apply(
        &self,
        event: &TrackerEvent,
        ctx: &CorrelationContext,
    ) -> std::result::Result<Outcome, HandlerError> {
        let users = &self.service.users;
        let outcome = match event {
            TrackerEvent::UserCreated { user_id, email } => {
                let row = UserRow {
                    user_id: *user_id,
                    email: email.clone(),
                };
                let projected = apply_upsert("project.users", users, *user_id, row, ctx).await?;
                if projected.is_anomaly() && !self.service.projects_of(*user_id).await.is_empty() {
                    // Duplicate delivery: the default project already exists.
                    return Ok(projected);
                }
                self.service.create_default_project(*user_id, ctx).await;
                projected
            }
            TrackerEvent::UserPatched { user_id, email } => {
                let row = UserRow {
                    user_id: *user_id,
                    email: email.clone(),
                };
                apply_replace("project.users", users, *user_id, row, ctx).await?
            }
            TrackerEvent::UserDeleted { user_id } => {
                apply_delete("project.users", users, user_id, ctx).await?
            }
            TrackerEvent::LastProjectMemberDeleted { project_id } => {
                match self.service.delete_project(*project_id, ctx).await {
                    Ok(()) => Outcome::Applied,
                    Err(TrackerError::NotFound { .. }) => {
                        Outcome::anomaly(format!("project {project_id} already gone"))
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            _ => Outcome::skipped("not relevant to projects"),
        };
        Ok(outcome)
    }
}

impl EventHandler<TrackerEvent> for ProjectConsumer {
    fn name(&self) -> &'static str {
        "project.consumer"
    }

    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope<TrackerEvent>,
        ctx: CorrelationContext,
    ) -> BoxFuture<'a, std::result::Result<Outcome, HandlerError>> {
        Box::pin(async move { self.apply(envelope.payload(), &ctx).await })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::testkit::recording_emitter;

    #[tokio::test]
    async fn user_created_projects_the_user_and_creates_default_project() {
        let (emitter, recorder) = recording_emitter().await;
        let service = Arc::new(ProjectService::new(emitter.clone(), "Personal"));
        let consumer = ProjectConsumer::new(Arc::clone(&service));
        let ctx = emitter.request_context();
        let user_id = UserId::from_uuid(emitter.next_id());
        let event = TrackerEvent::UserCreated {
            user_id,
            email: "a@b.c".into(),
        };

        assert_eq!(consumer.apply(&event, &ctx).await.unwrap(), Outcome::Applied);
        // Redelivery neither duplicates the row nor the project.
        assert!(consumer.apply(&event, &ctx).await.unwrap().is_anomaly());

        assert!(service.users().exists(&user_id).await.unwrap());
        let owned = service.projects_of(user_id).await;
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].name, "Personal");
        assert_eq!(recorder.event_types(), vec!["DefaultProjectCreated.v1"]);
    }

    #[tokio::test]
    async fn create_project_requires_projected_owner() {
        let (emitter, recorder) = recording_emitter().await;
        let service = ProjectService::new(emitter.clone(), "Personal");
        let ctx = emitter.request_context();
        let owner = UserId::from_uuid(emitter.next_id());

        let missing = service.create_project(owner, "Apollo", &ctx).await;
        assert!(matches!(missing, Err(TrackerError::NotFound { .. })));

        service
            .users()
            .upsert(
                owner,
                UserRow {
                    user_id: owner,
                    email: "o@x.io".into(),
                },
            )
            .await
            .unwrap();
        let project = service.create_project(owner, "Apollo", &ctx).await.unwrap();

        assert_eq!(project.name, "Apollo");
        assert_eq!(recorder.event_types(), vec!["ProjectCreated.v1"]);
    }

    #[tokio::test]
    async fn last_member_deleted_removes_the_project_once() {
        let (emitter, recorder) = recording_emitter().await;
        let service = Arc::new(ProjectService::new(emitter.clone(), "Personal"));
        let consumer = ProjectConsumer::new(Arc::clone(&service));
        let ctx = emitter.request_context();
        let project = service
            .create_default_project(UserId::from_uuid(emitter.next_id()), &ctx)
            .await;
        let event = TrackerEvent::LastProjectMemberDeleted {
            project_id: project.id,
        };

        assert_eq!(consumer.apply(&event, &ctx).await.unwrap(), Outcome::Applied);
        assert!(consumer.apply(&event, &ctx).await.unwrap().is_anomaly());
        assert!(service.project(project.id).await.is_none());
        assert_eq!(
            recorder.event_types(),
            vec!["DefaultProjectCreated.v1", "ProjectDeleted.v1"]
        );
    }
}
