//! Notification context: an outbox of messages addressed to users.
//!
//! Transport is not modelled. Notifications are appended to an in-memory
//! outbox and logged; the recipient's address comes from this context's own
//! user projection.

use crate::emitter::Emitter;
use crate::events::{EventKind, TrackerEvent};
use crate::rows::{UserProjection, UserRow};
use crate::types::{MembershipId, NotificationId, ProjectId, TicketId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use tracker_core::projection::ProjectionStore;
use tracker_core::{BoxFuture, CorrelationContext, Envelope, EventHandler, HandlerError, Outcome, Uuid};
use tracker_projections::{apply_delete, apply_replace, apply_upsert};

/// What a notification is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// The recipient was invited to a project.
    Invitation {
        /// Project invited to
        project_id: ProjectId,
        /// Open membership to accept
        membership_id: MembershipId,
    },
    /// A ticket was assigned to the recipient.
    Assignment {
        /// Assigned ticket
        ticket_id: TicketId,
        /// Ticket's project
        project_id: ProjectId,
    },
}

/// A message queued for a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Identity
    pub id: NotificationId,
    /// Addressee
    pub recipient: UserId,
    /// Address at the time of queueing
    pub email: String,
    /// Subject matter
    pub kind: NotificationKind,
    /// Correlation id of the event that caused it
    pub correlation_id: Uuid,
}

/// In-memory outbox plus the user projection it addresses from.
pub struct NotificationOutbox {
    sent: Mutex<Vec<Notification>>,
    users: UserProjection,
    emitter: Emitter,
}

impl NotificationOutbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new(emitter: Emitter) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            users: UserProjection::new(),
            emitter,
        }
    }

    /// Projected users, as seen by this context.
    #[must_use]
    pub const fn users(&self) -> &UserProjection {
        &self.users
    }

    /// Every notification queued so far, oldest first.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    /// Notifications queued for `recipient`, oldest first.
    pub async fn notifications_for(&self, recipient: UserId) -> Vec<Notification> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect()
    }

    async fn queue(
        &self,
        recipient: UserId,
        kind: NotificationKind,
        ctx: &CorrelationContext,
    ) -> Result<Outcome, HandlerError> {
        let Some(UserRow { email, .. }) = self.users.get(&recipient).await? else {
            return Ok(Outcome::anomaly(format!(
                "notification.users: no address for user {recipient}"
            )));
        };
        let notification = Notification {
            id: NotificationId::from_uuid(self.emitter.next_id()),
            recipient,
            email,
            kind,
            correlation_id: ctx.correlation_id(),
        };
        info!(
            notification_id = %notification.id,
            %recipient,
            email = %notification.email,
            kind = ?notification.kind,
            correlation_id = %notification.correlation_id,
            "Notification queued"
        );
        self.sent.lock().await.push(notification);
        Ok(Outcome::Applied)
    }
}

/// Event consumer of the notification context.
pub struct NotificationConsumer {
    outbox: Arc<NotificationOutbox>,
}

impl NotificationConsumer {
    /// Kinds this consumer is registered for.
    pub const KINDS: [EventKind; 5] = [
        EventKind::UserCreated,
        EventKind::UserPatched,
        EventKind::UserDeleted,
        EventKind::MembershipUnacceptedCreated,
        EventKind::TicketAssigned,
    ];

    /// Consumer queueing into `outbox`.
    #[must_use]
    pub const fn new(outbox: Arc<NotificationOutbox>) -> Self {
        Self { outbox }
    }

    async fn apply(
        &self,
        event: &TrackerEvent,
        ctx: &CorrelationContext,
    ) -> Result<Outcome, HandlerError> {
        let outbox = &self.outbox;
        let outcome = match event {
            TrackerEvent::UserCreated { user_id, email } => {
                let row = UserRow {
                    user_id: *user_id,
                    email: email.clone(),
                };
                apply_upsert("notification.users", outbox.users(), *user_id, row, ctx).await?
            }
            TrackerEvent::UserPatched { user_id, email } => {
                let row = UserRow {
                    user_id: *user_id,
                    email: email.clone(),
                };
                apply_replace("notification.users", outbox.users(), *user_id, row, ctx).await?
            }
            TrackerEvent::UserDeleted { user_id } => {
                apply_delete("notification.users", outbox.users(), user_id, ctx).await?
            }
            TrackerEvent::MembershipUnacceptedCreated {
                membership_id,
                user_id,
                project_id,
            } => {
                let kind = NotificationKind::Invitation {
                    project_id: *project_id,
                    membership_id: *membership_id,
                };
                outbox.queue(*user_id, kind, ctx).await?
            }
            TrackerEvent::TicketAssigned {
                ticket_id,
                user_id,
                project_id,
                ..
            } => {
                let kind = NotificationKind::Assignment {
                    ticket_id: *ticket_id,
                    project_id: *project_id,
                };
                outbox.queue(*user_id, kind, ctx).await?
            }
            _ => Outcome::skipped("not relevant to notifications"),
        };
        Ok(outcome)
    }
}

impl EventHandler<TrackerEvent> for NotificationConsumer {
    fn name(&self) -> &'static str {
        "notification.consumer"
    }

    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope<TrackerEvent>,
        ctx: CorrelationContext,
    ) -> BoxFuture<'a, Result<Outcome, HandlerError>> {
        Box::pin(async move { self.apply(envelope.payload(), &ctx).await })
    }
}
