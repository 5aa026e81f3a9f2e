//! Domain events exchanged between the bounded contexts.
//!
//! Events carry only the identifiers consumers need, never whole entities.
//! [`EventKind`] is the closed registry the bus routes on.

use crate::types::{MembershipId, PhaseId, ProjectId, TicketId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracker_core::Event;

/// Every fact one context broadcasts to the others.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerEvent {
    // ========== User ==========
    /// A user registered.
    UserCreated {
        /// New user
        user_id: UserId,
        /// Contact address
        email: String,
    },
    /// A user's attributes changed.
    UserPatched {
        /// Patched user
        user_id: UserId,
        /// Current contact address
        email: String,
    },
    /// A user was removed.
    UserDeleted {
        /// Removed user
        user_id: UserId,
    },

    // ========== Project ==========
    /// A project was created explicitly.
    ProjectCreated {
        /// New project
        project_id: ProjectId,
        /// Creating user, who becomes its first admin
        owner_id: UserId,
    },
    /// A user's personal project was created on registration.
    DefaultProjectCreated {
        /// New project
        project_id: ProjectId,
        /// Registered user
        owner_id: UserId,
    },
    /// A project was removed.
    ProjectDeleted {
        /// Removed project
        project_id: ProjectId,
    },

    // ========== Membership ==========
    /// A user was invited to a project.
    MembershipUnacceptedCreated {
        /// New membership
        membership_id: MembershipId,
        /// Invited user
        user_id: UserId,
        /// Inviting project
        project_id: ProjectId,
    },
    /// A membership became active.
    MembershipAccepted {
        /// Accepted membership
        membership_id: MembershipId,
        /// Member
        user_id: UserId,
        /// Project joined
        project_id: ProjectId,
    },
    /// A membership was removed.
    MembershipDeleted {
        /// Removed membership
        membership_id: MembershipId,
        /// Former member
        user_id: UserId,
        /// Project left
        project_id: ProjectId,
        /// Whether the membership had been accepted (and therefore projected)
        was_accepted: bool,
    },
    /// The last accepted member of a project left.
    LastProjectMemberDeleted {
        /// Project without members
        project_id: ProjectId,
    },

    // ========== Phase ==========
    /// A phase was inserted into a project's chain.
    PhaseCreated {
        /// New phase
        phase_id: PhaseId,
        /// Owning project
        project_id: ProjectId,
        /// Predecessor, `None` for the head
        previous_phase_id: Option<PhaseId>,
    },
    /// A phase's predecessor changed.
    PhasePositionUpdated {
        /// Relinked phase
        phase_id: PhaseId,
        /// Owning project
        project_id: ProjectId,
        /// New predecessor, `None` for the head
        previous_phase_id: Option<PhaseId>,
    },
    /// A phase was removed from its chain.
    PhaseDeleted {
        /// Removed phase
        phase_id: PhaseId,
        /// Owning project
        project_id: ProjectId,
    },

    // ========== Ticket ==========
    /// A ticket entered a project's pipeline at its head phase.
    TicketCreated {
        /// New ticket
        ticket_id: TicketId,
        /// Owning project
        project_id: ProjectId,
        /// Head phase the ticket starts in
        phase_id: PhaseId,
    },
    /// A ticket was assigned to a member.
    TicketAssigned {
        /// Assigned ticket
        ticket_id: TicketId,
        /// Assignee membership
        membership_id: MembershipId,
        /// Assignee
        user_id: UserId,
        /// Owning project
        project_id: ProjectId,
    },
    /// A ticket lost its assignee.
    TicketUnassigned {
        /// Unassigned ticket
        ticket_id: TicketId,
        /// Former assignee membership
        membership_id: MembershipId,
    },
    /// A ticket moved to another phase.
    TicketPhaseUpdated {
        /// Moved ticket
        ticket_id: TicketId,
        /// Phase left
        old_phase_id: PhaseId,
        /// Phase entered
        new_phase_id: PhaseId,
    },
    /// A ticket was removed.
    TicketDeleted {
        /// Removed ticket
        ticket_id: TicketId,
        /// Phase the ticket was in
        phase_id: PhaseId,
    },
}

/// Fieldless mirror of [`TrackerEvent`], used as the handler registry key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// [`TrackerEvent::UserCreated`]
    UserCreated,
    /// [`TrackerEvent::UserPatched`]
    UserPatched,
    /// [`TrackerEvent::UserDeleted`]
    UserDeleted,
    /// [`TrackerEvent::ProjectCreated`]
    ProjectCreated,
    /// [`TrackerEvent::DefaultProjectCreated`]
    DefaultProjectCreated,
    /// [`TrackerEvent::ProjectDeleted`]
    ProjectDeleted,
    /// [`TrackerEvent::MembershipUnacceptedCreated`]
    MembershipUnacceptedCreated,
    /// [`TrackerEvent::MembershipAccepted`]
    MembershipAccepted,
    /// [`TrackerEvent::MembershipDeleted`]
    MembershipDeleted,
    /// [`TrackerEvent::LastProjectMemberDeleted`]
    LastProjectMemberDeleted,
    /// [`TrackerEvent::PhaseCreated`]
    PhaseCreated,
    /// [`TrackerEvent::PhasePositionUpdated`]
    PhasePositionUpdated,
    /// [`TrackerEvent::PhaseDeleted`]
    PhaseDeleted,
    /// [`TrackerEvent::TicketCreated`]
    TicketCreated,
    /// [`TrackerEvent::TicketAssigned`]
    TicketAssigned,
    /// [`TrackerEvent::TicketUnassigned`]
    TicketUnassigned,
    /// [`TrackerEvent::TicketPhaseUpdated`]
    TicketPhaseUpdated,
    /// [`TrackerEvent::TicketDeleted`]
    TicketDeleted,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 18] = [
        Self::UserCreated,
        Self::UserPatched,
        Self::UserDeleted,
        Self::ProjectCreated,
        Self::DefaultProjectCreated,
        Self::ProjectDeleted,
        Self::MembershipUnacceptedCreated,
        Self::MembershipAccepted,
        Self::MembershipDeleted,
        Self::LastProjectMemberDeleted,
        Self::PhaseCreated,
        Self::PhasePositionUpdated,
        Self::PhaseDeleted,
        Self::TicketCreated,
        Self::TicketAssigned,
        Self::TicketUnassigned,
        Self::TicketPhaseUpdated,
        Self::TicketDeleted,
    ];

    /// Versioned event type name used in logs and metric labels.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UserCreated => "UserCreated.v1",
            Self::UserPatched => "UserPatched.v1",
            Self::UserDeleted => "UserDeleted.v1",
            Self::ProjectCreated => "ProjectCreated.v1",
            Self::DefaultProjectCreated => "DefaultProjectCreated.v1",
            Self::ProjectDeleted => "ProjectDeleted.v1",
            Self::MembershipUnacceptedCreated => "MembershipUnacceptedCreated.v1",
            Self::MembershipAccepted => "MembershipAccepted.v1",
            Self::MembershipDeleted => "MembershipDeleted.v1",
            Self::LastProjectMemberDeleted => "LastProjectMemberDeleted.v1",
            Self::PhaseCreated => "PhaseCreated.v1",
            Self::PhasePositionUpdated => "PhasePositionUpdated.v1",
            Self::PhaseDeleted => "PhaseDeleted.v1",
            Self::TicketCreated => "TicketCreated.v1",
            Self::TicketAssigned => "TicketAssigned.v1",
            Self::TicketUnassigned => "TicketUnassigned.v1",
            Self::TicketPhaseUpdated => "TicketPhaseUpdated.v1",
            Self::TicketDeleted => "TicketDeleted.v1",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Event for TrackerEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        match self {
            Self::UserCreated { .. } => EventKind::UserCreated,
            Self::UserPatched { .. } => EventKind::UserPatched,
            Self::UserDeleted { .. } => EventKind::UserDeleted,
            Self::ProjectCreated { .. } => EventKind::ProjectCreated,
            Self::DefaultProjectCreated { .. } => EventKind::DefaultProjectCreated,
            Self::ProjectDeleted { .. } => EventKind::ProjectDeleted,
            Self::MembershipUnacceptedCreated { .. } => EventKind::MembershipUnacceptedCreated,
            Self::MembershipAccepted { .. } => EventKind::MembershipAccepted,
            Self::MembershipDeleted { .. } => EventKind::MembershipDeleted,
            Self::LastProjectMemberDeleted { .. } => EventKind::LastProjectMemberDeleted,
            Self::PhaseCreated { .. } => EventKind::PhaseCreated,
            Self::PhasePositionUpdated { .. } => EventKind::PhasePositionUpdated,
            Self::PhaseDeleted { .. } => EventKind::PhaseDeleted,
            Self::TicketCreated { .. } => EventKind::TicketCreated,
            Self::TicketAssigned { .. } => EventKind::TicketAssigned,
            Self::TicketUnassigned { .. } => EventKind::TicketUnassigned,
            Self::TicketPhaseUpdated { .. } => EventKind::TicketPhaseUpdated,
            Self::TicketDeleted { .. } => EventKind::TicketDeleted,
        }
    }

    fn event_type(&self) -> &'static str {
        self.kind().name()
    }
}
