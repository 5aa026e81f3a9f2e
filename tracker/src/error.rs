//! Error taxonomy of the tracker's application services.

use crate::types::{MembershipId, PhaseId, ProjectId};
use thiserror::Error;
use tracing::error;
use tracker_core::HandlerError;
use tracker_core::projection::ProjectionError;

/// Errors raised synchronously by the application services.
///
/// Every variant except [`TrackerError::Invariant`] and
/// [`TrackerError::Projection`] is raised before any event is published, so
/// a rejected request leaves no partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// Malformed input (blank name, bad email, ...).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The addressed entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Requested id
        id: String,
    },

    /// The phase belongs to a different project than the operation targets.
    #[error("Phase {phase_id} does not belong to project {project_id}")]
    UnrelatedPhase {
        /// Offending phase
        phase_id: PhaseId,
        /// Project the operation targets
        project_id: ProjectId,
    },

    /// The membership is not an accepted member of the ticket's project.
    #[error("Membership {membership_id} is not a member of project {project_id}")]
    InvalidProjectMembers {
        /// Offending membership
        membership_id: MembershipId,
        /// Ticket's project
        project_id: ProjectId,
    },

    /// A phase that still holds tickets cannot be deleted.
    #[error("Phase {phase_id} still holds {ticket_count} ticket(s)")]
    PhaseIsNotEmpty {
        /// Phase to delete
        phase_id: PhaseId,
        /// Tickets still in it
        ticket_count: u32,
    },

    /// A project must keep at least one phase.
    #[error("Phase {phase_id} is the last phase of its project")]
    LastPhase {
        /// Phase to delete
        phase_id: PhaseId,
    },

    /// The change would leave the project without an accepted admin.
    #[error("Membership {membership_id} is the last admin of its project")]
    AlreadyLastAdmin {
        /// Admin membership
        membership_id: MembershipId,
    },

    /// The requested state change is not allowed.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// Local storage failed.
    #[error("Projection error: {0}")]
    Projection(String),

    /// Something that should never happen did. Always a defect.
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

/// Coarse classification of [`TrackerError`], used for logging and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input, rejected at the point of mutation
    Validation,
    /// Cross-entity rule violated, rejected before any event
    Consistency,
    /// Defect signal
    Invariant,
}

impl TrackerError {
    /// Build a [`TrackerError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Build a [`TrackerError::Invariant`], logging it at `error`.
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(%message, "Invariant violated");
        Self::Invariant(message)
    }

    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::NotFound { .. } => ErrorKind::Validation,
            Self::UnrelatedPhase { .. }
            | Self::InvalidProjectMembers { .. }
            | Self::PhaseIsNotEmpty { .. }
            | Self::LastPhase { .. }
            | Self::AlreadyLastAdmin { .. }
            | Self::InvalidStateTransition { .. } => ErrorKind::Consistency,
            Self::Projection(_) | Self::Invariant(_) => ErrorKind::Invariant,
        }
    }
}

impl From<ProjectionError> for TrackerError {
    fn from(error: ProjectionError) -> Self {
        Self::Projection(error.to_string())
    }
}

impl From<TrackerError> for HandlerError {
    fn from(error: TrackerError) -> Self {
        Self::new(error.to_string())
    }
}

/// Result type for the application services.
pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn errors_are_classified() {
        let phase_id = PhaseId::from_uuid(Uuid::from_u128(1));

        assert_eq!(
            TrackerError::Validation("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            TrackerError::LastPhase { phase_id }.kind(),
            ErrorKind::Consistency
        );
        assert_eq!(TrackerError::invariant("two heads").kind(), ErrorKind::Invariant);
    }

    #[test]
    fn messages_name_the_offender() {
        let phase_id = PhaseId::from_uuid(Uuid::from_u128(7));
        let err = TrackerError::PhaseIsNotEmpty {
            phase_id,
            ticket_count: 2,
        };
        assert!(err.to_string().contains("2 ticket(s)"));
        assert!(TrackerError::not_found("Project", 5).to_string().contains("Project not found"));
    }
}
