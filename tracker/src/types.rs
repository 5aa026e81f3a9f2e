//! Identifiers and value objects shared by the bounded contexts.
//!
//! Every entity id is a distinct newtype over [`Uuid`] so a phase id can never
//! be passed where a project id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a user
    UserId
);
id_type!(
    /// Unique identifier for a project
    ProjectId
);
id_type!(
    /// Unique identifier for a project membership
    MembershipId
);
id_type!(
    /// Unique identifier for a phase of a project's pipeline
    PhaseId
);
id_type!(
    /// Unique identifier for a ticket
    TicketId
);
id_type!(
    /// Unique identifier for a queued notification
    NotificationId
);

// ============================================================================
// Membership
// ============================================================================

/// Lifecycle of a membership. `Open → Accepted` only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipState {
    /// Invitation sent, not yet accepted
    Open,
    /// Active member of the project
    Accepted,
}

impl fmt::Display for MembershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Accepted => write!(f, "ACCEPTED"),
        }
    }
}

/// Role of a member inside a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipRole {
    /// May manage the project and its members
    Admin,
    /// Regular member
    Member,
}

impl fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "ADMIN"),
            Self::Member => write!(f, "MEMBER"),
        }
    }
}

// ============================================================================
// Validation helpers
// ============================================================================

/// Trimmed, non-empty display name.
///
/// # Errors
///
/// Returns [`TrackerError::Validation`](crate::TrackerError::Validation) when
/// `value` is blank.
pub fn non_empty(field: &'static str, value: &str) -> Result<String, crate::TrackerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::TrackerError::Validation(format!(
            "{field} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_of_different_entities_display_the_same_uuid() {
        let uuid = Uuid::from_u128(42);
        assert_eq!(
            ProjectId::from_uuid(uuid).to_string(),
            PhaseId::from_uuid(uuid).to_string()
        );
        assert_eq!(ProjectId::from_uuid(uuid).as_uuid(), &uuid);
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(non_empty("name", "   ").is_err());
        assert_eq!(non_empty("name", " QA ").ok().as_deref(), Some("QA"));
    }

    #[test]
    fn states_render_upper_case() {
        assert_eq!(MembershipState::Accepted.to_string(), "ACCEPTED");
        assert_eq!(MembershipRole::Member.to_string(), "MEMBER");
    }
}
