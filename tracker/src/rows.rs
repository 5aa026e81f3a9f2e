//! Projection row shapes.
//!
//! Each consuming context owns its own stores of these rows; the shapes are
//! shared because every context needs the same minimal facts.

use crate::types::{MembershipId, PhaseId, ProjectId, UserId};
use serde::{Deserialize, Serialize};
use tracker_projections::InMemoryProjectionStore;

/// "This user id maps to this email".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    /// Projected user
    pub user_id: UserId,
    /// Last known contact address
    pub email: String,
}

/// "This project id exists".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRow {
    /// Projected project
    pub project_id: ProjectId,
}

/// "This membership id belongs to this user and project".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRow {
    /// Projected membership
    pub membership_id: MembershipId,
    /// Member
    pub user_id: UserId,
    /// Project
    pub project_id: ProjectId,
}

/// "This phase id follows that phase in this project".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRow {
    /// Projected phase
    pub phase_id: PhaseId,
    /// Predecessor, `None` for the head
    pub previous_phase_id: Option<PhaseId>,
    /// Owning project
    pub project_id: ProjectId,
}

/// Users projected by a consuming context.
pub type UserProjection = InMemoryProjectionStore<UserId, UserRow>;
/// Projects projected by a consuming context.
pub type ProjectProjection = InMemoryProjectionStore<ProjectId, ProjectRow>;
/// Accepted memberships projected by a consuming context.
pub type MembershipProjection = InMemoryProjectionStore<MembershipId, MembershipRow>;
/// Phase chain projected by a consuming context.
pub type PhaseProjection = InMemoryProjectionStore<PhaseId, PhaseRow>;
