//! Ordered phase chain of one project.
//!
//! Phases live in a map keyed by id; links are ids, never references. Every
//! operation returns the structural changes it made, in publication order:
//! changes to a neighbor's link come before the change describing the
//! operation's own effect, so a consumer keying its local chain off
//! `previous_phase_id` never sees a cycle.
//!
//! ```text
//! insert X after A          A ──► B            A ──► X ──► B
//!                                      =>      PositionUpdated(B, prev = X)
//!                                              Created(X, prev = A)
//! ```

use crate::error::{Result, TrackerError};
use crate::types::{PhaseId, ProjectId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

/// A stage of a project's ticket pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// Identity
    pub id: PhaseId,
    /// Owning project
    pub project_id: ProjectId,
    /// Display name
    pub name: String,
    /// Predecessor, `None` for the head
    pub previous_phase_id: Option<PhaseId>,
    /// Successor, `None` for the tail
    pub next_phase_id: Option<PhaseId>,
    /// Tickets currently in this phase
    pub ticket_count: u32,
}

/// One structural change made by a chain operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainChange {
    /// An existing phase got a new predecessor.
    PositionUpdated {
        /// Relinked phase
        phase_id: PhaseId,
        /// New predecessor
        previous_phase_id: Option<PhaseId>,
    },
    /// A phase was inserted.
    Created {
        /// New phase
        phase_id: PhaseId,
        /// Its predecessor
        previous_phase_id: Option<PhaseId>,
    },
    /// A phase was removed.
    Deleted {
        /// Removed phase
        phase_id: PhaseId,
    },
}

/// Changes of one operation; a single insert, move or delete fits inline.
pub type ChainChanges = SmallVec<[ChainChange; 3]>;

/// The doubly-linked phase chain of one project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseChain {
    project_id: ProjectId,
    phases: HashMap<PhaseId, Phase>,
}

impl PhaseChain {
    /// Empty chain for `project_id`.
    #[must_use]
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            phases: HashMap::new(),
        }
    }

    /// Owning project.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Number of phases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Whether the chain has no phase.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Whether `id` is part of this chain.
    #[must_use]
    pub fn contains(&self, id: PhaseId) -> bool {
        self.phases.contains_key(&id)
    }

    /// Phase `id`, if it is part of this chain.
    #[must_use]
    pub fn get(&self, id: PhaseId) -> Option<&Phase> {
        self.phases.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: PhaseId) -> Option<&mut Phase> {
        self.phases.get_mut(&id)
    }

    /// The phase without predecessor.
    #[must_use]
    pub fn head(&self) -> Option<PhaseId> {
        self.head_excluding(None)
    }

    fn head_excluding(&self, excluded: Option<PhaseId>) -> Option<PhaseId> {
        self.phases
            .values()
            .find(|p| p.previous_phase_id.is_none() && Some(p.id) != excluded)
            .map(|p| p.id)
    }

    /// Phases from head to tail.
    ///
    /// Stops early rather than looping if the links are corrupt.
    #[must_use]
    pub fn ordered(&self) -> Vec<&Phase> {
        let mut ordered = Vec::with_capacity(self.phases.len());
        let mut cursor = self.head();
        while let Some(id) = cursor {
            let Some(phase) = self.phases.get(&id) else {
                break;
            };
            if ordered.len() == self.phases.len() {
                break;
            }
            ordered.push(phase);
            cursor = phase.next_phase_id;
        }
        ordered
    }

    /// Phase names from head to tail.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.ordered().iter().map(|p| p.name.as_str()).collect()
    }

    /// Insert a new phase `id` after `after`, or as the new head when `after`
    /// is `None`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::UnrelatedPhase`] when `after` is not in this chain.
    pub fn insert(
        &mut self,
        id: PhaseId,
        name: impl Into<String>,
        after: Option<PhaseId>,
    ) -> Result<ChainChanges> {
        if self.phases.contains_key(&id) {
            return Err(TrackerError::invariant(format!(
                "phase id {id} allocated twice"
            )));
        }
        let next = match after {
            Some(after_id) => self.require_related(after_id)?.next_phase_id,
            None => self.head(),
        };

        self.phases.insert(
            id,
            Phase {
                id,
                project_id: self.project_id,
                name: name.into(),
                previous_phase_id: after,
                next_phase_id: next,
                ticket_count: 0,
            },
        );

        let mut changes = ChainChanges::new();
        self.splice(id, after, next, &mut changes);
        changes.push(ChainChange::Created {
            phase_id: id,
            previous_phase_id: after,
        });
        Ok(changes)
    }

    /// Move phase `id` after `after`, or to the head when `after` is `None`.
    ///
    /// Returns no change when the phase already sits there.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] when `id` is not in this chain,
    /// [`TrackerError::Validation`] when `after == id`,
    /// [`TrackerError::UnrelatedPhase`] when `after` is not in this chain.
    pub fn move_after(&mut self, id: PhaseId, after: Option<PhaseId>) -> Result<ChainChanges> {
        let phase = self
            .phases
            .get(&id)
            .ok_or_else(|| TrackerError::not_found("Phase", id))?;
        if after == Some(id) {
            return Err(TrackerError::Validation(format!(
                "phase {id} cannot follow itself"
            )));
        }
        if let Some(after_id) = after {
            self.require_related(after_id)?;
        }
        if phase.previous_phase_id == after {
            return Ok(ChainChanges::new());
        }

        let mut changes = ChainChanges::new();

        // Detach, closing the gap.
        let (old_previous, old_next) = (phase.previous_phase_id, phase.next_phase_id);
        if let Some(previous) = old_previous.and_then(|p| self.phases.get_mut(&p)) {
            previous.next_phase_id = old_next;
        }
        if let Some(next) = old_next.and_then(|n| self.phases.get_mut(&n)) {
            next.previous_phase_id = old_previous;
            changes.push(ChainChange::PositionUpdated {
                phase_id: next.id,
                previous_phase_id: old_previous,
            });
        }

        // Reattach at the destination.
        let next = match after {
            Some(after_id) => self.phases.get(&after_id).and_then(|p| p.next_phase_id),
            None => self.head_excluding(Some(id)),
        };
        if let Some(phase) = self.phases.get_mut(&id) {
            phase.previous_phase_id = after;
            phase.next_phase_id = next;
        }
        self.splice(id, after, next, &mut changes);
        changes.push(ChainChange::PositionUpdated {
            phase_id: id,
            previous_phase_id: after,
        });
        Ok(changes)
    }

    /// Remove phase `id`, linking its neighbors to each other.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] when `id` is not in this chain,
    /// [`TrackerError::PhaseIsNotEmpty`] while it holds tickets,
    /// [`TrackerError::LastPhase`] when it is the only phase.
    pub fn remove(&mut self, id: PhaseId) -> Result<ChainChanges> {
        let phase = self
            .phases
            .get(&id)
            .ok_or_else(|| TrackerError::not_found("Phase", id))?;
        if phase.ticket_count > 0 {
            return Err(TrackerError::PhaseIsNotEmpty {
                phase_id: id,
                ticket_count: phase.ticket_count,
            });
        }
        if phase.previous_phase_id.is_none() && phase.next_phase_id.is_none() {
            return Err(TrackerError::LastPhase { phase_id: id });
        }

        let (previous, next) = (phase.previous_phase_id, phase.next_phase_id);
        if let Some(p) = previous.and_then(|p| self.phases.get_mut(&p)) {
            p.next_phase_id = next;
        }
        if let Some(n) = next.and_then(|n| self.phases.get_mut(&n)) {
            n.previous_phase_id = previous;
        }
        self.phases.remove(&id);

        let mut changes = ChainChanges::new();
        changes.push(ChainChange::Deleted { phase_id: id });
        if let (None, Some(new_head)) = (previous, next) {
            changes.push(ChainChange::PositionUpdated {
                phase_id: new_head,
                previous_phase_id: None,
            });
        }
        Ok(changes)
    }

    /// Verify the chain is one acyclic doubly-linked list.
    ///
    /// # Errors
    ///
    /// A description of the first violation found.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if self.phases.is_empty() {
            return Ok(());
        }
        for phase in self.phases.values() {
            if phase.project_id != self.project_id {
                return Err(format!("phase {} belongs to another project", phase.id));
            }
            if phase.previous_phase_id == Some(phase.id) || phase.next_phase_id == Some(phase.id) {
                return Err(format!("phase {} references itself", phase.id));
            }
        }

        let heads = self
            .phases
            .values()
            .filter(|p| p.previous_phase_id.is_none())
            .count();
        let tails = self
            .phases
            .values()
            .filter(|p| p.next_phase_id.is_none())
            .count();
        if heads != 1 || tails != 1 {
            return Err(format!("{heads} head(s) and {tails} tail(s)"));
        }

        let mut seen = HashSet::new();
        let mut previous = None;
        let mut cursor = self.head();
        while let Some(id) = cursor {
            let phase = self
                .phases
                .get(&id)
                .ok_or_else(|| format!("dangling link to {id}"))?;
            if !seen.insert(id) {
                return Err(format!("cycle through {id}"));
            }
            if phase.previous_phase_id != previous {
                return Err(format!("back link of {id} is broken"));
            }
            previous = Some(id);
            cursor = phase.next_phase_id;
        }
        if seen.len() != self.phases.len() {
            return Err(format!(
                "{} of {} phases reachable from head",
                seen.len(),
                self.phases.len()
            ));
        }
        Ok(())
    }

    fn require_related(&self, id: PhaseId) -> Result<&Phase> {
        self.phases.get(&id).ok_or(TrackerError::UnrelatedPhase {
            phase_id: id,
            project_id: self.project_id,
        })
    }

    /// Point `previous` and `next` at `id`, recording the successor's update.
    fn splice(
        &mut self,
        id: PhaseId,
        previous: Option<PhaseId>,
        next: Option<PhaseId>,
        changes: &mut ChainChanges,
    ) {
        if let Some(p) = previous.and_then(|p| self.phases.get_mut(&p)) {
            p.next_phase_id = Some(id);
        }
        if let Some(n) = next.and_then(|n| self.phases.get_mut(&n)) {
            n.previous_phase_id = Some(id);
            changes.push(ChainChange::PositionUpdated {
                phase_id: n.id,
                previous_phase_id: Some(id),
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use uuid::Uuid;

    fn id(n: u128) -> PhaseId {
        PhaseId::from_uuid(Uuid::from_u128(n))
    }

    /// BACKLOG(1) → DOING(2) → REVIEW(3) → DONE(4)
    fn default_chain() -> PhaseChain {
        let mut chain = PhaseChain::new(ProjectId::from_uuid(Uuid::from_u128(100)));
        let mut after = None;
        for (n, name) in [(1, "BACKLOG"), (2, "DOING"), (3, "REVIEW"), (4, "DONE")] {
            chain.insert(id(n), name, after).unwrap();
            after = Some(id(n));
        }
        chain
    }

    fn position(phase: u128, previous: Option<u128>) -> ChainChange {
        ChainChange::PositionUpdated {
            phase_id: id(phase),
            previous_phase_id: previous.map(id),
        }
    }

    #[test]
    fn first_phase_is_sole_phase() {
        let mut chain = PhaseChain::new(ProjectId::from_uuid(Uuid::from_u128(100)));

        let changes = chain.insert(id(1), "ONLY", None).unwrap();

        assert_eq!(
            changes.as_slice(),
            &[ChainChange::Created {
                phase_id: id(1),
                previous_phase_id: None
            }]
        );
        assert_eq!(chain.head(), Some(id(1)));
        chain.check_invariants().unwrap();
    }

    #[test]
    fn appending_at_tail_touches_no_neighbor_event() {
        let chain = default_chain();
        assert_eq!(chain.names(), vec!["BACKLOG", "DOING", "REVIEW", "DONE"]);
        chain.check_invariants().unwrap();
    }

    #[test]
    fn insert_as_new_head_updates_old_head_first() {
        let mut chain = default_chain();

        let changes = chain.insert(id(9), "INBOX", None).unwrap();

        assert_eq!(
            changes.as_slice(),
            &[
                position(1, Some(9)),
                ChainChange::Created {
                    phase_id: id(9),
                    previous_phase_id: None
                },
            ]
        );
        assert_eq!(chain.names()[..2], ["INBOX", "BACKLOG"]);
        chain.check_invariants().unwrap();
    }

    #[test]
    fn insert_after_splices_between_neighbors() {
        let mut chain = default_chain();

        let changes = chain.insert(id(9), "X", Some(id(1))).unwrap();

        assert_eq!(
            changes.as_slice(),
            &[
                position(2, Some(9)),
                ChainChange::Created {
                    phase_id: id(9),
                    previous_phase_id: Some(id(1))
                },
            ]
        );
        assert_eq!(chain.names(), vec!["BACKLOG", "X", "DOING", "REVIEW", "DONE"]);
        assert_eq!(chain.get(id(2)).unwrap().previous_phase_id, Some(id(9)));
        chain.check_invariants().unwrap();
    }

    #[test]
    fn insert_after_foreign_phase_is_unrelated() {
        let mut chain = default_chain();

        let err = chain.insert(id(9), "X", Some(id(77))).unwrap_err();

        assert!(matches!(err, TrackerError::UnrelatedPhase { .. }));
        assert!(!chain.contains(id(9)));
    }

    #[test]
    fn moving_tail_to_head_emits_two_position_updates() {
        let mut chain = default_chain();

        let changes = chain.move_after(id(4), None).unwrap();

        assert_eq!(
            changes.as_slice(),
            &[position(1, Some(4)), position(4, None)]
        );
        assert_eq!(chain.names(), vec!["DONE", "BACKLOG", "DOING", "REVIEW"]);
        chain.check_invariants().unwrap();
    }

    #[test]
    fn moving_head_down_relinks_both_slots() {
        let mut chain = default_chain();

        let changes = chain.move_after(id(1), Some(id(2))).unwrap();

        assert_eq!(
            changes.as_slice(),
            &[position(2, None), position(3, Some(1)), position(1, Some(2))]
        );
        assert_eq!(chain.names(), vec!["DOING", "BACKLOG", "REVIEW", "DONE"]);
        chain.check_invariants().unwrap();
    }

    #[test]
    fn moving_to_current_position_is_a_no_op() {
        let mut chain = default_chain();
        let before = chain.clone();

        assert!(chain.move_after(id(3), Some(id(2))).unwrap().is_empty());
        assert!(chain.move_after(id(1), None).unwrap().is_empty());
        assert_eq!(chain, before);
    }

    #[test]
    fn moving_after_itself_is_rejected() {
        let mut chain = default_chain();
        assert!(matches!(
            chain.move_after(id(2), Some(id(2))),
            Err(TrackerError::Validation(_))
        ));
    }

    #[test]
    fn deleting_middle_phase_emits_only_deleted() {
        let mut chain = default_chain();

        let changes = chain.remove(id(2)).unwrap();

        assert_eq!(
            changes.as_slice(),
            &[ChainChange::Deleted { phase_id: id(2) }]
        );
        assert_eq!(chain.get(id(3)).unwrap().previous_phase_id, Some(id(1)));
        chain.check_invariants().unwrap();
    }

    #[test]
    fn deleting_head_announces_new_head() {
        let mut chain = default_chain();

        let changes = chain.remove(id(1)).unwrap();

        assert_eq!(
            changes.as_slice(),
            &[ChainChange::Deleted { phase_id: id(1) }, position(2, None)]
        );
        assert_eq!(chain.head(), Some(id(2)));
    }

    #[test]
    fn deleting_non_empty_phase_is_rejected_unchanged() {
        let mut chain = default_chain();
        chain.get_mut(id(3)).unwrap().ticket_count = 2;
        let before = chain.clone();

        let err = chain.remove(id(3)).unwrap_err();

        assert_eq!(
            err,
            TrackerError::PhaseIsNotEmpty {
                phase_id: id(3),
                ticket_count: 2
            }
        );
        assert_eq!(chain, before);
    }

    #[test]
    fn last_phase_cannot_be_deleted() {
        let mut chain = PhaseChain::new(ProjectId::from_uuid(Uuid::from_u128(100)));
        chain.insert(id(1), "ONLY", None).unwrap();

        assert_eq!(
            chain.remove(id(1)).unwrap_err(),
            TrackerError::LastPhase { phase_id: id(1) }
        );
    }

    #[test]
    fn corrupt_links_are_detected() {
        let mut chain = default_chain();
        chain.get_mut(id(4)).unwrap().next_phase_id = Some(id(1));

        assert!(chain.check_invariants().is_err());
        // Walking a corrupt chain terminates.
        assert!(chain.ordered().len() <= chain.len());
    }
}
