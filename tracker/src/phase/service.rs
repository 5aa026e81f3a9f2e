//! Phase ordering engine: the application service over the phase chains.

use super::chain::{ChainChange, ChainChanges, Phase, PhaseChain};
use crate::emitter::Emitter;
use crate::error::{Result, TrackerError};
use crate::events::TrackerEvent;
use crate::rows::ProjectProjection;
use crate::types::{PhaseId, ProjectId, non_empty};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use tracker_core::projection::ProjectionStore;
use tracker_core::{CorrelationContext, Outcome};

/// Pipeline every project starts with, head first.
pub const DEFAULT_PHASES: [&str; 4] = ["BACKLOG", "DOING", "REVIEW", "DONE"];

/// Application service of the phase context.
///
/// Structural operations are serialized by `writer`, held from validation
/// until the last event is published, so a project's chain has a single
/// writer at a time. Ticket counters only take the `chains` lock.
pub struct PhaseService {
    chains: Mutex<Chains>,
    writer: Mutex<()>,
    projects: ProjectProjection,
    emitter: Emitter,
}

impl PhaseService {
    /// Create an empty phase context.
    #[must_use]
    pub fn new(emitter: Emitter) -> Self {
        Self {
            chains: Mutex::new(Chains::default()),
            writer: Mutex::new(()),
            projects: ProjectProjection::new(),
            emitter,
        }
    }

    /// Projected projects, as seen by this context.
    #[must_use]
    pub const fn projects(&self) -> &ProjectProjection {
        &self.projects
    }

    /// Insert a phase after `after`, or as the new head.
    ///
    /// Publishes the displaced neighbor's `PhasePositionUpdated` (if any)
    /// before `PhaseCreated`.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::Validation`] for a blank name
    /// - [`TrackerError::NotFound`] when the project is not projected or
    ///   `after` does not exist
    /// - [`TrackerError::UnrelatedPhase`] when `after` belongs to another project
    pub async fn create_phase(
        &self,
        project_id: ProjectId,
        name: &str,
        after: Option<PhaseId>,
        ctx: &CorrelationContext,
    ) -> Result<Phase> {
        let name = non_empty("name", name)?;
        if !self.projects.exists(&project_id).await? {
            return Err(TrackerError::not_found("Project", project_id));
        }

        let _writer = self.writer.lock().await;
        let (phase, changes) = {
            let mut chains = self.chains.lock().await;
            if let Some(after_id) = after {
                chains.require_related(after_id, project_id)?;
            }
            let id = PhaseId::from_uuid(self.emitter.next_id());
            let (draft, changes) = commit(chains.chain_or_new(project_id), |draft| {
                draft.insert(id, name, after)
            })?;
            let phase = draft
                .get(id)
                .cloned()
                .ok_or_else(|| TrackerError::invariant(format!("inserted phase {id} missing")))?;
            chains.replace(draft, &changes);
            (phase, changes)
        };

        info!(
            phase_id = %phase.id,
            %project_id,
            previous_phase_id = ?phase.previous_phase_id,
            correlation_id = %ctx.correlation_id(),
            "Phase created"
        );
        self.publish(project_id, changes, ctx).await;
        Ok(phase)
    }

    /// Move a phase after `after`, or to the head.
    ///
    /// Requesting the current position changes and publishes nothing.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::NotFound`] when the phase or `after` does not exist
    /// - [`TrackerError::Validation`] when `after` is the phase itself
    /// - [`TrackerError::UnrelatedPhase`] when `after` belongs to another project
    pub async fn patch_phase_position(
        &self,
        phase_id: PhaseId,
        after: Option<PhaseId>,
        ctx: &CorrelationContext,
    ) -> Result<()> {
        let _writer = self.writer.lock().await;
        let (project_id, changes) = {
            let mut chains = self.chains.lock().await;
            let project_id = chains.project_of(phase_id)?;
            if let Some(after_id) = after {
                chains.require_related(after_id, project_id)?;
            }
            let (draft, changes) = commit(chains.chain(project_id)?, |draft| {
                draft.move_after(phase_id, after)
            })?;
            chains.replace(draft, &changes);
            (project_id, changes)
        };

        if changes.is_empty() {
            debug!(%phase_id, "Phase already in requested position");
            return Ok(());
        }
        info!(
            %phase_id,
            %project_id,
            previous_phase_id = ?after,
            correlation_id = %ctx.correlation_id(),
            "Phase moved"
        );
        self.publish(project_id, changes, ctx).await;
        Ok(())
    }

    /// Delete an empty phase that is not its project's last.
    ///
    /// Publishes `PhaseDeleted`, then `PhasePositionUpdated` for the new head
    /// when the head was deleted.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::NotFound`] for an unknown phase
    /// - [`TrackerError::PhaseIsNotEmpty`] while it holds tickets
    /// - [`TrackerError::LastPhase`] for the project's only phase
    pub async fn delete_by_id(&self, phase_id: PhaseId, ctx: &CorrelationContext) -> Result<()> {
        let _writer = self.writer.lock().await;
        let (project_id, changes) = {
            let mut chains = self.chains.lock().await;
            let project_id = chains.project_of(phase_id)?;
            let (draft, changes) =
                commit(chains.chain(project_id)?, |draft| draft.remove(phase_id))?;
            chains.replace(draft, &changes);
            (project_id, changes)
        };

        info!(%phase_id, %project_id, correlation_id = %ctx.correlation_id(), "Phase deleted");
        self.publish(project_id, changes, ctx).await;
        Ok(())
    }

    /// Create the default pipeline of a new project.
    ///
    /// Skipped when the project already has phases.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Invariant`] if the chain ends up corrupt.
    pub async fn bootstrap(&self, project_id: ProjectId, ctx: &CorrelationContext) -> Result<Outcome> {
        let _writer = self.writer.lock().await;
        let changes = {
            let mut chains = self.chains.lock().await;
            let chain = chains.chain_or_new(project_id);
            if !chain.is_empty() {
                return Ok(Outcome::skipped("project already has phases"));
            }
            let (draft, changes) = commit(chain, |draft| {
                let mut changes = ChainChanges::new();
                let mut after = None;
                for name in DEFAULT_PHASES {
                    let id = PhaseId::from_uuid(self.emitter.next_id());
                    changes.extend(draft.insert(id, name, after)?);
                    after = Some(id);
                }
                Ok(changes)
            })?;
            chains.replace(draft, &changes);
            changes
        };

        info!(%project_id, correlation_id = %ctx.correlation_id(), "Default phases created");
        self.publish(project_id, changes, ctx).await;
        Ok(Outcome::Applied)
    }

    /// Forget a deleted project's whole chain. Publishes nothing.
    pub async fn drop_project(&self, project_id: ProjectId) -> usize {
        let _writer = self.writer.lock().await;
        self.chains.lock().await.remove(project_id)
    }

    /// Count a ticket entering `phase_id`.
    pub async fn ticket_added(&self, phase_id: PhaseId) -> Outcome {
        let mut chains = self.chains.lock().await;
        match chains.phase_mut(phase_id) {
            Some(phase) => {
                phase.ticket_count += 1;
                Outcome::Applied
            }
            None => Outcome::anomaly(format!("ticket added to unknown phase {phase_id}")),
        }
    }

    /// Count a ticket leaving `phase_id`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] for an unknown phase.
    pub async fn ticket_removed(&self, phase_id: PhaseId) -> Result<Outcome> {
        let mut chains = self.chains.lock().await;
        let phase = chains
            .phase_mut(phase_id)
            .ok_or_else(|| TrackerError::not_found("Phase", phase_id))?;
        if phase.ticket_count == 0 {
            return Ok(Outcome::anomaly(format!(
                "ticket counter of phase {phase_id} already zero"
            )));
        }
        phase.ticket_count -= 1;
        Ok(Outcome::Applied)
    }

    /// Count a ticket moving between phases.
    ///
    /// An unknown phase left behind is an anomaly; the phase entered is
    /// counted regardless.
    pub async fn ticket_moved(&self, from: PhaseId, to: PhaseId) -> Outcome {
        let left = self
            .ticket_removed(from)
            .await
            .unwrap_or_else(|e| Outcome::anomaly(format!("ticket moved out of phase {from}: {e}")));
        left.merge(self.ticket_added(to).await)
    }

    /// Phases of `project_id`, head first.
    pub async fn phases(&self, project_id: ProjectId) -> Vec<Phase> {
        self.chains
            .lock()
            .await
            .chain(project_id)
            .map(|chain| chain.ordered().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Look a phase up.
    pub async fn phase(&self, phase_id: PhaseId) -> Option<Phase> {
        let chains = self.chains.lock().await;
        let project_id = chains.project_of(phase_id).ok()?;
        chains.chain(project_id).ok()?.get(phase_id).cloned()
    }

    /// Copy of a project's chain.
    pub async fn chain(&self, project_id: ProjectId) -> Option<PhaseChain> {
        self.chains.lock().await.chain(project_id).ok().cloned()
    }

    async fn publish(&self, project_id: ProjectId, changes: ChainChanges, ctx: &CorrelationContext) {
        let events = changes.into_iter().map(|change| match change {
            ChainChange::PositionUpdated {
                phase_id,
                previous_phase_id,
            } => TrackerEvent::PhasePositionUpdated {
                phase_id,
                project_id,
                previous_phase_id,
            },
            ChainChange::Created {
                phase_id,
                previous_phase_id,
            } => TrackerEvent::PhaseCreated {
                phase_id,
                project_id,
                previous_phase_id,
            },
            ChainChange::Deleted { phase_id } => TrackerEvent::PhaseDeleted {
                phase_id,
                project_id,
            },
        });
        self.emitter.emit_all(events, ctx).await;
    }
}

/// Apply `operation` to a copy of `chain` and return the copy if it is still
/// a single list.
fn commit(
    chain: &PhaseChain,
    operation: impl FnOnce(&mut PhaseChain) -> Result<ChainChanges>,
) -> Result<(PhaseChain, ChainChanges)> {
    let mut draft = chain.clone();
    let changes = operation(&mut draft)?;
    draft.check_invariants().map_err(|violation| {
        TrackerError::invariant(format!(
            "phase chain of project {} corrupted: {violation}",
            chain.project_id()
        ))
    })?;
    Ok((draft, changes))
}

/// Every project's chain plus the owning project of each phase.
#[derive(Default)]
struct Chains {
    by_project: HashMap<ProjectId, PhaseChain>,
    owner: HashMap<PhaseId, ProjectId>,
}

impl Chains {
    fn project_of(&self, phase_id: PhaseId) -> Result<ProjectId> {
        self.owner
            .get(&phase_id)
            .copied()
            .ok_or_else(|| TrackerError::not_found("Phase", phase_id))
    }

    fn require_related(&self, phase_id: PhaseId, project_id: ProjectId) -> Result<()> {
        if self.project_of(phase_id)? == project_id {
            Ok(())
        } else {
            Err(TrackerError::UnrelatedPhase {
                phase_id,
                project_id,
            })
        }
    }

    fn chain(&self, project_id: ProjectId) -> Result<&PhaseChain> {
        self.by_project
            .get(&project_id)
            .ok_or_else(|| TrackerError::not_found("Project", project_id))
    }

    fn chain_or_new(&mut self, project_id: ProjectId) -> &PhaseChain {
        self.by_project
            .entry(project_id)
            .or_insert_with(|| PhaseChain::new(project_id))
    }

    fn phase_mut(&mut self, phase_id: PhaseId) -> Option<&mut Phase> {
        let project_id = self.owner.get(&phase_id)?;
        self.by_project.get_mut(project_id)?.get_mut(phase_id)
    }

    /// Install a committed draft and index the phases it created or deleted.
    fn replace(&mut self, chain: PhaseChain, changes: &ChainChanges) {
        let project_id = chain.project_id();
        for change in changes {
            match change {
                ChainChange::Created { phase_id, .. } => {
                    self.owner.insert(*phase_id, project_id);
                }
                ChainChange::Deleted { phase_id } => {
                    self.owner.remove(phase_id);
                }
                ChainChange::PositionUpdated { .. } => {}
            }
        }
        self.by_project.insert(project_id, chain);
    }

    /// Forget a project's chain, returning how many phases it held.
    fn remove(&mut self, project_id: ProjectId) -> usize {
        let Some(chain) = self.by_project.remove(&project_id) else {
            return 0;
        };
        for phase in chain.ordered() {
            self.owner.remove(&phase.id);
        }
        chain.len()
    }
}
