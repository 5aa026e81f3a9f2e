//! End-to-end scenarios across every bounded context, wired on one bus.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use std::sync::Arc;
use tracker::{
    DEFAULT_PHASES, EventKind, MembershipRole, MembershipState, Phase, PhaseId, Project,
    TicketPatch, Tracker, TrackerConfig, TrackerError, TrackerEvent, User,
};
use tracker_core::Envelope;
use tracker_core::projection::ProjectionStore;
use tracker_runtime::BusConfig;
use tracker_testing::{EventRecorder, SequentialIds, init_test_tracing, test_clock};

struct World {
    tracker: Tracker,
    recorder: Arc<EventRecorder<TrackerEvent>>,
}

async fn world() -> World {
    init_test_tracing();
    let config = TrackerConfig {
        bus: BusConfig::new(4, 64),
        ..TrackerConfig::default()
    };
    let tracker =
        Tracker::with_environment(&config, Arc::new(test_clock()), Arc::new(SequentialIds::new()))
            .await
            .unwrap();
    let recorder = Arc::new(EventRecorder::new("scenario.recorder"));
    for kind in EventKind::ALL {
        tracker.bus().register_sync(kind, recorder.clone()).await;
    }
    World { tracker, recorder }
}

impl World {
    async fn user_with_project(&self, email: &str) -> (User, Project) {
        let ctx = self.tracker.request_context();
        let user = self
            .tracker
            .users()
            .create_user(email, "Someone", &ctx)
            .await
            .unwrap();
        self.tracker.wait_idle().await;
        let project = self.tracker.projects().projects_of(user.id).await.remove(0);
        (user, project)
    }

    async fn phase(&self, project: &Project, name: &str) -> Phase {
        self.tracker
            .phases()
            .phases(project.id)
            .await
            .into_iter()
            .find(|p| p.name == name)
            .unwrap()
    }

    async fn names(&self, project: &Project) -> Vec<String> {
        self.tracker
            .phases()
            .phases(project.id)
            .await
            .into_iter()
            .map(|p| p.name)
            .collect()
    }

    async fn projected_previous(&self, phase_id: PhaseId) -> Option<PhaseId> {
        self.tracker
            .tickets()
            .phases()
            .get(&phase_id)
            .await
            .unwrap()
            .unwrap()
            .previous_phase_id
    }
}

#[tokio::test]
async fn new_user_gets_a_bootstrapped_default_project() {
    let w = world().await;
    let (user, project) = w.user_with_project("ada@example.com").await;

    assert_eq!(project.owner_id, user.id);
    assert_eq!(project.name, "Personal");
    assert_eq!(w.names(&project).await, DEFAULT_PHASES);

    let owner = w.tracker.memberships().memberships_of_project(project.id).await;
    assert_eq!(owner.len(), 1);
    assert_eq!(owner[0].state, MembershipState::Accepted);
    assert_eq!(owner[0].role, MembershipRole::Admin);
    assert_eq!(w.tracker.stats().failures, 0);
}

#[tokio::test]
async fn scenario_a_insert_after_head_updates_one_neighbor() {
    let w = world().await;
    let (_, project) = w.user_with_project("ada@example.com").await;
    let backlog = w.phase(&project, "BACKLOG").await;
    let doing = w.phase(&project, "DOING").await;
    let ctx = w.tracker.request_context();
    w.recorder.clear();

    let x = w
        .tracker
        .phases()
        .create_phase(project.id, "X", Some(backlog.id), &ctx)
        .await
        .unwrap();

    assert_eq!(w.names(&project).await, ["BACKLOG", "X", "DOING", "REVIEW", "DONE"]);
    assert_eq!(x.previous_phase_id, Some(backlog.id));
    assert_eq!(
        w.recorder.events(),
        vec![
            TrackerEvent::PhasePositionUpdated {
                phase_id: doing.id,
                project_id: project.id,
                previous_phase_id: Some(x.id),
            },
            TrackerEvent::PhaseCreated {
                phase_id: x.id,
                project_id: project.id,
                previous_phase_id: Some(backlog.id),
            },
        ]
    );
    // The ticket context's phase projection is updated before the call returns.
    assert_eq!(w.projected_previous(doing.id).await, Some(x.id));
    assert_eq!(w.projected_previous(x.id).await, Some(backlog.id));
}

#[tokio::test]
async fn scenario_b_moving_tail_to_head() {
    let w = world().await;
    let (_, project) = w.user_with_project("ada@example.com").await;
    let backlog = w.phase(&project, "BACKLOG").await;
    let done = w.phase(&project, "DONE").await;
    let ctx = w.tracker.request_context();
    w.recorder.clear();

    w.tracker
        .phases()
        .patch_phase_position(done.id, None, &ctx)
        .await
        .unwrap();

    assert_eq!(w.names(&project).await, ["DONE", "BACKLOG", "DOING", "REVIEW"]);
    assert_eq!(
        w.recorder.event_types(),
        vec!["PhasePositionUpdated.v1", "PhasePositionUpdated.v1"]
    );
    assert_eq!(w.projected_previous(backlog.id).await, Some(done.id));
    assert_eq!(w.projected_previous(done.id).await, None);

    // New tickets now enter at the new head.
    let ticket = w
        .tracker
        .tickets()
        .add_ticket(project.id, "Ship", &ctx)
        .await
        .unwrap();
    assert_eq!(ticket.phase_id, done.id);
}

#[tokio::test]
async fn scenario_c_non_empty_phase_cannot_be_deleted() {
    let w = world().await;
    let (_, project) = w.user_with_project("ada@example.com").await;
    let backlog = w.phase(&project, "BACKLOG").await;
    let ctx = w.tracker.request_context();
    for title in ["One", "Two"] {
        w.tracker
            .tickets()
            .add_ticket(project.id, title, &ctx)
            .await
            .unwrap();
    }
    w.tracker.wait_idle().await;
    let before = w.tracker.phases().phases(project.id).await;
    w.recorder.clear();

    let result = w.tracker.phases().delete_by_id(backlog.id, &ctx).await;

    assert_eq!(
        result,
        Err(TrackerError::PhaseIsNotEmpty {
            phase_id: backlog.id,
            ticket_count: 2,
        })
    );
    assert_eq!(w.tracker.phases().phases(project.id).await, before);
    assert!(w.recorder.is_empty());
}

#[tokio::test]
async fn deleting_the_head_announces_the_new_head() {
    let w = world().await;
    let (_, project) = w.user_with_project("ada@example.com").await;
    let backlog = w.phase(&project, "BACKLOG").await;
    let doing = w.phase(&project, "DOING").await;
    let ctx = w.tracker.request_context();
    w.recorder.clear();

    w.tracker
        .phases()
        .delete_by_id(backlog.id, &ctx)
        .await
        .unwrap();

    assert_eq!(
        w.recorder.events(),
        vec![
            TrackerEvent::PhaseDeleted {
                phase_id: backlog.id,
                project_id: project.id,
            },
            TrackerEvent::PhasePositionUpdated {
                phase_id: doing.id,
                project_id: project.id,
                previous_phase_id: None,
            },
        ]
    );
    assert_eq!(w.projected_previous(doing.id).await, None);
    assert_eq!(w.tracker.tickets().phases().count().await.unwrap(), 3);
}

#[tokio::test]
async fn scenario_d_sole_admin_leaves_and_member_is_promoted() {
    let w = world().await;
    let (ada, project) = w.user_with_project("ada@example.com").await;
    let (grace, _) = w.user_with_project("grace@example.com").await;
    let ctx = w.tracker.request_context();
    let invited = w
        .tracker
        .memberships()
        .invite_member(grace.id, project.id, &ctx)
        .await
        .unwrap();
    w.tracker
        .memberships()
        .update_membership_state(invited.id, MembershipState::Accepted, &ctx)
        .await
        .unwrap();
    w.tracker.wait_idle().await;
    let owner = w
        .tracker
        .memberships()
        .memberships_of_project(project.id)
        .await
        .into_iter()
        .find(|m| m.user_id == ada.id)
        .unwrap();
    w.recorder.clear();

    w.tracker
        .memberships()
        .delete_membership_by_id(owner.id, &ctx)
        .await
        .unwrap();

    let promoted = w.tracker.memberships().membership(invited.id).await.unwrap();
    assert_eq!(promoted.role, MembershipRole::Admin);
    assert_eq!(w.recorder.event_types(), vec!["MembershipDeleted.v1"]);

    w.tracker.wait_idle().await;
    assert!(w.tracker.projects().project(project.id).await.is_some());
}

#[tokio::test]
async fn scenario_e_last_member_leaving_deletes_the_project() {
    let w = world().await;
    let (_, project) = w.user_with_project("ada@example.com").await;
    let ctx = w.tracker.request_context();
    let ticket = w
        .tracker
        .tickets()
        .add_ticket(project.id, "Orphaned", &ctx)
        .await
        .unwrap();
    w.tracker.wait_idle().await;
    let owner = w.tracker.memberships().memberships_of_project(project.id).await[0];
    w.recorder.clear();

    w.tracker
        .memberships()
        .delete_membership_by_id(owner.id, &ctx)
        .await
        .unwrap();
    // Reactions may already be arriving; the enforcer's own events come first.
    assert_eq!(
        w.recorder.event_types()[..2],
        ["MembershipDeleted.v1", "LastProjectMemberDeleted.v1"]
    );

    w.tracker.wait_idle().await;
    assert!(w.recorder.event_types().contains(&"ProjectDeleted.v1"));
    assert!(w.tracker.projects().project(project.id).await.is_none());
    assert!(w.tracker.phases().phases(project.id).await.is_empty());
    assert!(w.tracker.tickets().ticket(ticket.id).await.is_none());
    assert_eq!(w.tracker.tickets().phases().count().await.unwrap(), 0);
    assert!(!w.tracker.tickets().projects().exists(&project.id).await.unwrap());
}

#[tokio::test]
async fn ticket_counts_match_tickets_after_any_sequence() {
    let w = world().await;
    let (_, project) = w.user_with_project("ada@example.com").await;
    let doing = w.phase(&project, "DOING").await;
    let done = w.phase(&project, "DONE").await;
    let ctx = w.tracker.request_context();
    let tickets = w.tracker.tickets();

    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(tickets.add_ticket(project.id, &format!("T{i}"), &ctx).await.unwrap().id);
    }
    // Counters are maintained asynchronously; settle between dependent steps.
    w.tracker.wait_idle().await;
    for &id in &ids[..3] {
        tickets
            .patch_ticket(id, TicketPatch::default().move_to(doing.id), &ctx)
            .await
            .unwrap();
    }
    tickets
        .patch_ticket(ids[3], TicketPatch::default().move_to(done.id), &ctx)
        .await
        .unwrap();
    w.tracker.wait_idle().await;
    tickets.delete_ticket_by_id(ids[1], &ctx).await.unwrap();
    tickets.delete_ticket_by_id(ids[4], &ctx).await.unwrap();
    w.tracker.wait_idle().await;
    let qa = w
        .tracker
        .phases()
        .create_phase(project.id, "QA", Some(doing.id), &ctx)
        .await
        .unwrap();
    tickets
        .patch_ticket(ids[2], TicketPatch::default().move_to(qa.id), &ctx)
        .await
        .unwrap();
    w.tracker.wait_idle().await;

    let remaining = tickets.tickets_of_project(project.id).await;
    let phases = w.tracker.phases().phases(project.id).await;
    for phase in &phases {
        let held = remaining.iter().filter(|t| t.phase_id == phase.id).count();
        assert_eq!(phase.ticket_count as usize, held, "phase {}", phase.name);
    }
    let total: u32 = phases.iter().map(|p| p.ticket_count).sum();
    assert_eq!(total as usize, remaining.len());
    assert_eq!(remaining.len(), 4);
    assert_eq!(w.tracker.stats().anomalies, 0);
}

#[tokio::test]
async fn every_reaction_carries_the_request_correlation() {
    let w = world().await;
    let ctx = w.tracker.request_context();

    w.tracker
        .users()
        .create_user("ada@example.com", "Ada", &ctx)
        .await
        .unwrap();
    w.tracker.wait_idle().await;

    let envelopes = w.recorder.envelopes();
    assert!(envelopes.len() > 1);
    let (roots, reactions): (Vec<_>, Vec<_>) = envelopes
        .iter()
        .partition(|e| e.transaction_id().is_some());
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].event_type(), "UserCreated.v1");
    assert_eq!(roots[0].transaction_id(), ctx.transaction_id());
    for reaction in reactions {
        assert_eq!(
            reaction.parent_transaction_id(),
            Some(ctx.correlation_id()),
            "{}",
            reaction.event_type()
        );
    }
    let types = w.recorder.event_types();
    for expected in ["DefaultProjectCreated.v1", "MembershipAccepted.v1", "PhaseCreated.v1"] {
        assert!(types.contains(&expected), "missing {expected}");
    }
}

#[tokio::test]
async fn duplicate_create_is_reported_not_duplicated() {
    let w = world().await;
    let (user, project) = w.user_with_project("ada@example.com").await;
    let before = w.tracker.stats();

    let ctx = w.tracker.request_context();
    let duplicate = Envelope::new(
        TrackerEvent::UserCreated {
            user_id: user.id,
            email: user.email.clone(),
        },
        &ctx,
        &test_clock(),
        &SequentialIds::new(),
    );
    w.tracker.bus().publish(duplicate).await;
    w.tracker.wait_idle().await;

    let after = w.tracker.stats();
    assert!(after.anomalies > before.anomalies);
    assert_eq!(after.failures, 0);
    assert_eq!(w.tracker.projects().projects_of(user.id).await, vec![project]);
    let row = w.tracker.notifications().users().get(&user.id).await.unwrap();
    assert_eq!(row.map(|r| r.email), Some(user.email));
}

#[tokio::test]
async fn invitation_and_assignment_reach_the_outbox() {
    let w = world().await;
    let (_, project) = w.user_with_project("ada@example.com").await;
    let (grace, _) = w.user_with_project("grace@example.com").await;
    let ctx = w.tracker.request_context();
    let invited = w
        .tracker
        .memberships()
        .invite_member(grace.id, project.id, &ctx)
        .await
        .unwrap();
    w.tracker
        .memberships()
        .update_membership_state(invited.id, MembershipState::Accepted, &ctx)
        .await
        .unwrap();
    w.tracker.wait_idle().await;

    let ticket = w
        .tracker
        .tickets()
        .add_ticket(project.id, "Review", &ctx)
        .await
        .unwrap();
    w.tracker
        .tickets()
        .patch_ticket(ticket.id, TicketPatch::default().assign(invited.id), &ctx)
        .await
        .unwrap();
    w.tracker.wait_idle().await;

    let outbox = w.tracker.notifications().notifications_for(grace.id).await;
    assert_eq!(outbox.len(), 2);
    assert!(outbox.iter().all(|n| n.email == "grace@example.com"));

    // Removing the member unassigns their tickets.
    w.tracker
        .memberships()
        .delete_membership_by_id(invited.id, &ctx)
        .await
        .unwrap();
    w.tracker.wait_idle().await;
    assert_eq!(w.tracker.tickets().ticket(ticket.id).await.unwrap().assignee, None);
}

#[test]
fn tracker_starts_and_stops_with_default_configuration() {
    tokio_test::block_on(async {
        let tracker = Tracker::start(&TrackerConfig::default()).await.unwrap();
        let ctx = tracker.request_context();
        tracker
            .users()
            .create_user("solo@example.com", "Solo", &ctx)
            .await
            .unwrap();
        tracker.wait_idle().await;
        tracker.shutdown().await;

        let stats = tracker.stats();
        assert!(stats.published > 1);
        assert_eq!(stats.failures, 0);
    });
}
