//! Tracker demo: drives every bounded context through the event bus.
//!
//! Run with:
//!
//! ```bash
//! RUST_LOG=tracker=debug cargo run --bin tracker-demo
//! ```
//!
//! Configuration comes from the environment (or a `.env` file), see
//! [`TrackerConfig::from_env`].

use anyhow::{Context, anyhow};
use tracker::{MembershipState, TicketPatch, Tracker, TrackerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = TrackerConfig::from_env();

    // 1. Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    tracing::info!("Starting tracker demo");

    // 2. Wire every context onto one bus
    let tracker = Tracker::start(&config)
        .await
        .context("failed to start tracker")?;
    let ctx = tracker.request_context();

    // 3. Users get a default project, an owner membership and four phases
    let ada = tracker.users().create_user("ada@example.com", "Ada", &ctx).await?;
    let grace = tracker
        .users()
        .create_user("grace@example.com", "Grace", &ctx)
        .await?;
    tracker.wait_idle().await;

    let project = tracker
        .projects()
        .projects_of(ada.id)
        .await
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no default project for {}", ada.id))?;
    let pipeline = tracker.phases().chain(project.id).await;
    tracing::info!(
        project_id = %project.id,
        phases = ?pipeline.as_ref().map(|chain| chain.names()),
        "Default project ready"
    );

    // 4. Reshape the pipeline
    let phases = tracker.phases().phases(project.id).await;
    let review = phases
        .iter()
        .find(|p| p.name == "REVIEW")
        .ok_or_else(|| anyhow!("REVIEW phase missing"))?;
    let qa = tracker
        .phases()
        .create_phase(project.id, "QA", Some(review.id), &ctx)
        .await?;
    tracker
        .phases()
        .patch_phase_position(qa.id, None, &ctx)
        .await?;
    tracker.phases().delete_by_id(qa.id, &ctx).await?;

    // 5. Invite a colleague and hand them a ticket
    let invitation = tracker
        .memberships()
        .invite_member(grace.id, project.id, &ctx)
        .await?;
    let grace_member = tracker
        .memberships()
        .update_membership_state(invitation.id, MembershipState::Accepted, &ctx)
        .await?;
    tracker.wait_idle().await;

    let ticket = tracker
        .tickets()
        .add_ticket(project.id, "Write the release notes", &ctx)
        .await?;
    tracker.wait_idle().await;
    let doing = phases
        .iter()
        .find(|p| p.name == "DOING")
        .ok_or_else(|| anyhow!("DOING phase missing"))?;
    tracker
        .tickets()
        .patch_ticket(
            ticket.id,
            TicketPatch::default().move_to(doing.id).assign(grace_member.id),
            &ctx,
        )
        .await?;
    tracker.wait_idle().await;

    for notification in tracker.notifications().notifications().await {
        tracing::info!(
            to = %notification.email,
            kind = ?notification.kind,
            "Outbox"
        );
    }

    // 6. Everyone leaves: the last departure deletes the project
    tracker.tickets().delete_ticket_by_id(ticket.id, &ctx).await?;
    tracker.users().delete_user(ada.id, &ctx).await?;
    tracker.wait_idle().await;
    tracker.users().delete_user(grace.id, &ctx).await?;
    tracker.wait_idle().await;

    tracing::info!(
        project_deleted = tracker.projects().project(project.id).await.is_none(),
        "Demo finished"
    );

    let stats = tracker.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    if let Some(metrics) = tracker.render_metrics() {
        println!("{metrics}");
    }

    tracker.shutdown().await;
    Ok(())
}
