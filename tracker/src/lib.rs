//! # Tracker
//!
//! A project/ticket tracker split into six bounded contexts that never read
//! each other's state. Each context owns one entity, keeps local projections
//! of the foreign facts it validates against, and learns about changes only
//! through domain events on the in-process bus.
//!
//! ## Contexts
//!
//! | Context      | Owns                 | Projects                           |
//! |--------------|----------------------|------------------------------------|
//! | User         | users                |                                    |
//! | Project      | projects             | users                              |
//! | Membership   | memberships          | users, projects                    |
//! | Phase        | ordered phase chains | projects                           |
//! | Ticket       | tickets              | projects, memberships, phase chain |
//! | Notification | outbox               | users                              |
//!
//! ## Example
//!
//! ```ignore
//! use tracker::{Tracker, TrackerConfig};
//!
//! let tracker = Tracker::start(&TrackerConfig::from_env()).await?;
//! let ctx = tracker.request_context();
//!
//! let user = tracker.users().create_user("ada@example.com", "Ada", &ctx).await?;
//! tracker.wait_idle().await;
//!
//! let project = &tracker.projects().projects_of(user.id).await[0];
//! let ticket = tracker.tickets().add_ticket(project.id, "First ticket", &ctx).await?;
//! ```

pub mod app;
pub mod config;
pub mod emitter;
pub mod error;
pub mod events;
pub mod membership;
pub mod notification;
pub mod phase;
pub mod project;
pub mod rows;
pub mod ticket;
pub mod types;
pub mod user;

pub use app::Tracker;
pub use config::TrackerConfig;
pub use emitter::Emitter;
pub use error::{ErrorKind, Result, TrackerError};
pub use events::{EventKind, TrackerEvent};
pub use membership::{Membership, MembershipService};
pub use notification::{Notification, NotificationKind, NotificationOutbox};
pub use phase::{DEFAULT_PHASES, Phase, PhaseChain, PhaseService};
pub use project::{Project, ProjectService};
pub use ticket::{Ticket, TicketPatch, TicketService};
pub use types::{
    MembershipId, MembershipRole, MembershipState, NotificationId, PhaseId, ProjectId, TicketId,
    UserId,
};
pub use user::{User, UserPatch, UserService};
