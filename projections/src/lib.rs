//! Projection implementations for the tracker.
//!
//! # Overview
//!
//! This crate provides:
//! - **[`InMemoryProjectionStore`]**: keyed table implementing
//!   [`ProjectionStore`](tracker_core::projection::ProjectionStore)
//! - **Apply helpers**: the idempotent-upsert / best-effort-delete policy every
//!   consuming context follows, returning an
//!   [`Outcome`](tracker_core::Outcome) instead of failing
//!
//! # Building a Consumer
//!
//! ```ignore
//! use tracker_projections::{InMemoryProjectionStore, apply_delete, apply_upsert};
//!
//! match envelope.payload() {
//!     TrackerEvent::ProjectCreated { project_id, .. } => {
//!         apply_upsert("ticket.projects", &self.projects, *project_id, ProjectRow::new(*project_id), &ctx).await
//!     }
//!     TrackerEvent::ProjectDeleted { project_id } => {
//!         apply_delete("ticket.projects", &self.projects, project_id, &ctx).await
//!     }
//!     _ => Ok(Outcome::skipped("not a project lifecycle event")),
//! }
//! ```

pub mod apply;
pub mod memory;

pub use apply::{apply_delete, apply_replace, apply_upsert};
pub use memory::InMemoryProjectionStore;
