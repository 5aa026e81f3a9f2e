//! Ticket context: tickets, their phase and their assignee.

pub mod consumer;
pub mod service;

pub use consumer::{TicketConsumer, TicketPhaseProjection};
pub use service::{Ticket, TicketPatch, TicketService};
