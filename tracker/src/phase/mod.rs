//! Phase context: the ordered pipeline of each project.
//!
//! - [`chain`]: pure doubly-linked chain over an id-keyed arena
//! - [`service`]: ordering engine publishing structural events
//! - [`consumer`]: project bootstrap and ticket counters

pub mod chain;
pub mod consumer;
pub mod service;

pub use chain::{ChainChange, ChainChanges, Phase, PhaseChain};
pub use consumer::PhaseConsumer;
pub use service::{DEFAULT_PHASES, PhaseService};
