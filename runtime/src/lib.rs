//! # Tracker Runtime
//!
//! Runtime implementation of the tracker's event-propagation protocol.
//!
//! ## Core Components
//!
//! - **`InProcessEventBus`**: handler registry keyed by event kind, inline
//!   synchronous delivery and a bounded worker pool for asynchronous delivery
//! - **`DispatchStats`**: aggregated handler outcomes for observability
//! - **Metrics**: Prometheus counters, histograms and gauges for the bus
//!
//! ## Example
//!
//! ```ignore
//! use tracker_runtime::{BusConfig, InProcessEventBus};
//!
//! let bus = Arc::new(InProcessEventBus::new(BusConfig::default()));
//! bus.register_async(EventKind::UserCreated, notification_consumer).await;
//!
//! bus.publish(envelope).await;
//! bus.wait_idle().await;
//! println!("{:?}", bus.stats());
//! ```

/// In-process publish/subscribe dispatcher
pub mod bus;

/// Bus configuration
pub mod config;

/// Prometheus metrics for observability
pub mod metrics;

/// Aggregated handler outcomes
pub mod stats;

pub use bus::{BusError, InProcessEventBus};
pub use config::BusConfig;
pub use stats::{DispatchSnapshot, DispatchStats};
