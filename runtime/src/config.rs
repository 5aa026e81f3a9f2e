//! Event bus configuration.

use serde::{Deserialize, Serialize};

/// Default number of concurrent asynchronous handler workers.
pub const DEFAULT_WORKERS: usize = 12;

/// Default capacity of the bounded job queue feeding the workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configuration for [`InProcessEventBus`](crate::InProcessEventBus) instances
///
/// # Example
///
/// ```
/// use tracker_runtime::BusConfig;
///
/// let config = BusConfig::default()
///     .with_workers(4)
///     .with_queue_capacity(64);
///
/// assert_eq!(config.workers, 4);
/// assert_eq!(config.queue_capacity, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Number of worker tasks executing asynchronous handlers
    pub workers: usize,
    /// Maximum number of queued asynchronous handler jobs; publishers wait
    /// for capacity once it is reached
    pub queue_capacity: usize,
}

impl BusConfig {
    /// Create a new configuration with custom values
    ///
    /// Zero values fall back to the defaults.
    #[must_use]
    pub const fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers: if workers == 0 { DEFAULT_WORKERS } else { workers },
            queue_capacity: if queue_capacity == 0 {
                DEFAULT_QUEUE_CAPACITY
            } else {
                queue_capacity
            },
        }
    }

    /// Set the worker count
    #[must_use]
    pub const fn with_workers(self, workers: usize) -> Self {
        Self::new(workers, self.queue_capacity)
    }

    /// Set the queue capacity
    #[must_use]
    pub const fn with_queue_capacity(self, queue_capacity: usize) -> Self {
        Self::new(self.workers, queue_capacity)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
