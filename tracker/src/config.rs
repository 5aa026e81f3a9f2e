//! Configuration management for the tracker.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use tracker_runtime::BusConfig;
use tracker_runtime::config::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Event bus sizing
    pub bus: BusConfig,
    /// Default log filter (trace, debug, info, warn, error); `RUST_LOG` wins
    pub log_level: String,
    /// Install the Prometheus recorder
    pub metrics_enabled: bool,
    /// Address the metrics are exposed on
    pub metrics_addr: SocketAddr,
    /// Name given to the personal project created for every new user
    pub default_project_name: String,
}

impl TrackerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                       | Default    |
    /// |--------------------------------|------------|
    /// | `TRACKER_BUS_WORKERS`          | 12         |
    /// | `TRACKER_BUS_QUEUE_CAPACITY`   | 1024       |
    /// | `TRACKER_LOG_LEVEL`            | `info`     |
    /// | `TRACKER_METRICS_ENABLED`      | `false`    |
    /// | `TRACKER_METRICS_ADDR`         | `0.0.0.0:9090` |
    /// | `TRACKER_DEFAULT_PROJECT_NAME` | `Personal` |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unparseable values fall back to their defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bus: BusConfig::new(
                lookup("TRACKER_BUS_WORKERS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_WORKERS),
                lookup("TRACKER_BUS_QUEUE_CAPACITY")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            ),
            log_level: lookup("TRACKER_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            metrics_enabled: lookup("TRACKER_METRICS_ENABLED")
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
            metrics_addr: lookup("TRACKER_METRICS_ADDR")
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 9090))),
            default_project_name: lookup("TRACKER_DEFAULT_PROJECT_NAME")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Personal".to_string()),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = TrackerConfig::default();

        assert_eq!(config.bus, BusConfig::default());
        assert_eq!(config.log_level, "info");
        assert!(!config.metrics_enabled);
        assert_eq!(config.metrics_addr.port(), 9090);
        assert_eq!(config.default_project_name, "Personal");
    }

    #[test]
    fn values_are_read_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("TRACKER_BUS_WORKERS", "4"),
            ("TRACKER_BUS_QUEUE_CAPACITY", "not-a-number"),
            ("TRACKER_METRICS_ENABLED", "true"),
            ("TRACKER_METRICS_ADDR", "127.0.0.1:9100"),
            ("TRACKER_DEFAULT_PROJECT_NAME", "Inbox"),
        ]
        .into_iter()
        .collect();

        let config = TrackerConfig::from_lookup(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.bus.workers, 4);
        assert_eq!(config.bus.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.metrics_enabled);
        assert_eq!(config.metrics_addr, SocketAddr::from(([127, 0, 0, 1], 9100)));
        assert_eq!(config.default_project_name, "Inbox");
    }

    #[test]
    fn zero_workers_fall_back_to_default() {
        let config = TrackerConfig::from_lookup(|key| {
            (key == "TRACKER_BUS_WORKERS").then(|| "0".to_string())
        });
        assert_eq!(config.bus.workers, DEFAULT_WORKERS);
    }
}
