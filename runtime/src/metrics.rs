//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the event bus:
//! - Events published per type
//! - Handler outcomes (applied / skipped / anomaly) per handler
//! - Handler failures and latency
//! - Worker queue depth
//!
//! # Example
//!
//! ```rust,no_run
//! use tracker_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Installs the global recorder and renders the text exposition format for
/// whatever transport the host application scrapes it through.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the host application exposes the metrics on
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the metrics exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. in tests), this logs a
    /// warning and leaves the existing recorder in place.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the metrics are exposed on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "event_bus_events_published_total",
        "Total number of events published on the in-process bus"
    );
    describe_counter!(
        "event_bus_handler_outcomes_total",
        "Handler invocations by outcome (applied, skipped, anomaly)"
    );
    describe_counter!(
        "event_bus_handler_failures_total",
        "Handler invocations that returned an error or panicked"
    );
    describe_histogram!(
        "event_bus_handler_duration_seconds",
        "Time taken by a single handler invocation"
    );
    describe_gauge!(
        "event_bus_queue_depth",
        "Asynchronous handler jobs queued or running"
    );
}

/// Event bus metrics recorder.
pub struct EventBusMetrics;

impl EventBusMetrics {
    /// Record an event publish.
    pub fn record_publish(event_type: &'static str) {
        counter!("event_bus_events_published_total", "event_type" => event_type).increment(1);
    }

    /// Record a handler outcome.
    pub fn record_outcome(handler: &'static str, outcome: &'static str, duration: Duration) {
        counter!(
            "event_bus_handler_outcomes_total",
            "handler" => handler,
            "outcome" => outcome
        )
        .increment(1);
        histogram!("event_bus_handler_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a handler failure.
    pub fn record_failure(handler: &'static str, duration: Duration) {
        counter!("event_bus_handler_failures_total", "handler" => handler).increment(1);
        histogram!("event_bus_handler_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record the number of in-flight asynchronous jobs.
    #[allow(clippy::cast_precision_loss)] // Queue depth is far below f64 precision
    pub fn record_queue_depth(depth: usize) {
        gauge!("event_bus_queue_depth").set(depth as f64);
    }
}
