//! Metrics collection and registry.

use crate::session::SessionStats;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registering or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for camera session monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    // Lifecycle metrics
    session_open: IntGauge,
    sessions_opened_total: IntCounter,
    sessions_closed_total: IntCounter,
    external_closures_total: IntCounter,

    // Capture metrics
    stills_captured_total: IntCounter,
    recordings_completed_total: IntCounter,
    frames_delivered_total: IntCounter,

    // Failure metrics
    driver_errors_total: IntCounter,
    failed_operations_total: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Raises a counter to `target`. Counters never go backwards.
fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let session_open = IntGauge::new(
            "camera_session_open",
            "Whether a camera session is live (1=open or opening, 0=closed)",
        )?;
        registry.register(Box::new(session_open.clone()))?;

        let sessions_opened_total = counter(
            &registry,
            "camera_session_opened_total",
            "Sessions that reached the open state",
        )?;
        let sessions_closed_total = counter(
            &registry,
            "camera_session_closed_total",
            "Sessions torn down for any reason",
        )?;
        let external_closures_total = counter(
            &registry,
            "camera_session_external_closures_total",
            "Sessions closed by the device rather than the caller",
        )?;
        let stills_captured_total = counter(
            &registry,
            "camera_session_stills_captured_total",
            "Still pictures written",
        )?;
        let recordings_completed_total = counter(
            &registry,
            "camera_session_recordings_completed_total",
            "Video recordings finalized",
        )?;
        let frames_delivered_total = counter(
            &registry,
            "camera_session_frames_delivered_total",
            "Frames pushed to image stream consumers",
        )?;
        let driver_errors_total = counter(
            &registry,
            "camera_session_driver_errors_total",
            "Unsolicited errors reported by the camera driver",
        )?;
        let failed_operations_total = counter(
            &registry,
            "camera_session_failed_operations_total",
            "Commands answered with an error",
        )?;

        Ok(Self {
            registry,
            session_open,
            sessions_opened_total,
            sessions_closed_total,
            external_closures_total,
            stills_captured_total,
            recordings_completed_total,
            frames_delivered_total,
            driver_errors_total,
            failed_operations_total,
        })
    }

    /// Updates all metrics from a stats snapshot.
    pub fn update(&self, stats: &SessionStats) {
        self.session_open
            .set(if stats.live_session.is_some() { 1 } else { 0 });

        advance(&self.sessions_opened_total, stats.sessions_opened);
        advance(&self.sessions_closed_total, stats.sessions_closed);
        advance(&self.external_closures_total, stats.external_closures);
        advance(&self.stills_captured_total, stats.stills_captured);
        advance(&self.recordings_completed_total, stats.recordings_completed);
        advance(&self.frames_delivered_total, stats.frames_delivered);
        advance(&self.driver_errors_total, stats.driver_errors);
        advance(&self.failed_operations_total, stats.failed_operations);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
