//! Prometheus metrics exporter for camera session monitoring.
//!
//! Metrics are fed from [`SessionStats`](crate::session::SessionStats)
//! snapshots read from a session handle. With the `metrics` feature,
//! `MetricsServer` reads a fresh snapshot on every scrape.
//!
//! # Metrics Exposed
//!
//! ## Lifecycle Metrics
//! - `camera_session_open` - Whether a session is live (1=open or opening, 0=closed)
//! - `camera_session_opened_total` - Sessions that reached the open state
//! - `camera_session_closed_total` - Sessions torn down
//! - `camera_session_external_closures_total` - Sessions closed by the device
//!
//! ## Capture Metrics
//! - `camera_session_stills_captured_total` - Still pictures written
//! - `camera_session_recordings_completed_total` - Recordings finalized
//! - `camera_session_frames_delivered_total` - Frames pushed to stream consumers
//!
//! ## Failure Metrics
//! - `camera_session_driver_errors_total` - Unsolicited driver errors
//! - `camera_session_failed_operations_total` - Commands answered with an error
//!
//! # Example
//!
//! ```no_run
//! use camera_session::metrics::MetricsRegistry;
//! use camera_session::session::SessionStats;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let stats = SessionStats {
//!     sessions_opened: 1,
//!     stills_captured: 3,
//!     ..SessionStats::default()
//! };
//! registry.update(&stats);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
