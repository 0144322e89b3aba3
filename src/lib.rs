//! Camera Session Library
//!
//! Mediates access to a single physical camera on behalf of a client that
//! issues high-level commands (open, capture still, record video, stream
//! frames, close) and expects asynchronous, strongly-typed results and
//! events.
//!
//! # Architecture
//!
//! ```text
//!   CameraSession (handle) ──commands──▶ CameraSessionController (owner task)
//!                                           │        ▲
//!                       PermissionGate ◀────┤        │ DriverCallback
//!                                           ▼        │
//!                                   CameraBackend / CameraDevice
//! ```
//!
//! The controller runs as one task. Driver callbacks arrive on the driver's
//! own threads and are funnelled into that task's inbox, so session state is
//! never mutated concurrently with a command.
//!
//! # Design Principles
//!
//! - **One session**: opening a camera closes the previous session first
//! - **No overwrites**: stills and recordings refuse existing paths
//! - **Reject, don't queue**: overlapping same-kind operations are errors
//! - **Faults surface**: unexpected driver faults stop the controller
//!
//! # Example
//!
//! ```no_run
//! use camera_session::{
//!     device::{CameraDescriptor, InMemoryRenderTargets, LensDirection, MockBackend, Resolution},
//!     permission::{PermissionGate, ScriptedPermissionHost},
//!     CameraSessionController, ResolutionPreset,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let gate = Arc::new(PermissionGate::new(Arc::new(ScriptedPermissionHost::granted())));
//! let (controller, session) =
//!     CameraSessionController::new(MockBackend::new(), InMemoryRenderTargets::new(), gate);
//! controller.spawn();
//!
//! let back = CameraDescriptor::new("back", LensDirection::Back, vec![Resolution::new(1280, 720)]);
//! session.open(back, ResolutionPreset::High, false).await?;
//! session.start_recording("/tmp/v.mp4").await?;
//! session.pause_recording().await?;
//! session.stop_recording().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod device;
pub mod metrics;
pub mod permission;
pub mod session;

// Re-export commonly used types at crate root
pub use device::{
    CameraBackend, CameraDescriptor, CameraDevice, Frame, MockBackend, ResolutionPreset,
};
pub use permission::{PermissionGate, PermissionHost, PermissionOutcome};
pub use session::{
    CameraSession, CameraSessionController, ErrorKind, SessionError, SessionEvent, SessionState,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
