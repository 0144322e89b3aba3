//! Camera session control.
//!
//! A [`CameraSessionController`] owns one camera device session end to end:
//! permission gating, device open and close, still capture, video recording,
//! frame streaming and unsolicited event delivery. Callers talk to it
//! through cloneable [`CameraSession`] handles.
//!
//! # State
//!
//! ```text
//! Closed -> Opening -> Open(recording, streaming) -> Closing -> Closed
//! ```
//!
//! Recording (`idle`, `recording`, `paused`) and streaming (`off`, `on`)
//! are independent sub-states of `Open`. Both reset when the session
//! leaves `Open`.
//!
//! # Example
//!
//! ```no_run
//! use camera_session::device::{
//!     CameraDescriptor, InMemoryRenderTargets, LensDirection, MockBackend, Resolution,
//!     ResolutionPreset,
//! };
//! use camera_session::permission::{PermissionGate, ScriptedPermissionHost};
//! use camera_session::session::CameraSessionController;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let gate = Arc::new(PermissionGate::new(Arc::new(ScriptedPermissionHost::granted())));
//! let (controller, session) =
//!     CameraSessionController::new(MockBackend::new(), InMemoryRenderTargets::new(), gate);
//! let task = controller.spawn();
//!
//! let back = CameraDescriptor::new("back", LensDirection::Back, vec![Resolution::new(1280, 720)]);
//! let opened = session.open(back, ResolutionPreset::High, false).await?;
//! println!("preview {}x{}", opened.preview_width, opened.preview_height);
//!
//! session.capture_still("/tmp/new.jpg").await?;
//! session.close().await?;
//!
//! drop(session);
//! task.await??;
//! # Ok(())
//! # }
//! ```

mod controller;
mod error;
mod notifier;
mod pending;
mod recorder;
mod state;
mod stats;
mod streamer;
mod target;

pub use controller::{CameraSession, CameraSessionController};
pub use error::{ControllerFault, ErrorClass, ErrorKind, SessionError};
pub use notifier::{EventNotifier, SessionEvent};
pub use pending::OperationKind;
pub(crate) use pending::{PendingOperations, PendingReply, Reply};
pub use recorder::{Recorder, RecordingCommand};
pub use state::{
    OpenedSession, RecordingState, SessionHandle, SessionId, SessionState, StreamingState,
};
pub use stats::SessionStats;
pub use streamer::{FrameSink, PreviewStreamer, SinkFlow};
pub use target::{OutputTarget, TargetError};
