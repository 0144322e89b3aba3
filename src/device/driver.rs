//! Hardware camera driver boundary.
//!
//! The driver is an external collaborator: it opens devices, performs
//! captures and delivers completions, frames and unsolicited events on its
//! own execution context. Everything it reports goes through a
//! [`DriverCallback`], which funnels into the owning controller's inbox so
//! that session state is only ever mutated from one place.

use super::{CameraDescriptor, Frame, Resolution, TextureId};
use crate::session::{OperationKind, SessionId};
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by a camera driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The device refused access (disconnected, in use, policy).
    #[error("camera access failed: {0}")]
    Access(String),
    /// Reading or writing an output file failed.
    #[error("i/o failure: {0}")]
    Io(String),
    /// The capture pipeline reported a failure.
    #[error("capture failed: {0}")]
    Capture(String),
    /// The device cannot run this operation alongside another one.
    #[error("device busy: {0}")]
    Busy(String),
    /// The platform or device lacks the capability.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Anything the driver did not anticipate.
    #[error("unexpected driver fault: {0}")]
    Fault(String),
}

/// Static feature flags of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverCapabilities {
    /// Recordings can be paused and resumed.
    pub pause_resume: bool,
    /// Stills can be taken while a recording is running.
    pub still_during_recording: bool,
}

impl Default for DriverCapabilities {
    fn default() -> Self {
        Self {
            pause_resume: true,
            still_during_recording: true,
        }
    }
}

/// Everything a backend needs to open a device.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Camera to open.
    pub descriptor: CameraDescriptor,
    /// Resolved preview and recording size.
    pub resolution: Resolution,
    /// Whether recordings include an audio track.
    pub enable_audio: bool,
    /// Render target the preview is drawn into.
    pub texture: TextureId,
}

/// Something the driver reports asynchronously.
#[derive(Debug)]
pub enum DriverEvent {
    /// An operation started through [`CameraBackend::open`] or a
    /// [`CameraDevice`] method finished.
    Completed {
        /// Which operation finished.
        operation: OperationKind,
        /// Outcome reported by the device.
        result: Result<(), DriverError>,
    },
    /// A frame is ready while the image stream is on.
    Frame(Frame),
    /// Unsolicited, non-fatal device error.
    Error(String),
    /// The device was closed by someone other than the controller.
    Closed,
}

/// A driver event tagged with the session it belongs to.
#[derive(Debug)]
pub struct DriverMessage {
    /// Session the event was raised for.
    pub session: SessionId,
    /// The event itself.
    pub event: DriverEvent,
}

/// Sending half handed to a device so it can report back.
///
/// Cheap to clone and safe to call from any thread. Calls after the
/// controller has gone away are silently ignored.
#[derive(Debug, Clone)]
pub struct DriverCallback {
    session: SessionId,
    tx: mpsc::UnboundedSender<DriverMessage>,
}

impl DriverCallback {
    /// Creates a callback bound to one session.
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<DriverMessage>) -> Self {
        Self { session, tx }
    }

    /// Creates a callback together with the receiving end, for driving a
    /// device without a controller.
    pub fn channel(session: SessionId) -> (Self, mpsc::UnboundedReceiver<DriverMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(session, tx), rx)
    }

    /// Session this callback reports for.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Reports completion of an asynchronous operation.
    pub fn completed(&self, operation: OperationKind, result: Result<(), DriverError>) {
        self.send(DriverEvent::Completed { operation, result });
    }

    /// Pushes a frame.
    pub fn frame(&self, frame: Frame) {
        self.send(DriverEvent::Frame(frame));
    }

    /// Reports an unsolicited error.
    pub fn error(&self, description: impl Into<String>) {
        self.send(DriverEvent::Error(description.into()));
    }

    /// Reports that the device closed underneath the session.
    pub fn closed(&self) {
        self.send(DriverEvent::Closed);
    }

    fn send(&self, event: DriverEvent) {
        let message = DriverMessage {
            session: self.session,
            event,
        };
        if self.tx.send(message).is_err() {
            tracing::trace!(session = %self.session, "driver event dropped, controller gone");
        }
    }
}

/// Opens camera devices.
pub trait CameraBackend: Send {
    /// Feature flags of devices opened through this backend.
    fn capabilities(&self) -> DriverCapabilities;

    /// Starts opening a device.
    ///
    /// Returns the device handle immediately. The device is usable once it
    /// reports `Completed { operation: Open, result: Ok(()) }`.
    fn open(
        &mut self,
        request: OpenRequest,
        callback: DriverCallback,
    ) -> Result<Box<dyn CameraDevice>, DriverError>;
}

/// An open (or opening) camera device.
///
/// Still capture and recording start/stop are asynchronous: an `Ok` return
/// only means the driver accepted the request, the outcome arrives through
/// the callback. The remaining operations complete before returning.
pub trait CameraDevice: Send {
    /// Starts writing a still image to `path`.
    fn capture_still(&mut self, path: &Path) -> Result<(), DriverError>;

    /// Starts recording to `path`.
    fn start_recording(&mut self, path: &Path) -> Result<(), DriverError>;

    /// Stops recording and finalizes the file.
    fn stop_recording(&mut self) -> Result<(), DriverError>;

    /// Pauses the running recording.
    fn pause_recording(&mut self) -> Result<(), DriverError>;

    /// Resumes a paused recording.
    fn resume_recording(&mut self) -> Result<(), DriverError>;

    /// Switches from plain preview to preview plus frame callbacks.
    fn start_frame_stream(&mut self) -> Result<(), DriverError>;

    /// Switches back to plain preview. No frame may be reported once this
    /// returns.
    fn stop_frame_stream(&mut self) -> Result<(), DriverError>;

    /// Releases the hardware. Must not report `Closed` for this call.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_tags_session() {
        let (callback, mut rx) = DriverCallback::channel(SessionId::new(4));
        callback.error("overheated");
        callback.completed(OperationKind::CaptureStill, Ok(()));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.session, SessionId::new(4));
        assert!(matches!(first.event, DriverEvent::Error(ref d) if d == "overheated"));

        let second = rx.try_recv().unwrap();
        assert!(matches!(
            second.event,
            DriverEvent::Completed {
                operation: OperationKind::CaptureStill,
                result: Ok(())
            }
        ));
    }

    #[test]
    fn test_callback_after_receiver_dropped_is_ignored() {
        let (callback, rx) = DriverCallback::channel(SessionId::new(1));
        drop(rx);
        callback.closed();
    }
}
