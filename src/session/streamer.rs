//! Frame streaming to a single consumer.

use super::{ErrorKind, OperationKind, SessionError, StreamingState};
use crate::device::{CameraDevice, Frame};
use tokio::sync::mpsc;

/// What a sink wants after receiving a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFlow {
    /// Keep sending frames.
    Continue,
    /// Detach; no further frames.
    Cancel,
}

/// Consumer-supplied destination for streamed frames.
///
/// Frames are pushed from the controller task, so `deliver` should hand
/// the frame off quickly.
pub trait FrameSink: Send {
    /// Receives one frame.
    fn deliver(&mut self, frame: Frame) -> SinkFlow;
}

impl<F> FrameSink for F
where
    F: FnMut(Frame) -> SinkFlow + Send,
{
    fn deliver(&mut self, frame: Frame) -> SinkFlow {
        self(frame)
    }
}

impl FrameSink for mpsc::UnboundedSender<Frame> {
    fn deliver(&mut self, frame: Frame) -> SinkFlow {
        match self.send(frame) {
            Ok(()) => SinkFlow::Continue,
            Err(_) => SinkFlow::Cancel,
        }
    }
}

impl FrameSink for mpsc::Sender<Frame> {
    fn deliver(&mut self, frame: Frame) -> SinkFlow {
        match self.try_send(frame) {
            Ok(()) => SinkFlow::Continue,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                tracing::trace!(sequence = frame.sequence(), "frame dropped, consumer is behind");
                SinkFlow::Continue
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SinkFlow::Cancel,
        }
    }
}

/// Routes driver frames to the attached sink.
///
/// Restartable: after `stop` a new `start` attaches a fresh sink and the
/// driver restarts its frame sequence.
#[derive(Default)]
pub struct PreviewStreamer {
    sink: Option<Box<dyn FrameSink>>,
    delivered: u64,
}

impl PreviewStreamer {
    /// Current sub-state.
    pub fn state(&self) -> StreamingState {
        if self.sink.is_some() {
            StreamingState::On
        } else {
            StreamingState::Off
        }
    }

    /// Frames delivered to the current or last sink.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Attaches `sink` and switches the device into image-stream mode.
    pub fn start(
        &mut self,
        device: &mut dyn CameraDevice,
        sink: Box<dyn FrameSink>,
    ) -> Result<(), SessionError> {
        if self.sink.is_some() {
            return Err(SessionError::precondition(
                ErrorKind::AccessFailure,
                "An image stream is already active",
            ));
        }
        device
            .start_frame_stream()
            .map_err(|e| SessionError::from_driver(OperationKind::StartImageStream, e))?;
        self.sink = Some(sink);
        self.delivered = 0;
        tracing::info!("image stream started");
        Ok(())
    }

    /// Detaches the sink and reverts the device to plain preview.
    ///
    /// Stopping while no stream is active is a no-op.
    pub fn stop(&mut self, device: &mut dyn CameraDevice) -> Result<(), SessionError> {
        if self.sink.is_none() {
            return Ok(());
        }
        self.sink = None;
        device
            .stop_frame_stream()
            .map_err(|e| SessionError::from_driver(OperationKind::StopImageStream, e))?;
        tracing::info!(delivered = self.delivered, "image stream stopped");
        Ok(())
    }

    /// Pushes a frame to the sink. Returns true if it was delivered.
    ///
    /// A sink that cancels is detached and the device reverted to plain
    /// preview before this returns.
    pub fn deliver(&mut self, frame: Frame, device: &mut dyn CameraDevice) -> bool {
        let Some(sink) = self.sink.as_mut() else {
            tracing::trace!(sequence = frame.sequence(), "frame without consumer dropped");
            return false;
        };
        let sequence = frame.sequence();
        let flow = sink.deliver(frame);
        self.delivered += 1;
        tracing::trace!(sequence, "frame delivered");

        if flow == SinkFlow::Cancel {
            tracing::info!("image stream cancelled by consumer");
            self.sink = None;
            if let Err(e) = device.stop_frame_stream() {
                tracing::warn!(error = %e, "failed to revert to plain preview");
            }
        }
        true
    }

    /// Drops the sink without touching the device; used on teardown.
    pub fn detach(&mut self) {
        if self.sink.take().is_some() {
            tracing::debug!("image stream detached");
        }
    }
}

impl std::fmt::Debug for PreviewStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewStreamer")
            .field("state", &self.state())
            .field("delivered", &self.delivered)
            .finish()
    }
}
