//! Video recording state machine.
//!
//! Transition table:
//!
//! ```text
//! Idle      --start-->  Recording
//! Recording --pause-->  Paused
//! Paused    --resume--> Recording
//! Recording --stop-->   Idle
//! Paused    --stop-->   Idle
//! ```
//!
//! Anything else is rejected as `VideoRecordingFailed`. Start and stop are
//! confirmed by the driver asynchronously; while either is in flight the
//! state does not move and pause/resume are refused.

use super::{ErrorKind, OperationKind, OutputTarget, RecordingState, SessionError};
use crate::device::{CameraDevice, DriverCapabilities};
use std::path::PathBuf;

/// A recording command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingCommand {
    /// Begin recording.
    Start,
    /// Finish recording.
    Stop,
    /// Suspend recording.
    Pause,
    /// Continue recording.
    Resume,
}

impl RecordingState {
    /// Next state for `command`, or `None` if the transition is illegal.
    pub fn next(self, command: RecordingCommand) -> Option<RecordingState> {
        use RecordingCommand::*;
        use RecordingState::*;
        match (self, command) {
            (Idle, Start) => Some(Recording),
            (Recording, Pause) => Some(Paused),
            (Paused, Resume) => Some(Recording),
            (Recording | Paused, Stop) => Some(Idle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    Starting,
    Stopping,
}

/// Recording sub-component of an open session.
///
/// Holds no device of its own; the controller lends its device for each
/// call.
#[derive(Debug, Default)]
pub struct Recorder {
    state: RecordingState,
    target: Option<PathBuf>,
    starting: Option<PathBuf>,
    in_flight: Option<InFlight>,
}

fn illegal(description: &str) -> SessionError {
    SessionError::precondition(ErrorKind::VideoRecordingFailed, description)
}

impl Recorder {
    /// Current sub-state.
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Returns true while a recording exists (running or paused).
    pub fn is_active(&self) -> bool {
        self.state != RecordingState::Idle
    }

    fn check(&self, command: RecordingCommand) -> Result<RecordingState, SessionError> {
        if let Some(in_flight) = self.in_flight {
            return Err(illegal(match in_flight {
                InFlight::Starting => "A video recording is already starting",
                InFlight::Stopping => "The video recording is already stopping",
            }));
        }
        self.state.next(command).ok_or_else(|| {
            illegal(match (self.state, command) {
                (RecordingState::Idle, _) => "No video is recording",
                (_, RecordingCommand::Start) => "A video recording is already in progress",
                (RecordingState::Recording, RecordingCommand::Resume) => {
                    "The video recording is not paused"
                }
                _ => "The video recording is already paused",
            })
        })
    }

    /// Asks the device to start recording into `target`. The state moves
    /// once [`Recorder::confirm_started`] is called.
    pub fn start(
        &mut self,
        device: &mut dyn CameraDevice,
        target: OutputTarget,
    ) -> Result<(), SessionError> {
        self.check(RecordingCommand::Start)?;
        device
            .start_recording(target.path())
            .map_err(|e| SessionError::from_driver(OperationKind::StartRecording, e))?;
        self.in_flight = Some(InFlight::Starting);
        self.starting = Some(target.into_path());
        Ok(())
    }

    /// The device confirmed the start.
    pub fn confirm_started(&mut self) {
        self.in_flight = None;
        self.target = self.starting.take();
        self.state = RecordingState::Recording;
        tracing::info!(path = ?self.target, "video recording started");
    }

    /// The device refused to start.
    pub fn abort_start(&mut self) {
        self.in_flight = None;
        self.starting = None;
    }

    /// Asks the device to stop and finalize the file.
    pub fn stop(&mut self, device: &mut dyn CameraDevice) -> Result<(), SessionError> {
        self.check(RecordingCommand::Stop)?;
        device
            .stop_recording()
            .map_err(|e| SessionError::from_driver(OperationKind::StopRecording, e))?;
        self.in_flight = Some(InFlight::Stopping);
        Ok(())
    }

    /// The device finalized the file. Returns its path.
    pub fn confirm_stopped(&mut self) -> Option<PathBuf> {
        self.in_flight = None;
        self.state = RecordingState::Idle;
        let target = self.target.take();
        tracing::info!(path = ?target, "video recording stopped");
        target
    }

    /// The device failed to stop; the recording stays where it was.
    pub fn abort_stop(&mut self) {
        self.in_flight = None;
    }

    /// Pauses a running recording.
    pub fn pause(
        &mut self,
        device: &mut dyn CameraDevice,
        capabilities: DriverCapabilities,
    ) -> Result<(), SessionError> {
        let next = self.check(RecordingCommand::Pause)?;
        if !capabilities.pause_resume {
            return Err(unsupported("pauseVideoRecording"));
        }
        device
            .pause_recording()
            .map_err(|e| SessionError::from_driver(OperationKind::PauseRecording, e))?;
        self.state = next;
        tracing::debug!("video recording paused");
        Ok(())
    }

    /// Resumes a paused recording.
    pub fn resume(
        &mut self,
        device: &mut dyn CameraDevice,
        capabilities: DriverCapabilities,
    ) -> Result<(), SessionError> {
        let next = self.check(RecordingCommand::Resume)?;
        if !capabilities.pause_resume {
            return Err(unsupported("resumeVideoRecording"));
        }
        device
            .resume_recording()
            .map_err(|e| SessionError::from_driver(OperationKind::ResumeRecording, e))?;
        self.state = next;
        tracing::debug!("video recording resumed");
        Ok(())
    }

    /// Forgets everything; used when the session goes away.
    pub fn reset(&mut self) {
        if self.is_active() {
            tracing::warn!(path = ?self.target, "recording interrupted by session teardown");
        }
        *self = Self::default();
    }
}

fn unsupported(operation: &str) -> SessionError {
    SessionError::new(
        ErrorKind::Unsupported,
        super::ErrorClass::Capability,
        format!("{operation} is not supported by this camera"),
    )
}
