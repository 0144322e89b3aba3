//! Errors crossing the controller boundary.
//!
//! Every error carries a stable [`ErrorKind`] code for the command surface,
//! an [`ErrorClass`] telling the caller what kind of problem it is, and a
//! human-readable description.

use super::OperationKind;
use crate::device::DriverError;
use crate::permission::PermissionDenied;
use serde::{Serialize, Serializer};
use std::path::Path;
use thiserror::Error;

/// Stable error tag reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Camera or microphone permission missing.
    AccessDenied,
    /// The device could not be opened.
    DeviceUnavailable,
    /// Output file already exists.
    FileExists,
    /// Writing the output failed.
    IoFailure,
    /// Still capture failed.
    CaptureFailure,
    /// Camera access failed during an operation.
    AccessFailure,
    /// Any recording operation failed.
    VideoRecordingFailed,
    /// Capability missing on this device or platform.
    Unsupported,
    /// Unexpected driver fault; the controller has stopped.
    Fault,
}

impl ErrorKind {
    /// Wire code of the kind.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::AccessDenied => crate::permission::PERMISSION_ERROR_CODE,
            ErrorKind::DeviceUnavailable => "CameraAccess",
            ErrorKind::FileExists => "fileExists",
            ErrorKind::IoFailure => "IOError",
            ErrorKind::CaptureFailure => "captureFailure",
            ErrorKind::AccessFailure => "cameraAccess",
            ErrorKind::VideoRecordingFailed => "videoRecordingFailed",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Fault => "fault",
        }
    }
}

/// What kind of problem an error is, and what the caller can do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    /// Access denied; re-requesting may help.
    Permission,
    /// Operation invalid in the current state.
    Precondition,
    /// Target file already exists.
    ResourceConflict,
    /// Transient hardware or I/O failure.
    DriverIo,
    /// Feature missing for the lifetime of the session.
    Capability,
    /// Unexpected fault, surfaced to the host.
    Fatal,
}

/// Error returned by every controller operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{} ({})", .description, .kind.code())]
pub struct SessionError {
    #[serde(rename = "code", serialize_with = "serialize_kind")]
    kind: ErrorKind,
    class: ErrorClass,
    description: String,
}

fn serialize_kind<S: Serializer>(kind: &ErrorKind, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(kind.code())
}

impl SessionError {
    /// Creates an error.
    pub fn new(kind: ErrorKind, class: ErrorClass, description: impl Into<String>) -> Self {
        Self {
            kind,
            class,
            description: description.into(),
        }
    }

    /// Operation not valid in the current state.
    pub fn precondition(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self::new(kind, ErrorClass::Precondition, description)
    }

    /// Output path is taken.
    pub fn file_exists(path: &Path) -> Self {
        Self::new(
            ErrorKind::FileExists,
            ErrorClass::ResourceConflict,
            format!("File at path '{}' already exists. Cannot overwrite.", path.display()),
        )
    }

    /// Permission request denied.
    pub fn access_denied(denied: PermissionDenied) -> Self {
        Self::new(ErrorKind::AccessDenied, ErrorClass::Permission, denied.description)
    }

    /// The session went away before `operation` completed.
    pub fn session_closed(operation: OperationKind) -> Self {
        Self::new(
            operation.failure_kind(),
            ErrorClass::Precondition,
            format!("camera session closed before {operation} completed"),
        )
    }

    /// The controller task is gone.
    pub fn controller_stopped() -> Self {
        Self::new(ErrorKind::Fault, ErrorClass::Fatal, "camera controller stopped")
    }

    /// Maps a driver error raised while performing `operation`.
    pub fn from_driver(operation: OperationKind, err: DriverError) -> Self {
        use OperationKind::*;

        let fallback = operation.failure_kind();
        match err {
            DriverError::Fault(message) => {
                Self::new(ErrorKind::Fault, ErrorClass::Fatal, message)
            }
            DriverError::Unsupported(message) => {
                let kind = match operation {
                    PauseRecording | ResumeRecording => ErrorKind::Unsupported,
                    _ => fallback,
                };
                Self::new(kind, ErrorClass::Capability, message)
            }
            DriverError::Access(message) => {
                let kind = match operation {
                    CaptureStill => ErrorKind::AccessFailure,
                    _ => fallback,
                };
                Self::new(kind, ErrorClass::DriverIo, message)
            }
            DriverError::Io(message) => {
                let kind = match operation {
                    CaptureStill => ErrorKind::IoFailure,
                    _ => fallback,
                };
                Self::new(kind, ErrorClass::DriverIo, message)
            }
            DriverError::Capture(message) | DriverError::Busy(message) => {
                Self::new(fallback, ErrorClass::DriverIo, message)
            }
        }
    }

    /// Stable kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Wire code of the kind.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Taxonomy class.
    pub fn class(&self) -> ErrorClass {
        self.class
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns true for unexpected driver faults.
    pub fn is_fatal(&self) -> bool {
        self.class == ErrorClass::Fatal
    }
}

/// The controller stopped because the driver misbehaved.
///
/// Returned from [`crate::session::CameraSessionController::run`] so the
/// host sees the fault instead of it being absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("camera controller stopped during {operation}: {description}")]
pub struct ControllerFault {
    /// Operation that surfaced the fault.
    pub operation: OperationKind,
    /// Driver-provided description.
    pub description: String,
}
