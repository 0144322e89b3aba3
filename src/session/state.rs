//! Session identity and state.

use crate::device::TextureId;
use serde::Serialize;
use std::fmt;

/// Monotonic id of one open-to-close session lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Wraps a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Opaque reference to a live session and its render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    /// Session id.
    pub session: SessionId,
    /// Render target the preview is drawn into.
    pub texture_id: TextureId,
}

/// Success payload of `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedSession {
    /// Handle of the new session.
    pub handle: SessionHandle,
    /// Resolved preview width.
    pub preview_width: u32,
    /// Resolved preview height.
    pub preview_height: u32,
}

/// Video recording sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording.
    #[default]
    Idle,
    /// Writing frames to the output file.
    Recording,
    /// Recording suspended, file still open.
    Paused,
}

/// Image-stream sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingState {
    /// Plain preview.
    #[default]
    Off,
    /// Frames are pushed to a consumer.
    On,
}

/// Lifecycle of the controller's single session.
///
/// Recording and streaming are independent axes and only exist while the
/// session is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SessionState {
    /// No session.
    #[default]
    Closed,
    /// Waiting for permissions or for the device to come up.
    Opening,
    /// Device is open.
    Open {
        /// Recording sub-state.
        recording: RecordingState,
        /// Streaming sub-state.
        streaming: StreamingState,
    },
    /// Releasing hardware.
    Closing,
}

impl SessionState {
    /// State right after a successful open.
    pub const fn opened() -> Self {
        SessionState::Open {
            recording: RecordingState::Idle,
            streaming: StreamingState::Off,
        }
    }

    /// Returns true in the `Open` state.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Open { .. })
    }

    /// Recording sub-state, if open.
    pub fn recording(&self) -> Option<RecordingState> {
        match self {
            SessionState::Open { recording, .. } => Some(*recording),
            _ => None,
        }
    }

    /// Streaming sub-state, if open.
    pub fn streaming(&self) -> Option<StreamingState> {
        match self {
            SessionState::Open { streaming, .. } => Some(*streaming),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Closed => f.write_str("closed"),
            SessionState::Opening => f.write_str("opening"),
            SessionState::Open {
                recording,
                streaming,
            } => write!(f, "open({recording:?}, {streaming:?})"),
            SessionState::Closing => f.write_str("closing"),
        }
    }
}
