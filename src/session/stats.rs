//! Running counters of a controller.

use super::SessionId;
use serde::Serialize;

/// Lifetime counters of one controller, plus the live session if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Sessions that reached `Open`.
    pub sessions_opened: u64,
    /// Sessions torn down for any reason.
    pub sessions_closed: u64,
    /// Sessions torn down because the device closed underneath them.
    pub external_closures: u64,
    /// Stills written.
    pub stills_captured: u64,
    /// Recordings finalized.
    pub recordings_completed: u64,
    /// Frames handed to stream consumers.
    pub frames_delivered: u64,
    /// Unsolicited driver errors.
    pub driver_errors: u64,
    /// Commands answered with an error.
    pub failed_operations: u64,
    /// Session currently open or opening.
    pub live_session: Option<SessionId>,
}
