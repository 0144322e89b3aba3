//! In-flight operation bookkeeping.
//!
//! Each asynchronous operation gets a one-shot reply channel, stored under
//! its kind until the driver reports completion. A kind can only be in
//! flight once; overlapping requests are rejected by the caller of
//! [`PendingOperations::insert`], never queued.

use super::{OpenedSession, SessionError};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::oneshot;

/// Reply channel of a command.
pub(crate) type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Every controller operation, used to tag completions and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    /// Open a device.
    Open,
    /// Take a still picture.
    CaptureStill,
    /// Begin a video recording.
    StartRecording,
    /// Finish a video recording.
    StopRecording,
    /// Pause a recording.
    PauseRecording,
    /// Resume a paused recording.
    ResumeRecording,
    /// Begin pushing frames to a consumer.
    StartImageStream,
    /// Stop pushing frames.
    StopImageStream,
}

impl OperationKind {
    /// Error kind used when this operation fails without a more specific one.
    pub fn failure_kind(self) -> super::ErrorKind {
        use super::ErrorKind;
        match self {
            OperationKind::Open => ErrorKind::DeviceUnavailable,
            OperationKind::CaptureStill => ErrorKind::CaptureFailure,
            OperationKind::StartRecording
            | OperationKind::StopRecording
            | OperationKind::PauseRecording
            | OperationKind::ResumeRecording => ErrorKind::VideoRecordingFailed,
            OperationKind::StartImageStream | OperationKind::StopImageStream => {
                ErrorKind::AccessFailure
            }
        }
    }

    /// Error kind used when this operation is invalid in the current state.
    pub fn precondition_kind(self) -> super::ErrorKind {
        use super::ErrorKind;
        match self {
            OperationKind::CaptureStill
            | OperationKind::StartImageStream
            | OperationKind::StopImageStream => ErrorKind::AccessFailure,
            other => other.failure_kind(),
        }
    }

    /// Command name.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Open => "open",
            OperationKind::CaptureStill => "captureStill",
            OperationKind::StartRecording => "startRecording",
            OperationKind::StopRecording => "stopRecording",
            OperationKind::PauseRecording => "pauseRecording",
            OperationKind::ResumeRecording => "resumeRecording",
            OperationKind::StartImageStream => "startImageStream",
            OperationKind::StopImageStream => "stopImageStream",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply channel of a pending operation.
#[derive(Debug)]
pub(crate) enum PendingReply {
    Open(Reply<OpenedSession>),
    Unit(Reply<()>),
}

impl PendingReply {
    /// Resolves with an error.
    pub(crate) fn fail(self, error: SessionError) {
        let delivered = match self {
            PendingReply::Open(reply) => reply.send(Err(error)).is_ok(),
            PendingReply::Unit(reply) => reply.send(Err(error)).is_ok(),
        };
        if !delivered {
            tracing::debug!("caller went away before the failure was delivered");
        }
    }

    /// Resolves a unit operation successfully.
    pub(crate) fn succeed(self) {
        match self {
            PendingReply::Unit(reply) => {
                if reply.send(Ok(())).is_err() {
                    tracing::debug!("caller went away before the result was delivered");
                }
            }
            PendingReply::Open(reply) => {
                tracing::error!("open completion resolved without a payload");
                let _ = reply.send(Err(SessionError::session_closed(OperationKind::Open)));
            }
        }
    }

    /// Resolves an open successfully.
    pub(crate) fn opened(self, opened: OpenedSession) {
        match self {
            PendingReply::Open(reply) => {
                if reply.send(Ok(opened)).is_err() {
                    tracing::debug!("caller went away before the session was handed over");
                }
            }
            PendingReply::Unit(reply) => {
                tracing::error!("open payload routed to a unit reply");
                let _ = reply.send(Ok(()));
            }
        }
    }
}

/// Table of in-flight operations, at most one per kind.
#[derive(Debug, Default)]
pub(crate) struct PendingOperations {
    table: HashMap<OperationKind, PendingReply>,
}

impl PendingOperations {
    pub(crate) fn is_pending(&self, kind: OperationKind) -> bool {
        self.table.contains_key(&kind)
    }

    /// Registers a reply. Hands it back if `kind` is already in flight.
    pub(crate) fn insert(&mut self, kind: OperationKind, reply: PendingReply) -> Result<(), PendingReply> {
        if self.is_pending(kind) {
            return Err(reply);
        }
        self.table.insert(kind, reply);
        Ok(())
    }

    pub(crate) fn take(&mut self, kind: OperationKind) -> Option<PendingReply> {
        self.table.remove(&kind)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }

    /// Fails every pending operation with the error `make` builds for it.
    pub(crate) fn fail_all(&mut self, make: impl Fn(OperationKind) -> SessionError) {
        for (kind, reply) in self.table.drain() {
            tracing::debug!(operation = %kind, "failing pending operation");
            reply.fail(make(kind));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_insert_of_same_kind_is_rejected() {
        let mut pending = PendingOperations::default();
        let (first, _rx1) = oneshot::channel();
        let (second, _rx2) = oneshot::channel();

        assert!(pending
            .insert(OperationKind::CaptureStill, PendingReply::Unit(first))
            .is_ok());
        assert!(pending
            .insert(OperationKind::CaptureStill, PendingReply::Unit(second))
            .is_err());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_fail_all_resolves_each_once() {
        let mut pending = PendingOperations::default();
        let (still, mut still_rx) = oneshot::channel();
        let (record, mut record_rx) = oneshot::channel();
        pending
            .insert(OperationKind::CaptureStill, PendingReply::Unit(still))
            .unwrap();
        pending
            .insert(OperationKind::StartRecording, PendingReply::Unit(record))
            .unwrap();

        pending.fail_all(SessionError::session_closed);

        assert_eq!(pending.len(), 0);
        let still_err = still_rx.try_recv().unwrap().unwrap_err();
        assert_eq!(still_err.code(), "captureFailure");
        let record_err = record_rx.try_recv().unwrap().unwrap_err();
        assert_eq!(record_err.code(), "videoRecordingFailed");
    }
}
